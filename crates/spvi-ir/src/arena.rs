//! Relocatable storage for one stage's introspected types and names.
//!
//! Every dynamically-sized record produced while decoding a stage (member
//! lists, array dimension lists, name strings) lives in a [`TypeArena`].
//! Records refer to each other through [`Span`]s: an offset and a length
//! relative to the start of the owning pool, never an address. The arena can
//! therefore be cloned, moved or grown without any fixup, and a span only
//! becomes a reference at the point of use via [`TypeArena::resolve`].

use std::ffi::CStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::IrError;
use crate::types::{ArrayInfo, Member};

/// Lineage tag of a [`TypeArena`].
///
/// Every arena created with [`TypeArena::new`] gets a fresh id; clones keep
/// the id of the arena they were cloned from, so spans issued by the original
/// resolve against the copy.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ArenaId(u64);

impl ArenaId {
    /// The lineage of empty spans. Resolves against every arena.
    pub const DETACHED: Self = Self(0);

    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A half-open `[offset, offset + len)` region of one of a [`TypeArena`]'s pools.
///
/// Equality and hashing look at the region only, not at the arena lineage,
/// so two independently built but identical arenas hold equal spans.
pub struct Span<T: ?Sized> {
    arena: ArenaId,
    offset: u32,
    len: u32,
    _phantom: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized> Clone for Span<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Span<T> {}

impl<T: ?Sized> PartialEq for Span<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}

impl<T: ?Sized> Eq for Span<T> {}

impl<T: ?Sized> Hash for Span<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
        self.len.hash(state);
    }
}

impl<T: ?Sized> Default for Span<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> fmt::Debug for Span<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.offset, self.offset + self.len)
    }
}

impl<T: ?Sized> Span<T> {
    /// An empty span that resolves against any arena.
    pub const fn empty() -> Self {
        Self {
            arena: ArenaId::DETACHED,
            offset: 0,
            len: 0,
            _phantom: PhantomData,
        }
    }

    fn new(arena: ArenaId, offset: usize, len: usize) -> Self {
        let (Ok(offset), Ok(len)) = (u32::try_from(offset), u32::try_from(len)) else {
            panic!("arena overflow: span [{offset}, +{len}) exceeds u32::MAX");
        };
        Self {
            arena,
            offset,
            len,
            _phantom: PhantomData,
        }
    }

    /// Offset of the first element, relative to the pool base.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of elements (bytes for strings, excluding the terminator).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if the span covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The arena lineage this span was issued by.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.len as usize
    }
}

/// Record types stored in one of the arena's pools.
pub trait Pooled: Sized {
    #[doc(hidden)]
    fn pool(arena: &TypeArena) -> &[Self];
    #[doc(hidden)]
    fn pool_mut(arena: &mut TypeArena) -> &mut [Self];
}

impl Pooled for u8 {
    fn pool(arena: &TypeArena) -> &[Self] {
        &arena.bytes
    }
    fn pool_mut(arena: &mut TypeArena) -> &mut [Self] {
        &mut arena.bytes
    }
}

impl Pooled for Member {
    fn pool(arena: &TypeArena) -> &[Self] {
        &arena.members
    }
    fn pool_mut(arena: &mut TypeArena) -> &mut [Self] {
        &mut arena.members
    }
}

impl Pooled for ArrayInfo {
    fn pool(arena: &TypeArena) -> &[Self] {
        &arena.dims
    }
    fn pool_mut(arena: &mut TypeArena) -> &mut [Self] {
        &mut arena.dims
    }
}

/// Append-only backing store for one stage's type tree.
///
/// Holds a byte pool (raw allocations and NUL-terminated names), a pool of
/// [`Member`] records and a pool of [`ArrayInfo`] dimension lists.
#[derive(Clone, Debug)]
pub struct TypeArena {
    id: ArenaId,
    bytes: Vec<u8>,
    members: Vec<Member>,
    dims: Vec<ArrayInfo>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TypeArena {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes && self.members == other.members && self.dims == other.dims
    }
}

impl Eq for TypeArena {}

impl TypeArena {
    /// Creates an empty arena with a fresh lineage.
    pub fn new() -> Self {
        Self {
            id: ArenaId::fresh(),
            bytes: Vec::new(),
            members: Vec::new(),
            dims: Vec::new(),
        }
    }

    /// This arena's lineage.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Size of the byte pool.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of member records.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Bump-allocates `byte_size` zeroed bytes.
    pub fn allocate(&mut self, byte_size: usize) -> Span<u8> {
        if byte_size == 0 {
            return Span::empty();
        }
        let offset = self.bytes.len();
        self.bytes.resize(offset + byte_size, 0);
        Span::new(self.id, offset, byte_size)
    }

    /// Copies `text` into the byte pool followed by a NUL terminator.
    ///
    /// The returned span excludes the terminator; use
    /// [`resolve_c_str`](Self::resolve_c_str) for a C-compatible view.
    pub fn write_string(&mut self, text: &str) -> Span<str> {
        if text.is_empty() {
            return Span::empty();
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        Span::new(self.id, offset, text.len())
    }

    /// Appends a member list.
    pub fn push_members(&mut self, members: Vec<Member>) -> Span<Member> {
        if members.is_empty() {
            return Span::empty();
        }
        let offset = self.members.len();
        let len = members.len();
        self.members.extend(members);
        Span::new(self.id, offset, len)
    }

    /// Appends an array dimension list (outermost dimension first).
    pub fn push_dims(&mut self, dims: &[ArrayInfo]) -> Span<ArrayInfo> {
        if dims.is_empty() {
            return Span::empty();
        }
        let offset = self.dims.len();
        self.dims.extend_from_slice(dims);
        Span::new(self.id, offset, dims.len())
    }

    fn check<T: ?Sized>(&self, span: Span<T>, pool_len: usize) -> Result<(), IrError> {
        if span.arena != self.id {
            return Err(IrError::ForeignSpan {
                offset: span.offset,
                len: span.len,
            });
        }
        if span.range().end > pool_len {
            return Err(IrError::SpanOutOfBounds {
                offset: span.offset,
                len: span.len,
                size: pool_len,
            });
        }
        Ok(())
    }

    /// Resolves a span, reporting spans from another arena or out of bounds.
    pub fn try_resolve<T: Pooled>(&self, span: Span<T>) -> Result<&[T], IrError> {
        if span.is_empty() {
            return Ok(&[]);
        }
        let pool = T::pool(self);
        self.check(span, pool.len())?;
        Ok(&pool[span.range()])
    }

    /// Resolves a span to a slice of the current pool.
    ///
    /// # Panics
    ///
    /// Panics if the span was issued by an unrelated arena or is out of bounds.
    pub fn resolve<T: Pooled>(&self, span: Span<T>) -> &[T] {
        self.try_resolve(span).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Mutable counterpart of [`resolve`](Self::resolve).
    pub fn resolve_mut<T: Pooled>(&mut self, span: Span<T>) -> &mut [T] {
        if span.is_empty() {
            return &mut [];
        }
        let pool_len = T::pool(self).len();
        if let Err(e) = self.check(span, pool_len) {
            panic!("{e}");
        }
        &mut T::pool_mut(self)[span.range()]
    }

    /// Resolves a name span written by [`write_string`](Self::write_string).
    pub fn try_resolve_str(&self, span: Span<str>) -> Result<&str, IrError> {
        if span.is_empty() {
            return Ok("");
        }
        self.check(span, self.bytes.len())?;
        std::str::from_utf8(&self.bytes[span.range()]).map_err(|_| IrError::NotUtf8 {
            offset: span.offset,
        })
    }

    /// Resolves a name span, panicking on a foreign span.
    pub fn resolve_str(&self, span: Span<str>) -> &str {
        self.try_resolve_str(span).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Resolves a name span including its NUL terminator.
    pub fn resolve_c_str(&self, span: Span<str>) -> Result<&CStr, IrError> {
        if span.is_empty() {
            return Ok(c"");
        }
        let with_nul = Span::<u8>::new(span.arena, span.offset as usize, span.len() + 1);
        self.check(with_nul, self.bytes.len())?;
        CStr::from_bytes_with_nul(&self.bytes[with_nul.range()]).map_err(|_| IrError::NotUtf8 {
            offset: span.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Qualifiers, TypeInfo, VarType};

    fn leaf(offset: u32) -> Member {
        Member {
            offset,
            size: 4,
            type_info: TypeInfo::scalar(VarType::F32),
            qualifiers: Qualifiers::empty(),
            ..Member::default()
        }
    }

    #[test]
    fn allocate_is_zeroed_and_relative() {
        let mut arena = TypeArena::new();
        let a = arena.allocate(8);
        let b = arena.allocate(4);
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 8);
        assert_eq!(arena.resolve(a), &[0; 8]);
        arena.resolve_mut(b).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.resolve(b), &[1, 2, 3, 4]);
    }

    #[test]
    fn strings_are_nul_terminated() {
        let mut arena = TypeArena::new();
        let name = arena.write_string("albedo");
        assert_eq!(name.len(), 6);
        assert_eq!(arena.byte_len(), 7);
        assert_eq!(arena.resolve_str(name), "albedo");
        assert_eq!(arena.resolve_c_str(name).unwrap(), c"albedo");
    }

    #[test]
    fn spans_survive_growth() {
        let mut arena = TypeArena::new();
        let first = arena.write_string("first");
        for i in 0..1000 {
            arena.write_string(&format!("filler{i}"));
        }
        assert_eq!(arena.resolve_str(first), "first");
    }

    #[test]
    fn spans_resolve_against_clone() {
        let mut arena = TypeArena::new();
        let members = arena.push_members(vec![leaf(0), leaf(4)]);
        let copy = arena.clone();
        drop(arena);
        assert_eq!(copy.resolve(members).len(), 2);
        assert_eq!(copy.resolve(members)[1].offset, 4);
    }

    #[test]
    fn foreign_span_rejected() {
        let mut a = TypeArena::new();
        let mut b = TypeArena::new();
        let span = a.push_dims(&[ArrayInfo::Fixed(3)]);
        b.push_dims(&[ArrayInfo::Fixed(7)]);
        assert!(matches!(
            b.try_resolve(span),
            Err(IrError::ForeignSpan { .. })
        ));
        assert_eq!(a.resolve(span), &[ArrayInfo::Fixed(3)]);
    }

    #[test]
    fn empty_spans_resolve_anywhere() {
        let arena = TypeArena::new();
        let members: Span<Member> = Span::empty();
        assert!(arena.resolve(members).is_empty());
        assert_eq!(arena.resolve_str(Span::empty()), "");
    }

    #[test]
    fn identical_arenas_compare_equal() {
        let build = || {
            let mut arena = TypeArena::new();
            let name = arena.write_string("x");
            let members = arena.push_members(vec![Member {
                name,
                ..leaf(0)
            }]);
            (arena, members)
        };
        let (a, ma) = build();
        let (b, mb) = build();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
        assert_eq!(ma, mb);
    }
}
