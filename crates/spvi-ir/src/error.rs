//! Error types for the introspection data model.

/// Errors that can occur when resolving introspection data.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum IrError {
    /// A span was resolved against an arena that did not issue it.
    #[error("span [{offset}, +{len}) belongs to a different arena")]
    ForeignSpan { offset: u32, len: u32 },

    /// A span reaches past the end of its pool.
    #[error("span [{offset}, +{len}) out of bounds (pool size: {size})")]
    SpanOutOfBounds { offset: u32, len: u32, size: usize },

    /// A name span does not hold valid UTF-8.
    #[error("name at byte offset {offset} is not valid UTF-8")]
    NotUtf8 { offset: u32 },

    /// A size depends on a specialization constant with no known value.
    #[error("specialization constant {0} has no value")]
    UnresolvedSpecConstant(u32),

    /// A stage name could not be parsed.
    #[error("unknown shader stage '{0}'")]
    UnknownStage(String),
}
