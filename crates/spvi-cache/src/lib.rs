//! Memoizing cache of stage introspection results.
//!
//! Keyed by [`IntrospectionParams`] (shader bytes, entry point and stage).
//! Concurrent requests for the same key run the introspection once; the
//! other callers block on the entry's [`OnceCell`] and share its result.
//! Failed introspections are not cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use spvi_ir::{IntrospectionParams, StageIntrospectionResult};
use spvi_reflect::{IntrospectionError, Introspector};

type Slot = Arc<OnceCell<Arc<StageIntrospectionResult>>>;

#[derive(Debug, Default)]
pub struct IntrospectionCache {
    introspector: Introspector,
    entries: DashMap<IntrospectionParams, Slot>,
    computations: AtomicUsize,
}

impl IntrospectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose misses are computed by `introspector`.
    pub fn with_introspector(introspector: Introspector) -> Self {
        Self {
            introspector,
            ..Self::default()
        }
    }

    pub fn introspector(&self) -> &Introspector {
        &self.introspector
    }

    /// Returns the cached result for `params`, introspecting on a miss.
    pub fn get_or_compute(
        &self,
        params: &IntrospectionParams,
    ) -> Result<Arc<StageIntrospectionResult>, IntrospectionError> {
        let slot = self.slot(params);
        let computed = slot.get_or_try_init(|| {
            self.computations.fetch_add(1, Ordering::Relaxed);
            log::debug!("cache miss: {params}");
            self.introspector.introspect(params).map(Arc::new)
        });
        match computed {
            Ok(result) => Ok(Arc::clone(result)),
            Err(err) => {
                // Drop the empty slot unless another caller has since filled it.
                self.entries
                    .remove_if(params, |_, cached| Arc::ptr_eq(cached, &slot) && cached.get().is_none());
                log::debug!("not caching failed introspection of {params}: {err}");
                Err(err)
            }
        }
    }

    /// The cached result for `params`, without computing it.
    pub fn get(&self, params: &IntrospectionParams) -> Option<Arc<StageIntrospectionResult>> {
        self.entries.get(params)?.get().cloned()
    }

    /// Evicts `params`, returning its result if one was cached.
    pub fn remove(&self, params: &IntrospectionParams) -> Option<Arc<StageIntrospectionResult>> {
        let (_, slot) = self.entries.remove(params)?;
        slot.get().cloned()
    }

    /// Number of cached results. Computations still in flight are not counted.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// How many times the introspector has run, failures included.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    fn slot(&self, params: &IntrospectionParams) -> Slot {
        if let Some(slot) = self.entries.get(params) {
            return Arc::clone(slot.value());
        }
        // The entry guard must drop before the cell is initialized, or a
        // concurrent lookup on the same shard would deadlock.
        let slot = self.entries.entry(params.clone()).or_default();
        Arc::clone(slot.value())
    }
}
