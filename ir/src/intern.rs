//! Interning of operator instances.
//!
//! Operators are immutable values compared structurally. An [`OpCache`] maps each
//! distinct value to one shared `Arc`, so graphs built from identical indexing
//! expressions reference the same operator. The map is lock-free (papaya) and stores
//! `Weak` references with insert-or-fetch-existing semantics, like the scalar
//! expression cache. Losing a race only costs a duplicate allocation.

use std::hash::Hash;
use std::sync::{Arc, OnceLock, Weak};

use papaya::HashMap;

pub struct OpCache<T> {
    map: OnceLock<HashMap<T, Weak<T>>>,
}

impl<T> OpCache<T> {
    pub const fn new() -> Self {
        Self { map: OnceLock::new() }
    }
}

impl<T> Default for OpCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OpCache<T>
where
    T: Hash + Eq + Clone + Send + Sync + std::fmt::Display + 'static,
{
    fn map(&self) -> &HashMap<T, Weak<T>> {
        self.map.get_or_init(HashMap::new)
    }

    /// The shared instance structurally equal to `value`.
    pub fn intern(&self, value: T) -> Arc<T> {
        use papaya::{Compute, Operation};

        let map = self.map();
        let guard = map.guard();

        if let Some(weak) = map.get(&value, &guard)
            && let Some(arc) = weak.upgrade()
        {
            return arc;
        }

        let new_arc = Arc::new(value.clone());
        let new_weak = Arc::downgrade(&new_arc);

        let result = map.compute(
            value,
            |entry| match entry {
                Some((_, existing)) => match existing.upgrade() {
                    Some(arc) => Operation::Abort(arc),
                    None => Operation::Insert(new_weak.clone()),
                },
                None => Operation::Insert(new_weak.clone()),
            },
            &guard,
        );

        match result {
            Compute::Aborted(existing) => existing,
            _ => {
                tracing::debug!(op = %new_arc, "interned new operator");
                new_arc
            }
        }
    }

    /// Number of interned instances still referenced somewhere.
    pub fn live_count(&self) -> usize {
        let map = self.map();
        let guard = map.guard();
        map.iter(&guard).filter(|(_, weak)| weak.strong_count() > 0).count()
    }

    /// Remove entries whose operator has been dropped.
    pub fn gc_dead_refs(&self) {
        let map = self.map();
        let guard = map.guard();
        let dead: Vec<T> = map.iter(&guard).filter(|(_, weak)| weak.strong_count() == 0).map(|(k, _)| k.clone()).collect();
        for key in dead {
            map.remove(&key, &guard);
        }
    }
}
