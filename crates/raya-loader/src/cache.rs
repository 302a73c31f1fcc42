//! Resolution cache
//!
//! One map holds both outcomes of a resolution: a materialized unit or a
//! recorded failure. A name is in at most one of the two states. Settling is
//! insert-if-absent, so the first outcome recorded for a name wins and racers
//! observe it.
//!
//! With single-flight enabled, concurrent resolutions of the same name are
//! serialized on a per-name lock so the pipeline runs once per name.

use crate::error::Cause;
use crate::runtime::Unit;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of resolving one name
#[derive(Debug, Clone)]
pub enum Resolution {
    Materialized(Arc<Unit>),
    Poisoned(Cause),
}

impl Resolution {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Resolution::Materialized(_))
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self, Resolution::Poisoned(_))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Names resolved to a unit
    pub materialized: usize,
    /// Names with a recorded failure
    pub poisoned: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.materialized + self.poisoned
    }
}

/// Name -> resolution map, plus optional per-name flight locks
#[derive(Debug)]
pub struct ResolutionCache {
    states: DashMap<String, Resolution>,
    inflight: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl ResolutionCache {
    pub fn new(single_flight: bool) -> Self {
        Self {
            states: DashMap::new(),
            inflight: single_flight.then(DashMap::new),
        }
    }

    pub fn is_single_flight(&self) -> bool {
        self.inflight.is_some()
    }

    /// Current resolution of `name`
    pub fn get(&self, name: &str) -> Option<Resolution> {
        self.states.get(name).map(|entry| entry.value().clone())
    }

    pub fn is_materialized(&self, name: &str) -> bool {
        self.states
            .get(name)
            .map(|entry| entry.is_materialized())
            .unwrap_or(false)
    }

    pub fn is_poisoned(&self, name: &str) -> bool {
        self.states
            .get(name)
            .map(|entry| entry.is_poisoned())
            .unwrap_or(false)
    }

    /// Record `resolution` unless the name already has one.
    ///
    /// Returns the resolution now stored and whether it was ours.
    pub fn settle(&self, name: &str, resolution: Resolution) -> (Resolution, bool) {
        match self.states.entry(name.to_string()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                slot.insert(resolution.clone());
                (resolution, true)
            }
        }
    }

    /// Record a failure, replacing whatever the name resolved to.
    pub fn poison(&self, name: &str, cause: Cause) {
        self.states.insert(name.to_string(), Resolution::Poisoned(cause));
    }

    /// Drop a recorded failure so the name can be resolved again.
    ///
    /// Materialized names are left alone. Returns `true` if a failure was
    /// removed.
    pub fn clear_poison(&self, name: &str) -> bool {
        self.states
            .remove_if(name, |_, resolution| resolution.is_poisoned())
            .is_some()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.states.iter() {
            match entry.value() {
                Resolution::Materialized(_) => stats.materialized += 1,
                Resolution::Poisoned(_) => stats.poisoned += 1,
            }
        }
        stats
    }

    /// Run `f` while holding the flight lock for `name`.
    ///
    /// Without single-flight, `f` runs immediately.
    pub fn with_flight<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let Some(inflight) = &self.inflight else {
            return f();
        };

        let lock = inflight
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        // The last holder out removes the lock.
        let ptr = Arc::as_ptr(&lock);
        drop(lock);
        inflight.remove_if(name, |_, current| {
            Arc::as_ptr(current) == ptr && Arc::strong_count(current) == 1
        });
        result
    }

    /// Number of names with an active flight lock
    pub fn inflight_count(&self) -> usize {
        self.inflight.as_ref().map(DashMap::len).unwrap_or(0)
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_unit;
    use crate::resource::MemoryLocator;
    use crate::runtime::{HostRuntime, UnitTable};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn unit(name: &str) -> Arc<Unit> {
        let table = UnitTable::new(Arc::new(MemoryLocator::new()));
        table.define_unit(name, encode_unit(0, &[]), None).unwrap()
    }

    fn cause(message: &str) -> Cause {
        Arc::new(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }

    #[test]
    fn test_first_settle_wins() {
        let cache = ResolutionCache::new(false);
        let winner = unit("a.B");

        let (stored, inserted) = cache.settle("a.B", Resolution::Materialized(winner.clone()));
        assert!(inserted);
        assert!(stored.is_materialized());

        let (stored, inserted) = cache.settle("a.B", Resolution::Poisoned(cause("late")));
        assert!(!inserted);
        match stored {
            Resolution::Materialized(unit) => assert!(Arc::ptr_eq(&unit, &winner)),
            Resolution::Poisoned(_) => panic!("late failure replaced the unit"),
        }
        assert!(cache.is_materialized("a.B"));
        assert!(!cache.is_poisoned("a.B"));
    }

    #[test]
    fn test_poison_overwrites() {
        let cache = ResolutionCache::new(false);
        cache.settle("a.B", Resolution::Materialized(unit("a.B")));
        cache.poison("a.B", cause("revoked"));

        assert!(cache.is_poisoned("a.B"));
        assert!(!cache.is_materialized("a.B"));
        assert_eq!(cache.stats(), CacheStats { materialized: 0, poisoned: 1 });
    }

    #[test]
    fn test_clear_poison_leaves_units() {
        let cache = ResolutionCache::new(false);
        cache.settle("a.B", Resolution::Materialized(unit("a.B")));
        cache.poison("a.C", cause("missing"));

        assert!(!cache.clear_poison("a.B"));
        assert!(cache.clear_poison("a.C"));
        assert!(cache.get("a.C").is_none());
        assert_eq!(cache.stats().total(), 1);
    }

    #[test]
    fn test_with_flight_serializes_same_name() {
        let cache = ResolutionCache::new(true);
        let active = AtomicUsize::new(0);
        let overlap = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    cache.with_flight("a.B", || {
                        if active.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlap.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        assert_eq!(cache.inflight_count(), 0);
    }

    #[test]
    fn test_with_flight_disabled_runs_directly() {
        let cache = ResolutionCache::default();
        assert!(!cache.is_single_flight());
        assert_eq!(cache.with_flight("a.B", || 7), 7);
        assert_eq!(cache.inflight_count(), 0);
    }
}
