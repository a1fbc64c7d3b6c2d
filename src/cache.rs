//! Concurrent cache with single-flight population and explicit eviction.
//!
//! One abstraction serves both the definition cache and the fingerprint
//! cache. The outer map lock guards only slot bookkeeping; computations run
//! outside every lock, so readers never block on a slow parse they did not
//! ask for.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::Error;

/// Keyed cache of shared values.
///
/// Concurrent misses for the same key coalesce into one computation; the
/// loser threads wait on the slot and receive the leader's result, success
/// or failure alike. Failures are released once and never cached. An entry
/// evicted while its computation is in flight still releases its waiters,
/// but the result is not re-inserted; eviction wins, and stale content is
/// never resurrected.
pub struct VersionedCache<K, V> {
    /// Live slots by key. Held only for bookkeeping, never across a compute.
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

/// One cache entry: a state plus the condvar its waiters park on.
struct Slot<V> {
    /// Wakes waiters when the state settles.
    cond: Condvar,
    /// Current population state.
    state: Mutex<SlotState<V>>,
}

/// Population state of a slot.
enum SlotState<V> {
    /// A leader thread is computing the value; waiters park on the condvar.
    InFlight,
    /// The computation finished; waiters and later readers take this result.
    Settled(Result<Arc<V>, Arc<Error>>),
}

impl<K, V> VersionedCache<K, V>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Create an empty cache.
    pub fn new() -> VersionedCache<K, V> {
        return VersionedCache { slots: Mutex::new(HashMap::new()) };
    }

    /// Evict every entry. In-flight computations still release their
    /// waiters; their results are discarded.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Look up or populate the entry for `key`.
    ///
    /// Exactly one concurrent caller runs `compute`; the rest wait and share
    /// its outcome.
    ///
    /// # Errors
    ///
    /// Returns the computation's failure, shared between the leader and
    /// every waiter of that flight. Failures are not cached; the next
    /// arrival retries.
    pub fn get_or_compute<F>(&self, key: &K, compute: F) -> Result<Arc<V>, Arc<Error>>
    where
        F: FnOnce() -> Result<V, Error>,
    {
        let (slot, leading) = self.join_or_lead(key);
        if leading {
            return self.lead(key, &slot, compute);
        }
        return wait_for_settle(&slot);
    }

    /// Drop the entry for `key`, if any. Returns whether an entry was
    /// removed.
    pub fn invalidate(&self, key: &K) -> bool {
        return self.slots.lock().remove(key).is_some();
    }

    /// Number of live entries, in-flight ones included.
    pub fn len(&self) -> usize {
        return self.slots.lock().len();
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        return self.slots.lock().is_empty();
    }

    /// The settled value for `key`, if present, without populating.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let state = slot.state.lock();
        if let SlotState::Settled(Ok(value)) = &*state {
            return Some(Arc::clone(value));
        }
        return None;
    }

    /// Find the slot for `key`, or install a fresh in-flight one and become
    /// its leader.
    fn join_or_lead(&self, key: &K) -> (Arc<Slot<V>>, bool) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return (Arc::clone(slot), false);
        }
        let slot = Arc::new(Slot {
            cond: Condvar::new(),
            state: Mutex::new(SlotState::InFlight),
        });
        slots.insert(key.clone(), Arc::clone(&slot));
        return (Arc::clone(&slot), true);
    }

    /// Run the computation as the flight leader and settle the slot.
    ///
    /// The guard settles the slot with an abandonment error if `compute`
    /// unwinds, so waiters are released instead of deadlocked.
    ///
    /// # Errors
    ///
    /// Returns the computation's failure after sharing it with the waiters.
    fn lead<F>(&self, key: &K, slot: &Arc<Slot<V>>, compute: F) -> Result<Arc<V>, Arc<Error>>
    where
        F: FnOnce() -> Result<V, Error>,
    {
        let mut guard = FlightGuard { cache: self, key, settled: false, slot };
        let outcome = match compute() {
            Err(error) => Err(Arc::new(error)),
            Ok(value) => Ok(Arc::new(value)),
        };
        guard.settle(outcome.clone());
        return outcome;
    }

    /// Retire a slot after a failed or abandoned flight, unless eviction
    /// already replaced it.
    fn retire(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| return Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }
}

impl<K, V> Default for VersionedCache<K, V>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Same as [`VersionedCache::new`].
    fn default() -> VersionedCache<K, V> {
        return VersionedCache::new();
    }
}

/// Releases a flight's waiters even when the leader unwinds.
struct FlightGuard<'a, K, V>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// The owning cache, for retiring the slot on failure.
    cache: &'a VersionedCache<K, V>,
    /// Key under population.
    key: &'a K,
    /// Whether the slot has been settled already.
    settled: bool,
    /// The slot this flight owns.
    slot: &'a Arc<Slot<V>>,
}

impl<K, V> FlightGuard<'_, K, V>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Publish the outcome, wake every waiter, and retire the slot on
    /// failure so later arrivals retry.
    fn settle(&mut self, outcome: Result<Arc<V>, Arc<Error>>) {
        let failed = outcome.is_err();
        {
            let mut state = self.slot.state.lock();
            *state = SlotState::Settled(outcome);
        }
        self.slot.cond.notify_all();
        self.settled = true;
        if failed {
            self.cache.retire(self.key, self.slot);
        }
    }
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    /// Settle with an abandonment failure if the leader never settled.
    fn drop(&mut self) {
        if !self.settled {
            let error = Arc::new(Error::Abandoned { key: self.key.to_string() });
            self.settle(Err(error));
        }
    }
}

/// Park until the slot settles and share its outcome. A slot never returns
/// to flight, so everyone who joined it observes the same result.
fn wait_for_settle<V>(slot: &Arc<Slot<V>>) -> Result<Arc<V>, Arc<Error>> {
    let mut state = slot.state.lock();
    while matches!(*state, SlotState::InFlight) {
        slot.cond.wait(&mut state);
    }
    return match &*state {
        SlotState::InFlight => unreachable!("slot settled above"),
        SlotState::Settled(outcome) => outcome.clone(),
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn concurrent_misses_compute_once() {
        let cache: VersionedCache<String, u32> = VersionedCache::new();
        let computations = AtomicU32::new(0);
        let key = "cold".to_string();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let value = cache
                        .get_or_compute(&key, || {
                            computations.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            return Ok(7);
                        })
                        .unwrap();
                    assert_eq!(*value, 7);
                });
            }
        });

        assert_eq!(computations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eviction_mid_flight_discards_the_result() {
        let cache: VersionedCache<String, u32> = VersionedCache::new();
        let key = "evicted".to_string();

        std::thread::scope(|scope| {
            let leader = scope.spawn(|| {
                return cache.get_or_compute(&key, || {
                    std::thread::sleep(std::time::Duration::from_millis(30));
                    return Ok(1);
                });
            });
            std::thread::sleep(std::time::Duration::from_millis(10));
            cache.invalidate(&key);
            assert_eq!(*leader.join().unwrap().unwrap(), 1);
        });

        // The value reached its caller but was not resurrected into the map.
        assert!(cache.peek(&key).is_none());
    }

    #[test]
    fn failure_is_shared_and_not_cached() {
        let cache: VersionedCache<String, u32> = VersionedCache::new();
        let computations = AtomicU32::new(0);
        let key = "failing".to_string();

        let first = cache.get_or_compute(&key, || {
            computations.fetch_add(1, Ordering::SeqCst);
            return Err(Error::ParseFailed {
                origin: key.clone(),
                reason: "boom".to_string(),
            });
        });
        assert!(first.is_err());
        assert!(cache.is_empty());

        let second = cache.get_or_compute(&key, || {
            computations.fetch_add(1, Ordering::SeqCst);
            return Ok(3);
        });
        assert_eq!(*second.unwrap(), 3);
        assert_eq!(computations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_leader_releases_waiters() {
        let cache: Arc<VersionedCache<String, u32>> = Arc::new(VersionedCache::new());
        let key = "doomed".to_string();

        let leader = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            std::thread::spawn(move || {
                let _ = cache.get_or_compute(&key, || panic!("parse blew up"));
            })
        };
        assert!(leader.join().is_err());

        // The flight settled as abandoned and was retired; a fresh arrival
        // simply recomputes.
        let value = cache.get_or_compute(&key, || return Ok(9)).unwrap();
        assert_eq!(*value, 9);
    }

    #[test]
    fn settled_values_are_cache_hits() {
        let cache: VersionedCache<String, u32> = VersionedCache::new();
        let computations = AtomicU32::new(0);
        let key = "warm".to_string();

        for _ in 0..3 {
            let value = cache
                .get_or_compute(&key, || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    return Ok(5);
                })
                .unwrap();
            assert_eq!(*value, 5);
        }
        assert_eq!(computations.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }
}
