use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

/// Serializes read-modify-write transitions per key (an entity id by
/// default). Different keys never block each other.
#[derive(Debug)]
pub struct EntityLocks<K = Uuid> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for EntityLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> EntityLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` while holding the lock for `id`. Not reentrant.
    ///
    /// The slot for `id` is dropped again once no other caller holds or
    /// waits on it.
    pub fn with_lock<T>(&self, id: K, op: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        let outcome = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is queued.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&id);
        }
        outcome
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_id_runs_one_at_a_time() {
        let locks: Arc<EntityLocks> = Arc::new(EntityLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    locks.with_lock(id, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn idle_slots_are_released() {
        let locks: EntityLocks = EntityLocks::new();
        for _ in 0..100 {
            locks.with_lock(Uuid::new_v4(), || ());
        }
        assert_eq!(locks.tracked(), 0);

        let outer = Uuid::new_v4();
        locks.with_lock(outer, || {
            locks.with_lock(Uuid::new_v4(), || ());
            assert_eq!(locks.tracked(), 1);
        });
        assert_eq!(locks.tracked(), 0);
    }
}
