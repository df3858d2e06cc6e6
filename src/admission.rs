//! Admission control for concurrent workers.
//!
//! An [`AdmissionController`] hands out at most `capacity` tokens per key.
//! Tokens give their slot back when dropped, so a worker releases its slot
//! whether it finishes, fails, or unwinds. The lock is held only while a
//! counter changes, never across I/O.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct AdmissionState<K> {
    capacity: usize,
    in_use: Mutex<HashMap<K, usize>>,
}

impl<K: Eq + Hash> AdmissionState<K> {
    // Counters stay consistent even if a holder panicked mid-update: every
    // update is a single insert or decrement.
    fn slots(&self) -> MutexGuard<'_, HashMap<K, usize>> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock-protected per-key slot counter.
pub struct AdmissionController<K> {
    state: Arc<AdmissionState<K>>,
}

impl<K> Clone for AdmissionController<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> fmt::Debug for AdmissionController<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.state.capacity)
            .finish_non_exhaustive()
    }
}

impl<K> AdmissionController<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a controller allowing `capacity` concurrent holders per key.
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(AdmissionState {
                capacity: capacity.max(1),
                in_use: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a controller admitting one holder per key: a
    /// "currently executing" set.
    #[must_use]
    pub fn exclusive() -> Self {
        Self::new(1)
    }

    /// Returns the per-key capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Takes a slot for `key` if one is free.
    #[must_use]
    pub fn try_acquire(&self, key: K) -> Option<AdmissionToken<K>> {
        let mut slots = self.state.slots();
        let used = slots.entry(key.clone()).or_insert(0);
        if *used >= self.state.capacity {
            return None;
        }
        *used += 1;
        drop(slots);
        Some(AdmissionToken {
            key,
            state: Arc::clone(&self.state),
        })
    }

    /// Returns the number of slots currently held for `key`.
    #[must_use]
    pub fn in_use(&self, key: &K) -> usize {
        self.state.slots().get(key).copied().unwrap_or(0)
    }

    /// Returns `true` when `key` holds at least one slot.
    #[must_use]
    pub fn is_held(&self, key: &K) -> bool {
        self.in_use(key) > 0
    }

    /// Gives a slot back. Equivalent to dropping the token.
    pub fn release(&self, token: AdmissionToken<K>) {
        drop(token);
    }
}

/// Proof of a held slot; releases it on drop.
pub struct AdmissionToken<K: Eq + Hash> {
    key: K,
    state: Arc<AdmissionState<K>>,
}

impl<K: Eq + Hash> AdmissionToken<K> {
    /// Returns the key the slot was taken for.
    pub const fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + fmt::Debug> fmt::Debug for AdmissionToken<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionToken")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K: Eq + Hash> Drop for AdmissionToken<K> {
    fn drop(&mut self) {
        let mut slots = self.state.slots();
        let emptied = match slots.get_mut(&self.key) {
            Some(used) => {
                *used = used.saturating_sub(1);
                *used == 0
            }
            None => false,
        };
        if emptied {
            slots.remove(&self.key);
        }
    }
}
