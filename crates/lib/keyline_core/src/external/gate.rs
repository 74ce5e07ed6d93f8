//! Keyed single-flight gate for refresh-on-read.
//!
//! Concurrent readers of the same cached provider token can all observe it
//! near expiry and race the refresh call; providers that rotate refresh
//! tokens would then invalidate all but one result. The gate serialises
//! refreshers per (identity, provider): the winner refreshes, the rest
//! re-read the now-fresh row after the lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One async mutex per (identity, provider).
#[derive(Default)]
pub struct RefreshGate {
    locks: DashMap<(Uuid, String), Arc<Mutex<()>>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock for a key. Callers hold the guard across
    /// the re-check / refresh / persist sequence.
    pub fn lock_for(&self, identity_id: Uuid, provider: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((identity_id, provider.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_yields_the_same_lock() {
        let gate = RefreshGate::new();
        let id = Uuid::new_v4();
        let a = gate.lock_for(id, "google");
        let b = gate.lock_for(id, "google");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_yield_independent_locks() {
        let gate = RefreshGate::new();
        let id = Uuid::new_v4();
        let a = gate.lock_for(id, "google");
        let b = gate.lock_for(Uuid::new_v4(), "google");
        let c = gate.lock_for(id, "other");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn lock_serialises_holders() {
        let gate = RefreshGate::new();
        let lock = gate.lock_for(Uuid::new_v4(), "google");
        let guard = lock.lock().await;
        assert!(lock.try_lock().is_err());
        drop(guard);
        assert!(lock.try_lock().is_ok());
    }
}
