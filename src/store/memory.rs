use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{KeyValueStore, StoreError};

/// Process-local store. Clones share the same map.
///
/// Operations are counted (gets and sets alike, starting at 0) so a single
/// failure can be injected at a chosen step with [`MemoryStore::failing_at`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
    ops: Arc<AtomicUsize>,
    fail_at: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `op`-th operation fails with `StoreError::Unavailable`.
    pub fn failing_at(op: usize) -> Self {
        Self {
            fail_at: Some(op),
            ..Self::default()
        }
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Number of operations attempted so far, failed ones included.
    pub fn op_count(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_fault(&self) -> Result<(), StoreError> {
        let op = self.ops.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(op) {
            return Err(StoreError::Unavailable(format!(
                "injected failure at operation {op}"
            )));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_fault()?;
        Ok(self.value(key))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_fault()?;
        self.seed(key, value);
        Ok(())
    }
}
