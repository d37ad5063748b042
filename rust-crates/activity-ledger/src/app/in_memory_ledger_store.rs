use crate::app::ledger_store::{
    AccountKey,
    Checkpoint,
    LedgerStore,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

/// Process-local checkpoints. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    checkpoints: Arc<Mutex<HashMap<AccountKey, Checkpoint>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> Arc<Mutex<HashMap<AccountKey, Checkpoint>>> {
        self.checkpoints.clone()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn checkpoint(&self, key: &AccountKey) -> Option<Checkpoint> {
        let guard = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    fn store_checkpoint(&mut self, key: &AccountKey, checkpoint: Checkpoint) {
        let mut guard = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(*key, checkpoint);
    }

    fn clear(&mut self, key: &AccountKey) {
        let mut guard = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(key);
    }
}
