// In-process remote store. Backs tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::error::{RemoteResult, RemoteStoreError};
use super::RemoteStore;

#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<String, Value>>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document at `auction_id`.
    pub fn insert(&self, auction_id: &str, document: Value) {
        self.documents()
            .insert(auction_id.to_string(), document);
    }

    /// Current document at `auction_id`, if any.
    pub fn get(&self, auction_id: &str) -> Option<Value> {
        self.documents().get(auction_id).cloned()
    }

    /// Make every subsequent write fail with [`RemoteStoreError::Rejected`].
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of write attempts, successful or not.
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.documents
            .lock()
            .expect("memory remote store mutex poisoned")
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, auction_id: &str) -> RemoteResult<Option<Value>> {
        Ok(self.get(auction_id).filter(|doc| !doc.is_null()))
    }

    async fn write(&self, auction_id: &str, document: &Value) -> RemoteResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(RemoteStoreError::Rejected {
                auction_id: auction_id.to_string(),
                message: "writes disabled".into(),
            });
        }
        self.insert(auction_id, document.clone());
        Ok(())
    }
}
