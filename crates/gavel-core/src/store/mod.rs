// Storage seams: the remote realtime store, the local photo blob store, and
// the local key-value cache that holds the current-session pointer.

pub mod error;
pub mod http;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Photo, Player, PlayerId};

pub use error::{RemoteResult, RemoteStoreError};
pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use sqlite::SqliteStore;

/// Key under which the current auction (session) id is kept.
pub const CURRENT_AUCTION_KEY: &str = "current_auction_id";

/// Prefix shared by every locally cached auction record.
pub const AUCTION_RECORD_PREFIX: &str = "auction:";

/// Cache key for the locally cached copy of one auction.
pub fn auction_record_key(auction_id: &str) -> String {
    format!("{AUCTION_RECORD_PREFIX}{auction_id}")
}

/// The shared realtime document store every device subscribes to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the document stored at `auction_id`. `Ok(None)` means nothing
    /// lives at that path.
    async fn fetch(&self, auction_id: &str) -> RemoteResult<Option<Value>>;

    /// Overwrite the document at `auction_id`.
    async fn write(&self, auction_id: &str, document: &Value) -> RemoteResult<()>;
}

/// Device-local storage for player photographs, which are never sent to the
/// remote store.
pub trait BlobStore: Send + Sync {
    /// Photos saved for `auction_id`, keyed by player id in its native form.
    fn load_photos(&self, auction_id: &str) -> anyhow::Result<HashMap<PlayerId, Photo>>;

    /// Save the photos carried by `players` under `auction_id`. Players without
    /// a photo are skipped.
    fn save_photos(&self, auction_id: &str, players: &[Player]) -> anyhow::Result<()>;
}

/// Device-local key-value cache of auction records.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> anyhow::Result<()>;
    /// Remove `key`; returns whether it existed.
    fn remove(&self, key: &str) -> anyhow::Result<bool>;
    fn keys(&self) -> anyhow::Result<Vec<String>>;
}
