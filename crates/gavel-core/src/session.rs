// Session rotation: mint a fresh auction id, point this device at it, and
// republish the snapshot under the new path so every viewer resubscribes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::model::{Player, Session};
use crate::store::{BlobStore, LocalCache, RemoteStore, CURRENT_AUCTION_KEY};

/// Length of generated session ids. Ids end up in shareable links, so the
/// format stays fixed unless explicitly configured.
pub const DEFAULT_ID_LENGTH: usize = 8;

/// Accepted id lengths. Requests outside this range are clamped.
pub const MIN_ID_LENGTH: usize = 4;
pub const MAX_ID_LENGTH: usize = 32;

/// Document tags written on copy-forward.
pub const TAG_SESSION_ID: &str = "sessionId";
pub const TAG_RESUMED_FROM: &str = "resumedFrom";
pub const TAG_RESUMED_AT: &str = "resumedAt";

/// Generate a random alphanumeric id of `len` characters (clamped to
/// `MIN_ID_LENGTH..=MAX_ID_LENGTH`) that differs from every id in `exclude`.
/// There is no uniqueness check against the remote store.
pub fn generate_session_id<R: Rng + ?Sized>(rng: &mut R, len: usize, exclude: &[&str]) -> String {
    let len = clamp_id_length(len);
    loop {
        let id: String = (0..len)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        if !exclude.contains(&id.as_str()) {
            return id;
        }
    }
}

pub fn clamp_id_length(len: usize) -> usize {
    len.clamp(MIN_ID_LENGTH, MAX_ID_LENGTH)
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// The device's notion of which auction id is current. Passed into the
/// recovery pipeline and handed back rotated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    current: Option<String>,
}

impl SessionContext {
    pub fn new(current: Option<String>) -> Self {
        Self { current }
    }

    /// Read the current-auction pointer from the local cache. An unreadable
    /// cache yields an empty context.
    pub fn load(cache: &dyn LocalCache) -> Self {
        let current = match cache.get(CURRENT_AUCTION_KEY) {
            Ok(value) => value.and_then(|v| v.as_str().map(String::from)),
            Err(e) => {
                warn!("failed to read current auction pointer: {e:#}");
                None
            }
        };
        Self { current }
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Copy-forward
// ---------------------------------------------------------------------------

/// How a detached copy-forward write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyForwardOutcome {
    Written { auction_id: String },
    Failed { auction_id: String, message: String },
    /// The task was dropped with its runtime before finishing.
    Abandoned { auction_id: String },
}

/// Handle to the background write of a snapshot to its new path.
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct CopyForward {
    auction_id: String,
    handle: JoinHandle<CopyForwardOutcome>,
}

impl CopyForward {
    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the write to settle.
    pub async fn outcome(self) -> CopyForwardOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(auction_id = %self.auction_id, "copy-forward task did not complete: {e}");
                CopyForwardOutcome::Abandoned {
                    auction_id: self.auction_id,
                }
            }
        }
    }
}

/// Copy of `document` tagged with its new session id and where it came from.
pub fn tag_document(document: &Value, new_id: &str, previous_id: &str, at: DateTime<Utc>) -> Value {
    let mut tagged = match document {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    tagged.insert(TAG_SESSION_ID.into(), json!(new_id));
    tagged.insert(TAG_RESUMED_FROM.into(), json!(previous_id));
    tagged.insert(TAG_RESUMED_AT.into(), json!(at.to_rfc3339()));
    Value::Object(tagged)
}

fn spawn_copy_forward(remote: Arc<dyn RemoteStore>, auction_id: String, document: Value) -> CopyForward {
    let task_id = auction_id.clone();
    let handle = tokio::spawn(async move {
        match remote.write(&task_id, &document).await {
            Ok(()) => {
                info!(auction_id = %task_id, "snapshot copied forward");
                CopyForwardOutcome::Written {
                    auction_id: task_id,
                }
            }
            Err(e) => {
                warn!(auction_id = %task_id, "copy-forward failed; viewers stay on the old path until the next save: {e}");
                CopyForwardOutcome::Failed {
                    auction_id: task_id,
                    message: e.to_string(),
                }
            }
        }
    });
    CopyForward { auction_id, handle }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Result of a rotation. The local steps have already run; the remote write
/// may still be in flight.
#[derive(Debug)]
pub struct Rotation {
    pub session: Session,
    pub context: SessionContext,
    pub pointer_saved: bool,
    pub photos_saved: bool,
    pub copy_forward: CopyForward,
}

/// Mints new session ids and republishes snapshots under them.
pub struct SessionRotator<'a> {
    cache: &'a dyn LocalCache,
    blobs: &'a dyn BlobStore,
    remote: Arc<dyn RemoteStore>,
    id_length: usize,
}

impl<'a> SessionRotator<'a> {
    pub fn new(
        cache: &'a dyn LocalCache,
        blobs: &'a dyn BlobStore,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            cache,
            blobs,
            remote,
            id_length: DEFAULT_ID_LENGTH,
        }
    }

    pub fn with_id_length(mut self, id_length: usize) -> Self {
        self.id_length = clamp_id_length(id_length);
        self
    }

    /// Rotate away from `from_id`.
    ///
    /// In order, each step best-effort:
    /// 1. store the new id as this device's current auction pointer,
    /// 2. save `players` (with their merged photos) to the blob store under
    ///    the new id,
    /// 3. spawn the write of `document`, tagged, to the new remote path.
    ///
    /// Must be called from within a tokio runtime.
    pub fn rotate<R: Rng + ?Sized>(
        &self,
        context: &SessionContext,
        from_id: &str,
        players: &[Player],
        document: &Value,
        rng: &mut R,
    ) -> Rotation {
        let mut exclude = vec![from_id];
        exclude.extend(context.current_id());
        let new_id = generate_session_id(rng, self.id_length, &exclude);
        let now = Utc::now();

        let pointer_saved = match self.cache.set(CURRENT_AUCTION_KEY, &json!(new_id)) {
            Ok(()) => true,
            Err(e) => {
                warn!(auction_id = %new_id, "failed to persist current auction pointer: {e:#}");
                false
            }
        };

        let photos_saved = match self.blobs.save_photos(&new_id, players) {
            Ok(()) => true,
            Err(e) => {
                warn!(auction_id = %new_id, "failed to save photos for new session: {e:#}");
                false
            }
        };

        let tagged = tag_document(document, &new_id, from_id, now);
        let copy_forward = spawn_copy_forward(Arc::clone(&self.remote), new_id.clone(), tagged);

        info!(from = from_id, to = %new_id, "session rotated");

        Rotation {
            session: Session {
                id: new_id.clone(),
                previous: Some(from_id.to_string()),
                created_at: now,
            },
            context: SessionContext::new(Some(new_id)),
            pointer_saved,
            photos_saved,
            copy_forward,
        }
    }
}
