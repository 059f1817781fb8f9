// Cache purge: drops every locally cached auction record so a resume is
// rebuilt only from the remote snapshot and the blob store.

use anyhow::Result;
use tracing::info;

use crate::store::{LocalCache, AUCTION_RECORD_PREFIX};

/// Remove all cached auction records. Returns how many were removed.
///
/// Idempotent. The current-auction pointer and unrelated keys are kept;
/// rotation overwrites the pointer once the new session is adopted.
pub fn purge_cache(cache: &dyn LocalCache) -> Result<usize> {
    let mut removed = 0;
    for key in cache
        .keys()?
        .iter()
        .filter(|k| k.starts_with(AUCTION_RECORD_PREFIX))
    {
        if cache.remove(key)? {
            removed += 1;
        }
    }
    info!(removed, "local auction cache purged");
    Ok(removed)
}
