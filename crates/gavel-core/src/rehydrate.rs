// Photo rehydration: merges locally held player photos back into a snapshot
// that never carried them.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::model::{Photo, Player, PlayerId};
use crate::store::BlobStore;

/// Photo coverage after a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoMergeReport {
    pub total: usize,
    pub with_photo: usize,
    pub without_photo: usize,
    /// Photos attached from the local blob store during this merge.
    pub restored: usize,
}

/// Attach photos from `photos` to every player that has none. A player that
/// already carries a photo is never touched. Lookup tries the id as stored,
/// then its numeric/text counterpart.
pub fn merge_photos(
    players: Vec<Player>,
    photos: &HashMap<PlayerId, Photo>,
) -> (Vec<Player>, PhotoMergeReport) {
    let mut report = PhotoMergeReport {
        total: players.len(),
        ..PhotoMergeReport::default()
    };

    let players = players
        .into_iter()
        .map(|mut player| {
            if player.photo.is_none() {
                let found = photos.get(&player.id).or_else(|| {
                    player
                        .id
                        .coerced()
                        .and_then(|alt| photos.get(&alt))
                });
                if let Some(photo) = found {
                    player.photo = Some(photo.clone());
                    report.restored += 1;
                }
            }
            if player.photo.is_some() {
                report.with_photo += 1;
            } else {
                report.without_photo += 1;
            }
            player
        })
        .collect();

    (players, report)
}

/// Load the photos saved for `auction_id` and merge them into `players`.
///
/// A blob store that cannot be read is treated as empty: the auction can run
/// without photos.
pub fn rehydrate_photos(
    players: Vec<Player>,
    auction_id: &str,
    blobs: &dyn BlobStore,
) -> (Vec<Player>, PhotoMergeReport) {
    let photos = blobs.load_photos(auction_id).unwrap_or_else(|e| {
        warn!(auction_id, "failed to load local photos, continuing without: {e:#}");
        HashMap::new()
    });

    let (players, report) = merge_photos(players, &photos);
    info!(
        auction_id,
        with_photo = report.with_photo,
        without_photo = report.without_photo,
        restored = report.restored,
        "photo rehydration complete"
    );
    (players, report)
}
