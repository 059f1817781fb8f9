// Recovery pipeline: purge -> fetch -> normalize -> rehydrate -> build resume
// state -> rotate session -> hand off to the bidding core.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::model::{Session, SetupHandoff, Team};
use crate::purge::purge_cache;
use crate::rehydrate::{rehydrate_photos, PhotoMergeReport};
use crate::resume::build_resume_state;
use crate::session::{
    clamp_id_length, CopyForward, SessionContext, SessionRotator, DEFAULT_ID_LENGTH,
};
use crate::snapshot::{normalize, Defaulted};
use crate::store::{BlobStore, LocalCache, RemoteStore};

/// Why nothing could be resumed. The operator is offered a fresh auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NothingToRecover {
    /// No document exists at the requested path.
    Absent { auction_id: String },
    /// The remote store could not be read.
    FetchFailed { auction_id: String, message: String },
}

/// A successful resume.
#[derive(Debug)]
pub struct Recovered {
    pub handoff: SetupHandoff,
    pub session: Session,
    /// The rotated context; the caller replaces its own with this one.
    pub context: SessionContext,
    pub photos: PhotoMergeReport,
    /// Every default applied while normalizing and rebuilding.
    pub defaulted: Vec<Defaulted>,
    /// Background write of the snapshot to the new path. Not awaited here.
    pub copy_forward: CopyForward,
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    Resumed(Box<Recovered>),
    NothingToRecover(NothingToRecover),
}

/// Wires the stores together and runs a resume.
pub struct Recovery<'a> {
    cache: &'a dyn LocalCache,
    blobs: &'a dyn BlobStore,
    remote: Arc<dyn RemoteStore>,
    id_length: usize,
}

impl<'a> Recovery<'a> {
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

    /// Resume the auction stored at `auction_id` on this device.
    ///
    /// Only a failed or empty fetch stops the pipeline; every later step
    /// degrades instead of failing. The copy-forward to the new path is left
    /// running in the background.
    pub async fn recover<R: Rng + ?Sized>(
        &self,
        context: &SessionContext,
        auction_id: &str,
        rng: &mut R,
    ) -> RecoveryOutcome {
        if let Err(e) = purge_cache(self.cache) {
            warn!(auction_id, "cache purge failed, continuing: {e:#}");
        }

        let document = match self.remote.fetch(auction_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                info!(auction_id, "no remote snapshot found");
                return RecoveryOutcome::NothingToRecover(NothingToRecover::Absent {
                    auction_id: auction_id.to_string(),
                });
            }
            Err(e) => {
                warn!(auction_id, "failed to fetch remote snapshot: {e}");
                return RecoveryOutcome::NothingToRecover(NothingToRecover::FetchFailed {
                    auction_id: auction_id.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let normalized = normalize(&document);
        let mut defaulted = normalized.defaulted;
        let mut snapshot = normalized.value;
        if !defaulted.is_empty() {
            info!(auction_id, count = defaulted.len(), "snapshot normalized with defaults");
        }

        let (players, photos) =
            rehydrate_photos(std::mem::take(&mut snapshot.players), auction_id, self.blobs);
        snapshot.players = players;

        let resumed = build_resume_state(&snapshot, Utc::now());
        defaulted.extend(resumed.defaulted);
        let resume_data = resumed.value;

        let rotation = SessionRotator::new(self.cache, self.blobs, Arc::clone(&self.remote))
            .with_id_length(self.id_length)
            .rotate(context, auction_id, &snapshot.players, &document, rng);

        let teams = resume_data
            .balances
            .iter()
            .map(|(name, ledger)| {
                let extra = snapshot
                    .team_balances
                    .iter()
                    .chain(&snapshot.teams)
                    .find(|t| &t.name == name)
                    .map(|t| t.extra.clone())
                    .unwrap_or_default();
                Team {
                    name: name.clone(),
                    balance: ledger.balance,
                    acquired: ledger.acquired,
                    extra,
                }
            })
            .collect();

        info!(
            from = auction_id,
            to = %rotation.session.id,
            round = resume_data.round,
            player_idx = resume_data.player_idx,
            log_entries = resume_data.log.len(),
            "auction resumed"
        );

        let handoff = SetupHandoff {
            tournament: snapshot.tournament,
            players: snapshot.players,
            teams,
            bid_log: Vec::new(),
            player_images: HashMap::new(),
            team_logos: HashMap::new(),
            default_balance: snapshot.default_balance,
            resume_data,
            auction_id: rotation.session.id.clone(),
            min_players_per_team: snapshot.min_players_per_team,
            max_players_per_team: snapshot.max_players_per_team,
            blue_cap_percent: snapshot.blue_cap_percent,
        };

        RecoveryOutcome::Resumed(Box::new(Recovered {
            handoff,
            session: rotation.session,
            context: rotation.context,
            photos,
            defaulted,
            copy_forward: rotation.copy_forward,
        }))
    }
}
