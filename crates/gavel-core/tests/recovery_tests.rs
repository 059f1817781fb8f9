// Integration tests for the recovery pipeline.
//
// These drive a full resume through the library's public API with an
// in-memory remote store and an in-memory SQLite store, checking what the
// bidding core receives and what the device and remote are left holding.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use gavel_core::model::{BidStatus, Photo, Player, PlayerId, TeamLedger};
use gavel_core::recovery::{NothingToRecover, Recovered, Recovery, RecoveryOutcome};
use gavel_core::session::{CopyForwardOutcome, SessionContext};
use gavel_core::store::{
    auction_record_key, BlobStore, LocalCache, MemoryRemoteStore, SqliteStore,
    CURRENT_AUCTION_KEY,
};

// ===========================================================================
// Test helpers
// ===========================================================================

const OLD_ID: &str = "Old00001";

/// Snapshot with players stored as an index-keyed mapping, one sale, and the
/// cursor at round 2, second player.
fn indexed_snapshot() -> Value {
    json!({
        "tournament": "Spring Cup",
        "players": {
            "0": {"id": 1, "name": "A", "category": "Blue"},
            "1": {"id": 2, "name": "B", "category": "Batter"}
        },
        "teams": [{"name": "X", "balance": 1000, "acquired": 0}],
        "teamBalances": {"0": {"name": "X", "balance": 500, "acquired": 1}},
        "auctionLog": {"0": {"round": 1, "playerName": "A", "team": "X", "amount": 500, "status": "Sold"}},
        "round": 2,
        "playerIdx": 1,
        "defaultBalance": 1000
    })
}

/// The same snapshot with every collection stored as an ordered sequence.
fn ordered_snapshot() -> Value {
    json!({
        "tournament": "Spring Cup",
        "players": [
            {"id": 1, "name": "A", "category": "Blue"},
            {"id": 2, "name": "B", "category": "Batter"}
        ],
        "teams": [{"name": "X", "balance": 1000, "acquired": 0}],
        "teamBalances": [{"name": "X", "balance": 500, "acquired": 1}],
        "auctionLog": [{"round": 1, "playerName": "A", "team": "X", "amount": 500, "status": "Sold"}],
        "round": 2,
        "playerIdx": 1,
        "defaultBalance": 1000
    })
}

async fn resume_from(
    local: &SqliteStore,
    remote: Arc<MemoryRemoteStore>,
    auction_id: &str,
    seed: u64,
) -> Box<Recovered> {
    let recovery = Recovery::new(local, local, remote);
    match recovery
        .recover(
            &SessionContext::load(local),
            auction_id,
            &mut StdRng::seed_from_u64(seed),
        )
        .await
    {
        RecoveryOutcome::Resumed(recovered) => recovered,
        RecoveryOutcome::NothingToRecover(reason) => panic!("expected resume, got {reason:?}"),
    }
}

fn player_with_photo(id: i64, name: &str, photo: &str) -> Player {
    Player {
        id: PlayerId::Number(id),
        name: name.into(),
        category: String::new(),
        photo: Some(Photo(photo.into())),
        extra: Default::default(),
    }
}

// ===========================================================================
// Resume
// ===========================================================================

#[tokio::test]
async fn mid_auction_snapshot_resumes_at_saved_cursor() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, indexed_snapshot());

    let before = Utc::now();
    let recovered = resume_from(&local, remote.clone(), OLD_ID, 7).await;
    let after = Utc::now();

    let handoff = &recovered.handoff;
    let names: Vec<_> = handoff.players.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(handoff.tournament, "Spring Cup");

    let resume = &handoff.resume_data;
    assert_eq!(resume.round, 2);
    assert_eq!(resume.player_idx, 1);
    assert_eq!(resume.sequence, vec!["A", "B"]);
    assert_eq!(
        resume.balances.get("X"),
        Some(&TeamLedger {
            balance: 500,
            acquired: 1
        })
    );

    assert_eq!(resume.log.len(), 1);
    let entry = &resume.log[0];
    assert_eq!(entry.status, BidStatus::Sold);
    assert_eq!(entry.amount, Some(500));
    assert_eq!(entry.attempt, 1);
    let stamped: DateTime<Utc> = entry.timestamp.parse().unwrap();
    assert!(stamped >= before - chrono::Duration::seconds(1) && stamped <= after);

    recovered.copy_forward.outcome().await;
}

#[tokio::test]
async fn sparse_players_with_one_sale_resume_in_order() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(
        OLD_ID,
        json!({
            "players": {"0": {"id": 1, "name": "A"}, "1": {"id": 2, "name": "B"}},
            "teamBalances": [{"name": "X", "balance": 500, "acquired": 1}],
            "auctionLog": [{"playerName": "A", "team": "X", "amount": 300, "status": "Sold"}],
            "round": 2,
            "playerIdx": 1
        }),
    );

    let recovered = resume_from(&local, remote, OLD_ID, 12).await;
    let resume = &recovered.handoff.resume_data;
    assert_eq!(resume.sequence, vec!["A", "B"]);
    assert_eq!(resume.balances.len(), 1);
    assert_eq!(resume.balances["X"], TeamLedger { balance: 500, acquired: 1 });
    assert_eq!(resume.log.len(), 1);
    assert_eq!(resume.log[0].round, 1);
    assert_eq!(resume.log[0].attempt, 1);
    assert_eq!(resume.log[0].amount, Some(300));
    assert!(resume.log[0].timestamp.parse::<DateTime<Utc>>().is_ok());
    assert_eq!((resume.round, resume.player_idx), (2, 1));

    recovered.copy_forward.outcome().await;
}

#[tokio::test]
async fn indexed_and_ordered_snapshots_resume_identically() {
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert("indexed", indexed_snapshot());
    remote.insert("ordered", ordered_snapshot());

    let local_a = SqliteStore::open(":memory:").unwrap();
    let local_b = SqliteStore::open(":memory:").unwrap();
    let a = resume_from(&local_a, remote.clone(), "indexed", 1).await;
    let b = resume_from(&local_b, remote.clone(), "ordered", 1).await;

    assert_eq!(a.handoff.players, b.handoff.players);
    assert_eq!(a.handoff.teams, b.handoff.teams);
    assert_eq!(a.handoff.resume_data.round, b.handoff.resume_data.round);
    assert_eq!(a.handoff.resume_data.player_idx, b.handoff.resume_data.player_idx);
    assert_eq!(a.handoff.resume_data.sequence, b.handoff.resume_data.sequence);
    assert_eq!(a.handoff.resume_data.balances, b.handoff.resume_data.balances);
    assert_eq!(a.handoff.resume_data.log.len(), b.handoff.resume_data.log.len());

    a.copy_forward.outcome().await;
    b.copy_forward.outcome().await;
}

#[tokio::test]
async fn sequence_covers_every_player_even_with_holes() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(
        OLD_ID,
        json!({
            "players": [{"id": 1, "name": "A"}, null, {"id": 3, "name": "C"}, {"name": "D"}]
        }),
    );

    let recovered = resume_from(&local, remote, OLD_ID, 2).await;
    let handoff = &recovered.handoff;
    assert_eq!(handoff.players.len(), 3);
    assert_eq!(handoff.resume_data.sequence.len(), handoff.players.len());
    assert_eq!(handoff.resume_data.round, 1);
    assert_eq!(handoff.resume_data.player_idx, 0);
    assert!(!recovered.defaulted.is_empty());

    recovered.copy_forward.outcome().await;
}

#[tokio::test]
async fn scalar_document_resumes_as_empty_auction() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, json!("corrupted"));

    let recovered = resume_from(&local, remote, OLD_ID, 3).await;
    assert!(recovered.handoff.players.is_empty());
    assert!(recovered.handoff.teams.is_empty());
    assert_eq!(recovered.handoff.resume_data.round, 1);

    recovered.copy_forward.outcome().await;
}

// ===========================================================================
// Nothing to recover
// ===========================================================================

#[tokio::test]
async fn missing_snapshot_leaves_device_untouched() {
    let local = SqliteStore::open(":memory:").unwrap();
    local.set(CURRENT_AUCTION_KEY, &json!(OLD_ID)).unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());

    let outcome = Recovery::new(&local, &local, remote.clone())
        .recover(
            &SessionContext::load(&local),
            OLD_ID,
            &mut StdRng::seed_from_u64(4),
        )
        .await;

    match outcome {
        RecoveryOutcome::NothingToRecover(NothingToRecover::Absent { auction_id }) => {
            assert_eq!(auction_id, OLD_ID)
        }
        other => panic!("expected absent snapshot, got {other:?}"),
    }
    assert_eq!(local.get(CURRENT_AUCTION_KEY).unwrap(), Some(json!(OLD_ID)));
    assert_eq!(remote.write_attempts(), 0);
}

// ===========================================================================
// Photos
// ===========================================================================

#[tokio::test]
async fn photos_are_restored_from_local_blobs_and_carried_forward() {
    let local = SqliteStore::open(":memory:").unwrap();
    local
        .save_photos(OLD_ID, &[player_with_photo(2, "B", "data:image/png;base64,QUJD")])
        .unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, ordered_snapshot());

    let recovered = resume_from(&local, remote, OLD_ID, 5).await;

    assert_eq!(recovered.photos.total, 2);
    assert_eq!(recovered.photos.with_photo, 1);
    assert_eq!(recovered.photos.without_photo, 1);
    assert_eq!(recovered.handoff.players[0].photo, None);
    assert_eq!(
        recovered.handoff.players[1].photo,
        Some(Photo("data:image/png;base64,QUJD".into()))
    );

    // The merged photo set follows the session to its new id.
    assert_eq!(local.photo_count(&recovered.session.id).unwrap(), 1);

    recovered.copy_forward.outcome().await;
}

#[tokio::test]
async fn text_ids_match_numeric_photo_keys() {
    let local = SqliteStore::open(":memory:").unwrap();
    local
        .save_photos(OLD_ID, &[player_with_photo(1, "A", "https://img.example/a.png")])
        .unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, json!({"players": [{"id": "1", "name": "A"}]}));

    let recovered = resume_from(&local, remote, OLD_ID, 6).await;
    assert_eq!(recovered.photos.with_photo, 1);
    assert_eq!(
        recovered.handoff.players[0].photo,
        Some(Photo("https://img.example/a.png".into()))
    );

    recovered.copy_forward.outcome().await;
}

// ===========================================================================
// Rotation and copy-forward
// ===========================================================================

#[tokio::test]
async fn resume_rotates_to_a_fresh_id_and_copies_forward() {
    let local = SqliteStore::open(":memory:").unwrap();
    local.set(CURRENT_AUCTION_KEY, &json!(OLD_ID)).unwrap();
    local.set(&auction_record_key(OLD_ID), &json!({"stale": true})).unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, indexed_snapshot());

    let recovered = resume_from(&local, remote.clone(), OLD_ID, 8).await;
    let new_id = recovered.session.id.clone();

    assert_ne!(new_id, OLD_ID);
    assert_eq!(new_id.len(), 8);
    assert!(new_id.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(recovered.session.previous.as_deref(), Some(OLD_ID));
    assert_eq!(recovered.context.current_id(), Some(new_id.as_str()));
    assert_eq!(recovered.handoff.auction_id, new_id);

    // Exactly one current pointer, now naming the new session.
    assert_eq!(local.get(CURRENT_AUCTION_KEY).unwrap(), Some(json!(new_id)));
    assert!(local.get(&auction_record_key(OLD_ID)).unwrap().is_none());

    assert_eq!(
        recovered.copy_forward.outcome().await,
        CopyForwardOutcome::Written {
            auction_id: new_id.clone()
        }
    );

    let copied = remote.get(&new_id).unwrap();
    assert_eq!(copied["sessionId"], json!(new_id));
    assert_eq!(copied["resumedFrom"], json!(OLD_ID));
    assert!(copied["resumedAt"].is_string());
    assert_eq!(copied["round"], json!(2));
    // The old path is left as it was.
    assert_eq!(remote.get(OLD_ID), Some(indexed_snapshot()));
}

#[tokio::test]
async fn rejected_copy_forward_does_not_undo_the_resume() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, ordered_snapshot());
    remote.reject_writes(true);

    let recovered = resume_from(&local, remote.clone(), OLD_ID, 9).await;
    let new_id = recovered.session.id.clone();

    assert!(matches!(
        recovered.copy_forward.outcome().await,
        CopyForwardOutcome::Failed { .. }
    ));
    assert_eq!(local.get(CURRENT_AUCTION_KEY).unwrap(), Some(json!(new_id)));
    assert_eq!(recovered.handoff.resume_data.round, 2);
    assert!(remote.get(&new_id).is_none());
}

#[tokio::test]
async fn resuming_twice_yields_distinct_sessions() {
    let local = SqliteStore::open(":memory:").unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.insert(OLD_ID, ordered_snapshot());

    let first = resume_from(&local, remote.clone(), OLD_ID, 10).await;
    let first_id = first.session.id.clone();
    first.copy_forward.outcome().await;

    let second = resume_from(&local, remote.clone(), &first_id, 11).await;
    assert_ne!(second.session.id, first_id);
    assert_ne!(second.session.id, OLD_ID);
    assert_eq!(second.session.previous.as_deref(), Some(first_id.as_str()));
    assert_eq!(second.handoff.resume_data.round, 2);

    second.copy_forward.outcome().await;
}
