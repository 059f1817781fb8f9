// Resume state builder: derives the replay cursor, team ledger and bid log
// the bidding core needs to continue an auction.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::model::{BidLogEntry, BidStatus, ResumeState, Team, TeamLedger};
use crate::snapshot::{
    Defaulted, Defaulting, LogRecord, Snapshot, KEY_AUCTION_LOG, KEY_PLAYER_IDX, KEY_ROUND,
};

/// Build the resume state for `snapshot`. Never fails: absent fields take
/// their documented defaults and are listed in the result.
///
/// `now` stamps log lines that carry no timestamp.
pub fn build_resume_state(snapshot: &Snapshot, now: DateTime<Utc>) -> Defaulting<ResumeState> {
    let mut defaulted = Vec::new();

    let sequence = snapshot.players.iter().map(|p| p.name.clone()).collect();
    let balances = build_balances(snapshot, &mut defaulted);
    let log = snapshot
        .auction_log
        .iter()
        .enumerate()
        .map(|(index, record)| log_entry(index, record, now, &mut defaulted))
        .collect();

    let round = match snapshot.round {
        Some(r) if r >= 1 => u32::try_from(r).unwrap_or(u32::MAX),
        Some(_) => {
            defaulted.push(Defaulted::Missing(KEY_ROUND));
            1
        }
        None => 1,
    };
    let player_idx = match snapshot.player_idx {
        Some(i) if i >= 0 => usize::try_from(i).unwrap_or(usize::MAX),
        Some(_) => {
            defaulted.push(Defaulted::Missing(KEY_PLAYER_IDX));
            0
        }
        None => 0,
    };

    Defaulting {
        value: ResumeState {
            round,
            player_idx,
            sequence,
            balances,
            log,
        },
        defaulted,
    }
}

/// Team ledger keyed by name. `teamBalances` is the source of truth; the
/// plain `teams` list is used when no balances were saved. Any team named
/// elsewhere in the snapshot but missing here gets a fresh ledger.
fn build_balances(
    snapshot: &Snapshot,
    defaulted: &mut Vec<Defaulted>,
) -> IndexMap<String, TeamLedger> {
    let source: &[Team] = if snapshot.team_balances.is_empty() {
        &snapshot.teams
    } else {
        &snapshot.team_balances
    };

    let mut balances = IndexMap::new();
    for team in source.iter().filter(|t| !t.name.trim().is_empty()) {
        balances.insert(
            team.name.clone(),
            TeamLedger {
                balance: team.balance,
                acquired: team.acquired,
            },
        );
    }

    let referenced = snapshot
        .teams
        .iter()
        .map(|t| t.name.as_str())
        .chain(snapshot.auction_log.iter().map(|r| r.team.as_str()))
        .filter(|name| !name.trim().is_empty());

    for name in referenced {
        if balances.contains_key(name) {
            continue;
        }
        defaulted.push(Defaulted::SynthesizedTeam(name.to_string()));
        balances.insert(
            name.to_string(),
            TeamLedger {
                balance: snapshot.default_balance,
                acquired: 0,
            },
        );
    }

    balances
}

fn log_entry(
    index: usize,
    record: &LogRecord,
    now: DateTime<Utc>,
    defaulted: &mut Vec<Defaulted>,
) -> BidLogEntry {
    let mut fill = |field: &'static str| {
        defaulted.push(Defaulted::Field {
            collection: KEY_AUCTION_LOG,
            index,
            field,
        })
    };

    let round = record.round.unwrap_or_else(|| {
        fill("round");
        1
    });
    let attempt = record.attempt.unwrap_or_else(|| {
        fill("attempt");
        1
    });
    let timestamp = record.timestamp.clone().unwrap_or_else(|| {
        fill("timestamp");
        now.to_rfc3339()
    });

    let status = match record.status.as_deref() {
        Some(raw) => BidStatus::parse(raw).unwrap_or_else(|| {
            defaulted.push(Defaulted::UnknownStatus {
                index,
                raw: raw.to_string(),
            });
            BidStatus::Unsold
        }),
        None => {
            defaulted.push(Defaulted::Field {
                collection: KEY_AUCTION_LOG,
                index,
                field: "status",
            });
            BidStatus::Unsold
        }
    };

    BidLogEntry {
        round,
        attempt,
        timestamp,
        player_name: record.player_name.clone(),
        team: record.team.clone(),
        amount: record.amount,
        status,
        category: record.category.clone(),
        note: record.note.clone(),
        extra: record.extra.clone(),
    }
}
