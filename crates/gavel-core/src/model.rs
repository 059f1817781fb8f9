// Auction domain records: players, teams, bid log, resume state, sessions,
// and the setup object handed to the live bidding screen.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Stable player identifier. The remote store has carried both numeric and
/// string ids across sessions, so both forms are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerId {
    Number(i64),
    Text(String),
}

impl PlayerId {
    /// Parse an id out of an arbitrary JSON value. Integral numbers become
    /// `Number`, everything else that has a sensible textual form becomes
    /// `Text`. Returns `None` for null, empty strings, and containers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(PlayerId::Number(i)),
                None => Some(PlayerId::Text(n.to_string())),
            },
            Value::String(s) if !s.trim().is_empty() => Some(PlayerId::Text(s.clone())),
            _ => None,
        }
    }

    /// The same id in its other representation: `Number(2)` <-> `Text("2")`.
    /// Returns `None` when the text is not an integer.
    pub fn coerced(&self) -> Option<PlayerId> {
        match self {
            PlayerId::Number(n) => Some(PlayerId::Text(n.to_string())),
            PlayerId::Text(s) => s.trim().parse::<i64>().ok().map(PlayerId::Number),
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Number(n) => write!(f, "{n}"),
            PlayerId::Text(s) => f.write_str(s),
        }
    }
}

/// Reference to a player photograph: a `data:` URI for locally uploaded
/// images or a plain URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Photo(pub String);

impl Photo {
    /// Whether the photo bytes are embedded in the reference.
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

/// A player up for auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Category tag (e.g. "Blue", "Batter").
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Photo>,
    /// Fields this crate does not interpret (current-bid annotations, base
    /// price, ...). Carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

/// A bidding team as it appears in the `teams` / `teamBalances` collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub balance: u64,
    pub acquired: u32,
    /// Fields this crate does not interpret (logo, colour, owner, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Team {
    pub fn new(name: impl Into<String>, balance: u64, acquired: u32) -> Self {
        Self {
            name: name.into(),
            balance,
            acquired,
            extra: Map::new(),
        }
    }
}

/// Balance and acquisition count for one team inside a [`ResumeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamLedger {
    pub balance: u64,
    pub acquired: u32,
}

// ---------------------------------------------------------------------------
// Bid log
// ---------------------------------------------------------------------------

/// Outcome of a single bidding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidStatus {
    Sold,
    Unsold,
    Skipped,
}

impl BidStatus {
    /// Case-insensitive parse of the status strings written by the bidding
    /// screen.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sold" => Some(BidStatus::Sold),
            "unsold" => Some(BidStatus::Unsold),
            "skipped" | "skip" => Some(BidStatus::Skipped),
            _ => None,
        }
    }
}

/// One line of the append-only auction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidLogEntry {
    pub round: u32,
    pub attempt: u32,
    pub timestamp: String,
    pub player_name: String,
    /// Empty when the player went unsold.
    pub team: String,
    pub amount: Option<u64>,
    pub status: BidStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Resume state
// ---------------------------------------------------------------------------

/// Everything the bidding core needs to continue an auction where it left
/// off. Recomputed on every resume, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub round: u32,
    pub player_idx: usize,
    /// Player display names in replay order.
    pub sequence: Vec<String>,
    /// Team name -> ledger, in snapshot order.
    pub balances: IndexMap<String, TeamLedger>,
    pub log: Vec<BidLogEntry>,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A session (auction) identifier together with the one it resumed from.
/// Whoever holds the current id is authoritative; older ids are dead paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub previous: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Hand-off to the bidding screen
// ---------------------------------------------------------------------------

/// Fully populated setup object passed to the live bidding core after a
/// resume.
///
/// `bid_log` is always empty here: the authoritative history lives in
/// `resume_data.log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupHandoff {
    pub tournament: String,
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    pub bid_log: Vec<BidLogEntry>,
    pub player_images: HashMap<String, Photo>,
    pub team_logos: HashMap<String, Photo>,
    pub default_balance: u64,
    pub resume_data: ResumeState,
    pub auction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_players_per_team: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players_per_team: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blue_cap_percent: Option<f64>,
}
