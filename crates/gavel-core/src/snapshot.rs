// Snapshot normalization: turns a raw remote-store document into canonical,
// fully-defaulted records.
//
// The remote store serializes ordered collections as index-keyed mappings
// whenever it feels like it (`{"0": .., "1": ..}`), drops trailing holes, and
// returns whatever an older client wrote. Nothing in here fails: every
// structurally absent or malformed field degrades to a default, and the
// default is recorded in the returned `Defaulting` so callers and tests can
// see exactly what fired.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Photo, Player, PlayerId, Team};

// ---------------------------------------------------------------------------
// Document keys
// ---------------------------------------------------------------------------

pub const KEY_TOURNAMENT: &str = "tournament";
pub const KEY_PLAYERS: &str = "players";
pub const KEY_TEAMS: &str = "teams";
pub const KEY_TEAM_BALANCES: &str = "teamBalances";
pub const KEY_AUCTION_LOG: &str = "auctionLog";
pub const KEY_ROUND: &str = "round";
pub const KEY_PLAYER_IDX: &str = "playerIdx";
pub const KEY_DEFAULT_BALANCE: &str = "defaultBalance";
pub const KEY_MIN_PLAYERS: &str = "minPlayersPerTeam";
pub const KEY_MAX_PLAYERS: &str = "maxPlayersPerTeam";
pub const KEY_BLUE_CAP: &str = "blueCapPercent";

const KNOWN_KEYS: &[&str] = &[
    KEY_TOURNAMENT,
    KEY_PLAYERS,
    KEY_TEAMS,
    KEY_TEAM_BALANCES,
    KEY_AUCTION_LOG,
    KEY_ROUND,
    KEY_PLAYER_IDX,
    KEY_DEFAULT_BALANCE,
    KEY_MIN_PLAYERS,
    KEY_MAX_PLAYERS,
    KEY_BLUE_CAP,
];

// ---------------------------------------------------------------------------
// Defaulting bookkeeping
// ---------------------------------------------------------------------------

/// A single default (or repair) applied while reconciling a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defaulted {
    /// The whole document was not a mapping; everything is defaulted.
    NotAMapping,
    /// A top-level field was absent or had an unusable type.
    Missing(&'static str),
    /// A `null` hole in a sparse collection was skipped.
    Hole { collection: &'static str, index: usize },
    /// A field of one record in a collection was absent, malformed or clamped.
    Field {
        collection: &'static str,
        index: usize,
        field: &'static str,
    },
    /// A player id collided with an earlier one and was replaced.
    DuplicateId { index: usize, id: PlayerId },
    /// A player referenced by the log was missing and has been appended.
    SynthesizedPlayer(String),
    /// A team referenced by the log or team list was missing from balances.
    SynthesizedTeam(String),
    /// A log status outside the known set was replaced with `Unsold`.
    UnknownStatus { index: usize, raw: String },
}

/// A reconciled value plus every default that fired while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaulting<T> {
    pub value: T,
    pub defaulted: Vec<Defaulted>,
}

impl<T> Defaulting<T> {
    /// Whether `default` fired.
    pub fn fired(&self, default: &Defaulted) -> bool {
        self.defaulted.contains(default)
    }
}

// ---------------------------------------------------------------------------
// OrderedOrIndexed
// ---------------------------------------------------------------------------

/// A collection as delivered by the remote store: either a real sequence or
/// a mapping from (usually numeric) string keys to entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderedOrIndexed<T> {
    Ordered(Vec<T>),
    Indexed(IndexMap<String, T>),
}

impl<T> OrderedOrIndexed<T> {
    /// Flatten into a sequence. Numeric keys come first in ascending numeric
    /// order; any other keys follow in document order.
    pub fn into_ordered(self) -> Vec<T> {
        match self {
            OrderedOrIndexed::Ordered(items) => items,
            OrderedOrIndexed::Indexed(entries) => {
                let mut numeric = Vec::new();
                let mut other = Vec::new();
                for (key, item) in entries {
                    match key.trim().parse::<u64>() {
                        Ok(idx) => numeric.push((idx, item)),
                        Err(_) => other.push(item),
                    }
                }
                numeric.sort_by_key(|(idx, _)| *idx);
                numeric
                    .into_iter()
                    .map(|(_, item)| item)
                    .chain(other)
                    .collect()
            }
        }
    }
}

impl OrderedOrIndexed<Value> {
    /// Classify a raw JSON value. Returns `None` for anything that is neither
    /// an array nor an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(OrderedOrIndexed::Ordered(items.clone())),
            Value::Object(map) => Some(OrderedOrIndexed::Indexed(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized snapshot
// ---------------------------------------------------------------------------

/// A bid-log line as found in the snapshot. Fields the resume builder
/// defaults are kept optional here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub round: Option<u32>,
    pub attempt: Option<u32>,
    pub timestamp: Option<String>,
    pub player_name: String,
    pub team: String,
    pub amount: Option<u64>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub extra: Map<String, Value>,
}

/// Canonical in-memory form of a remote auction document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub tournament: String,
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    pub team_balances: Vec<Team>,
    pub auction_log: Vec<LogRecord>,
    pub round: Option<i64>,
    pub player_idx: Option<i64>,
    pub default_balance: u64,
    pub min_players_per_team: Option<u32>,
    pub max_players_per_team: Option<u32>,
    pub blue_cap_percent: Option<f64>,
    /// Top-level fields this crate does not interpret.
    pub extra: Map<String, Value>,
}

/// Normalize a raw remote document. Pure; never fails; never touches
/// `document`.
pub fn normalize(document: &Value) -> Defaulting<Snapshot> {
    let mut defaulted = Vec::new();

    let Some(doc) = document.as_object() else {
        return Defaulting {
            value: Snapshot::default(),
            defaulted: vec![Defaulted::NotAMapping],
        };
    };

    let tournament = match doc.get(KEY_TOURNAMENT).and_then(as_text) {
        Some(t) => t,
        None => {
            defaulted.push(Defaulted::Missing(KEY_TOURNAMENT));
            String::new()
        }
    };

    let default_balance = match doc.get(KEY_DEFAULT_BALANCE).and_then(as_number) {
        Some(n) => to_balance(n),
        None => {
            defaulted.push(Defaulted::Missing(KEY_DEFAULT_BALANCE));
            0
        }
    };

    let parsed = collection(doc, KEY_PLAYERS, &mut defaulted)
        .iter()
        .filter_map(|(index, value)| player_record(*index, value, &mut defaulted))
        .collect::<Vec<_>>();
    let mut players = assign_player_ids(parsed, &mut defaulted);

    let teams = team_collection(doc, KEY_TEAMS, default_balance, &mut defaulted);
    let team_balances = team_collection(doc, KEY_TEAM_BALANCES, default_balance, &mut defaulted);

    let auction_log = collection(doc, KEY_AUCTION_LOG, &mut defaulted)
        .iter()
        .map(|(index, value)| log_record(*index, value, &mut defaulted))
        .collect::<Vec<_>>();

    append_log_players(&mut players, &auction_log, &mut defaulted);

    let round = cursor(doc, KEY_ROUND, &mut defaulted);
    let player_idx = cursor(doc, KEY_PLAYER_IDX, &mut defaulted);

    let min_players_per_team = doc.get(KEY_MIN_PLAYERS).and_then(as_number).map(to_count);
    let max_players_per_team = doc.get(KEY_MAX_PLAYERS).and_then(as_number).map(to_count);
    let blue_cap_percent = doc.get(KEY_BLUE_CAP).and_then(as_number);

    let extra = doc
        .iter()
        .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Defaulting {
        value: Snapshot {
            tournament,
            players,
            teams,
            team_balances,
            auction_log,
            round,
            player_idx,
            default_balance,
            min_players_per_team,
            max_players_per_team,
            blue_cap_percent,
            extra,
        },
        defaulted,
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Pull a collection out of the document as an ordered sequence, dropping
/// `null` holes. Each entry keeps its position in the ordered sequence, so
/// every index recorded in a `Defaulted` refers to the same slot whether or
/// not holes came before it.
fn collection(
    doc: &Map<String, Value>,
    key: &'static str,
    defaulted: &mut Vec<Defaulted>,
) -> Vec<(usize, Value)> {
    let Some(shape) = doc.get(key).and_then(OrderedOrIndexed::from_value) else {
        defaulted.push(Defaulted::Missing(key));
        return Vec::new();
    };

    let mut items = Vec::new();
    for (index, item) in shape.into_ordered().into_iter().enumerate() {
        if item.is_null() {
            defaulted.push(Defaulted::Hole {
                collection: key,
                index,
            });
        } else {
            items.push((index, item));
        }
    }
    items
}

fn team_collection(
    doc: &Map<String, Value>,
    key: &'static str,
    default_balance: u64,
    defaulted: &mut Vec<Defaulted>,
) -> Vec<Team> {
    collection(doc, key, defaulted)
        .iter()
        .map(|(index, value)| team_record(key, *index, value, default_balance, defaulted))
        .collect()
}

const PLAYER_KEYS: &[&str] = &["id", "name", "category", "photo"];
const TEAM_KEYS: &[&str] = &["name", "balance", "acquired"];
const LOG_KEYS: &[&str] = &[
    "round",
    "attempt",
    "timestamp",
    "playerName",
    "team",
    "amount",
    "status",
    "category",
    "note",
];

/// A player record before ids are settled across the whole collection.
struct ParsedPlayer {
    index: usize,
    id: Option<PlayerId>,
    name: String,
    category: String,
    photo: Option<Photo>,
    extra: Map<String, Value>,
}

fn player_record(
    index: usize,
    value: &Value,
    defaulted: &mut Vec<Defaulted>,
) -> Option<ParsedPlayer> {
    let fields = match value {
        Value::Object(map) => map,
        // Bare names show up in hand-edited documents.
        Value::String(name) => {
            defaulted.push(record_field(KEY_PLAYERS, index, "id"));
            return Some(ParsedPlayer {
                index,
                id: None,
                name: name.clone(),
                category: String::new(),
                photo: None,
                extra: Map::new(),
            });
        }
        _ => {
            defaulted.push(Defaulted::Hole {
                collection: KEY_PLAYERS,
                index,
            });
            return None;
        }
    };

    let id = fields.get("id").and_then(PlayerId::from_value);
    if id.is_none() {
        defaulted.push(record_field(KEY_PLAYERS, index, "id"));
    }
    let name = match fields.get("name").and_then(as_text) {
        Some(name) => name,
        None => {
            defaulted.push(record_field(KEY_PLAYERS, index, "name"));
            String::new()
        }
    };
    let category = fields.get("category").and_then(as_text).unwrap_or_default();
    let photo = fields
        .get("photo")
        .and_then(as_text)
        .filter(|p| !p.trim().is_empty())
        .map(Photo);

    Some(ParsedPlayer {
        index,
        id,
        name,
        category,
        photo,
        extra: unknown_fields(fields, PLAYER_KEYS),
    })
}

/// Settle player ids. The first record carrying an explicit id keeps it; a
/// repeated explicit id and a missing id both get a synthesized
/// `player-<index>` id that avoids every explicit id in the collection, so
/// photos keyed by a real id always stay with that player.
fn assign_player_ids(parsed: Vec<ParsedPlayer>, defaulted: &mut Vec<Defaulted>) -> Vec<Player> {
    let explicit: HashSet<PlayerId> = parsed.iter().filter_map(|p| p.id.clone()).collect();
    let mut assigned: HashSet<PlayerId> = HashSet::new();
    let mut players = Vec::with_capacity(parsed.len());

    for record in parsed {
        let id = match record.id {
            Some(id) if !assigned.contains(&id) => id,
            repeated => {
                if let Some(id) = repeated {
                    defaulted.push(Defaulted::DuplicateId {
                        index: record.index,
                        id,
                    });
                }
                unique_id(&format!("player-{}", record.index), |candidate| {
                    explicit.contains(candidate) || assigned.contains(candidate)
                })
            }
        };
        assigned.insert(id.clone());
        players.push(Player {
            id,
            name: record.name,
            category: record.category,
            photo: record.photo,
            extra: record.extra,
        });
    }
    players
}

fn team_record(
    collection: &'static str,
    index: usize,
    value: &Value,
    default_balance: u64,
    defaulted: &mut Vec<Defaulted>,
) -> Team {
    let fields = match value {
        Value::Object(map) => map,
        Value::String(name) => {
            defaulted.push(record_field(collection, index, "balance"));
            defaulted.push(record_field(collection, index, "acquired"));
            return Team::new(name.clone(), default_balance, 0);
        }
        _ => {
            for field in TEAM_KEYS {
                defaulted.push(record_field(collection, index, *field));
            }
            return Team::new(String::new(), default_balance, 0);
        }
    };

    let name = match fields.get("name").and_then(as_text) {
        Some(name) => name,
        None => {
            defaulted.push(record_field(collection, index, "name"));
            String::new()
        }
    };
    let balance = match fields.get("balance").and_then(as_number) {
        Some(n) if n < 0.0 => {
            defaulted.push(record_field(collection, index, "balance"));
            0
        }
        Some(n) => to_balance(n),
        None => {
            defaulted.push(record_field(collection, index, "balance"));
            default_balance
        }
    };
    let acquired = match fields.get("acquired").and_then(as_number) {
        Some(n) => to_count(n),
        None => {
            defaulted.push(record_field(collection, index, "acquired"));
            0
        }
    };

    Team {
        name,
        balance,
        acquired,
        extra: unknown_fields(fields, TEAM_KEYS),
    }
}

fn log_record(index: usize, value: &Value, defaulted: &mut Vec<Defaulted>) -> LogRecord {
    let Some(fields) = value.as_object() else {
        // Keep the line; the builder fills in the rest.
        defaulted.push(record_field(KEY_AUCTION_LOG, index, "playerName"));
        return LogRecord::default();
    };

    let player_name = match fields.get("playerName").and_then(as_text) {
        Some(name) => name,
        None => {
            defaulted.push(record_field(KEY_AUCTION_LOG, index, "playerName"));
            String::new()
        }
    };

    LogRecord {
        round: fields.get("round").and_then(as_number).and_then(to_ordinal),
        attempt: fields.get("attempt").and_then(as_number).and_then(to_ordinal),
        timestamp: fields.get("timestamp").and_then(as_timestamp),
        player_name,
        team: fields.get("team").and_then(as_text).unwrap_or_default(),
        amount: log_amount(index, fields.get("amount"), defaulted),
        status: fields.get("status").and_then(as_text),
        category: fields.get("category").and_then(as_text),
        note: fields.get("note").and_then(as_text),
        extra: unknown_fields(fields, LOG_KEYS),
    }
}

/// Null, missing and blank amounts are an unsold line's normal shape. Any
/// other value that is not a non-negative number is dropped and recorded.
fn log_amount(index: usize, value: Option<&Value>, defaulted: &mut Vec<Defaulted>) -> Option<u64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(raw) => match as_number(raw) {
            Some(n) if n >= 0.0 => Some(to_balance(n)),
            _ => {
                defaulted.push(record_field(KEY_AUCTION_LOG, index, "amount"));
                None
            }
        },
    }
}

fn unknown_fields(fields: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Make sure every player named in the log exists in the player sequence.
fn append_log_players(
    players: &mut Vec<Player>,
    log: &[LogRecord],
    defaulted: &mut Vec<Defaulted>,
) {
    let mut known: HashSet<String> = players.iter().map(|p| p.name.clone()).collect();
    let mut taken: HashSet<PlayerId> = players.iter().map(|p| p.id.clone()).collect();

    for record in log {
        if record.player_name.is_empty() || known.contains(&record.player_name) {
            continue;
        }
        let id = unique_id(&format!("log-{}", players.len()), |id| taken.contains(id));
        taken.insert(id.clone());
        known.insert(record.player_name.clone());
        defaulted.push(Defaulted::SynthesizedPlayer(record.player_name.clone()));
        players.push(Player {
            id,
            name: record.player_name.clone(),
            category: record.category.clone().unwrap_or_default(),
            photo: None,
            extra: Map::new(),
        });
    }
}

fn cursor(
    doc: &Map<String, Value>,
    key: &'static str,
    defaulted: &mut Vec<Defaulted>,
) -> Option<i64> {
    let value = doc.get(key).and_then(as_number).map(|n| n.trunc() as i64);
    if value.is_none() {
        defaulted.push(Defaulted::Missing(key));
    }
    value
}

// ---------------------------------------------------------------------------
// Scalar helpers
// ---------------------------------------------------------------------------

fn record_field(collection: &'static str, index: usize, field: &'static str) -> Defaulted {
    Defaulted::Field {
        collection,
        index,
        field,
    }
}

fn unique_id(base: &str, is_taken: impl Fn(&PlayerId) -> bool) -> PlayerId {
    let mut candidate = PlayerId::Text(base.to_string());
    let mut suffix = 1;
    while is_taken(&candidate) {
        candidate = PlayerId::Text(format!("{base}-{suffix}"));
        suffix += 1;
    }
    candidate
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, and strings that look like numbers. Empty strings are absent.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Strings pass through; numbers are epoch milliseconds.
fn as_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|ts| ts.to_rfc3339()),
        _ => None,
    }
}

fn to_balance(n: f64) -> u64 {
    if n <= 0.0 {
        0
    } else {
        n.round() as u64
    }
}

fn to_count(n: f64) -> u32 {
    if n <= 0.0 {
        0
    } else {
        n.trunc().min(u32::MAX as f64) as u32
    }
}

/// Round and attempt numbers start at 1; anything lower counts as absent.
fn to_ordinal(n: f64) -> Option<u32> {
    let n = to_count(n);
    (n >= 1).then_some(n)
}
