// SQLite persistence for the device-local cache and photo blob store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde_json::Value;

use super::{BlobStore, LocalCache};
use crate::model::{Photo, Player, PlayerId};

/// SQLite-backed local storage: a key-value table for cached auction records
/// and the current-session pointer, and a photo table keyed by auction and
/// player id.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open local store at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set local store pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_entries (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS player_photos (
                auction_id TEXT NOT NULL,
                player_key TEXT NOT NULL,
                photo      TEXT NOT NULL,
                saved_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (auction_id, player_key)
            );
            ",
        )
        .context("failed to create local store schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("local store mutex poisoned")
    }

    /// Number of photos stored for `auction_id`.
    pub fn photo_count(&self, auction_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM player_photos WHERE auction_id = ?1",
                params![auction_id],
                |row| row.get(0),
            )
            .context("failed to count player photos")?;
        Ok(count as usize)
    }
}

impl LocalCache for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM cache_entries WHERE key = ?1")
            .context("failed to prepare cache lookup")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query cache entry")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read cache row")?;
                let value = serde_json::from_str(&json_str)
                    .with_context(|| format!("failed to deserialize cache entry {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn();
        let json_str = serde_json::to_string(value).context("failed to serialize cache value")?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to write cache entry")?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn();
        let removed = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .context("failed to delete cache entry")?;
        Ok(removed > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key FROM cache_entries ORDER BY key")
            .context("failed to prepare cache key listing")?;
        let keys = stmt
            .query_map([], |row| row.get(0))
            .context("failed to list cache keys")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to read cache keys")?;
        Ok(keys)
    }
}

impl BlobStore for SqliteStore {
    /// Rows whose key no longer parses are skipped rather than failing the
    /// whole load.
    fn load_photos(&self, auction_id: &str) -> Result<HashMap<PlayerId, Photo>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT player_key, photo FROM player_photos WHERE auction_id = ?1")
            .context("failed to prepare photo query")?;

        let rows = stmt
            .query_map(params![auction_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query player photos")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player photo rows")?;

        let photos = rows
            .into_iter()
            .filter_map(|(key, photo)| {
                serde_json::from_str::<PlayerId>(&key)
                    .ok()
                    .map(|id| (id, Photo(photo)))
            })
            .collect();
        Ok(photos)
    }

    /// Upserts in a single transaction: either every photo is saved or none
    /// is.
    fn save_photos(&self, auction_id: &str, players: &[Player]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin photo transaction")?;

        for player in players {
            let Some(photo) = &player.photo else {
                continue;
            };
            let key = serde_json::to_string(&player.id).context("failed to encode player id")?;
            tx.execute(
                "INSERT OR REPLACE INTO player_photos (auction_id, player_key, photo)
                 VALUES (?1, ?2, ?3)",
                params![auction_id, key, photo.0],
            )
            .context("failed to save player photo")?;
        }

        tx.commit().context("failed to commit photo save")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CURRENT_AUCTION_KEY;
    use serde_json::{json, Map};

    /// Helper: create a fresh in-memory store for each test.
    fn test_store() -> SqliteStore {
        SqliteStore::open(":memory:").expect("in-memory store should open")
    }

    fn player(id: PlayerId, name: &str, photo: Option<&str>) -> Player {
        Player {
            id,
            name: name.to_string(),
            category: String::new(),
            photo: photo.map(|p| Photo(p.to_string())),
            extra: Map::new(),
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let store = test_store();
        let conn = store.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"cache_entries".to_string()));
        assert!(tables.contains(&"player_photos".to_string()));
    }

    // ------------------------------------------------------------------
    // Cache entries
    // ------------------------------------------------------------------

    #[test]
    fn cache_set_get_round_trip() {
        let store = test_store();
        store.set("auction:abc", &json!({"round": 2})).unwrap();
        assert_eq!(store.get("auction:abc").unwrap(), Some(json!({"round": 2})));
    }

    #[test]
    fn cache_get_returns_none_for_missing_key() {
        let store = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn cache_set_overwrites_previous_value() {
        let store = test_store();
        store.set(CURRENT_AUCTION_KEY, &json!("aaaa1111")).unwrap();
        store.set(CURRENT_AUCTION_KEY, &json!("bbbb2222")).unwrap();
        assert_eq!(
            store.get(CURRENT_AUCTION_KEY).unwrap(),
            Some(json!("bbbb2222"))
        );
    }

    #[test]
    fn cache_remove_reports_existence() {
        let store = test_store();
        store.set("k", &json!(1)).unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert!(store.keys().unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Photos
    // ------------------------------------------------------------------

    #[test]
    fn photos_keep_native_id_form() {
        let store = test_store();
        let players = vec![
            player(PlayerId::Number(2), "B", Some("data:image/png;base64,Qg==")),
            player(PlayerId::Text("7".into()), "G", Some("https://cdn/g.png")),
            player(PlayerId::Number(1), "A", None),
        ];
        store.save_photos("abc", &players).unwrap();

        let photos = store.load_photos("abc").unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(
            photos.get(&PlayerId::Number(2)),
            Some(&Photo("data:image/png;base64,Qg==".into()))
        );
        assert!(photos.contains_key(&PlayerId::Text("7".into())));
        assert!(!photos.contains_key(&PlayerId::Number(7)));
    }

    #[test]
    fn photos_scoped_to_auction_id() {
        let store = test_store();
        store
            .save_photos("old", &[player(PlayerId::Number(1), "A", Some("p1"))])
            .unwrap();

        assert!(store.load_photos("new").unwrap().is_empty());
        assert_eq!(store.photo_count("old").unwrap(), 1);
    }

    #[test]
    fn saving_again_replaces_photo() {
        let store = test_store();
        store
            .save_photos("abc", &[player(PlayerId::Number(1), "A", Some("v1"))])
            .unwrap();
        store
            .save_photos("abc", &[player(PlayerId::Number(1), "A", Some("v2"))])
            .unwrap();

        let photos = store.load_photos("abc").unwrap();
        assert_eq!(photos.get(&PlayerId::Number(1)), Some(&Photo("v2".into())));
        assert_eq!(store.photo_count("abc").unwrap(), 1);
    }
}
