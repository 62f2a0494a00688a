//! SQLite-backed key/value table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema;

/// A single key/value database.
///
/// The connection sits behind a mutex so the store can be shared across
/// tasks; every operation is one short statement.
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent; keep going.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Fetch a value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Delete a value. Returns true if it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let n = self.conn().execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(n > 0)
    }

    /// All keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?1) = ?2 ORDER BY key")?;
        let keys = stmt
            .query_map(rusqlite::params![prefix.chars().count() as i64, prefix], |row| {
                row.get(0)
            })?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Delete all keys starting with `prefix`. Returns the number removed.
    pub fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let n = self.conn().execute(
            "DELETE FROM kv WHERE substr(key, 1, ?1) = ?2",
            rusqlite::params![prefix.chars().count() as i64, prefix],
        )?;
        Ok(n)
    }

    /// Append `items` to the queue table, then drop the oldest rows so at
    /// most `cap` remain. Returns `(len, dropped)`.
    pub fn queue_push(&self, items: &[String], cap: usize) -> Result<(usize, usize)> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO pending_sync (reading, queued_at) VALUES (?1, ?2)",
            )?;
            for item in items {
                stmt.execute(rusqlite::params![item, now])?;
            }
        }
        let dropped = tx.execute(
            "DELETE FROM pending_sync WHERE id NOT IN
             (SELECT id FROM pending_sync ORDER BY id DESC LIMIT ?1)",
            [cap as i64],
        )?;
        let len: i64 = tx.query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))?;
        tx.commit()?;
        Ok((len as usize, dropped))
    }

    /// Queued items with their row ids, oldest first.
    pub fn queue_peek(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT id, reading FROM pending_sync ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(i64, String)>, _>>()?;
        Ok(rows)
    }

    /// Remove queued rows up to and including `through`.
    pub fn queue_ack(&self, through: i64) -> Result<usize> {
        let n = self
            .conn()
            .execute("DELETE FROM pending_sync WHERE id <= ?", [through])?;
        Ok(n)
    }

    pub fn queue_len(&self) -> Result<usize> {
        let len: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))?;
        Ok(len as usize)
    }

    pub fn queue_clear(&self) -> Result<usize> {
        let n = self.conn().execute("DELETE FROM pending_sync", [])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let store = KvStore::open_in_memory().unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_remove() {
        let store = KvStore::open_in_memory().unwrap();
        store.set("a", "1").unwrap();
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_prefix_matching_is_literal() {
        let store = KvStore::open_in_memory().unwrap();
        store.set("s_a", "1").unwrap();
        store.set("s_b", "2").unwrap();
        store.set("sXa", "3").unwrap();

        assert_eq!(store.keys_with_prefix("s_").unwrap(), vec!["s_a", "s_b"]);
        assert_eq!(store.clear_prefix("s_").unwrap(), 2);
        assert_eq!(store.get("sXa").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_queue_cap_drops_oldest() {
        let store = KvStore::open_in_memory().unwrap();
        let items: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(store.queue_push(&items, 3).unwrap(), (3, 2));

        let kept: Vec<String> = store.queue_peek().unwrap().into_iter().map(|(_, v)| v).collect();
        assert_eq!(kept, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_queue_ack_keeps_later_rows() {
        let store = KvStore::open_in_memory().unwrap();
        store.queue_push(&["a".into(), "b".into()], 10).unwrap();
        let through = store.queue_peek().unwrap()[1].0;
        store.queue_push(&["c".into()], 10).unwrap();

        assert_eq!(store.queue_ack(through).unwrap(), 2);
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(store.queue_peek().unwrap()[0].1, "c");
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("general.db");
        let store = KvStore::open(&path).unwrap();
        store.set("k", "v").unwrap();
        assert!(path.exists());
    }
}
