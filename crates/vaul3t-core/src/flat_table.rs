//! Whole-file JSON key/value tables.
//!
//! A table is one JSON object on disk mapping string keys to records. Every
//! mutation reads the entire file, changes one entry and rewrites the whole
//! file. Writers inside this process are serialized by one mutex per table, so
//! concurrent updates to different keys cannot clobber each other. Writers in
//! other processes are not coordinated.
//!
//! Reads fail open: a missing, unreadable or corrupt file loads as an empty
//! table and is logged, never surfaced as an error.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::atomic_io::write_text_atomic;

/// File-backed table of `V` records keyed by string.
pub struct FlatTable<V> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> V>,
}

impl<V> std::fmt::Debug for FlatTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatTable")
            .field("path", &self.path)
            .finish()
    }
}

impl<V> FlatTable<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Loads the raw table in file order. Never fails; see module docs.
    pub fn load_raw(&self) -> Map<String, Value> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "table file missing; using empty table");
            return Map::new();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "table unreadable; using empty table");
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %self.path.display(), "table is not a JSON object; using empty table");
                Map::new()
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "table corrupt; using empty table");
                Map::new()
            }
        }
    }

    /// Decodable entries in file order. Entries that do not match `V` are skipped.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.load_raw()
            .into_iter()
            .filter_map(|(key, value)| {
                decode_entry::<V>(&self.path, &key, value).map(|record| (key, record))
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut table = self.load_raw();
        let value = table.remove(key)?;
        decode_entry(&self.path, key, value)
    }

    /// Overwrites one entry, keeping every other entry as found on disk.
    pub fn upsert(&self, key: &str, value: V) -> Result<()> {
        self.update(key, |_| (value, ()))
    }

    /// Atomic read-modify-write of one entry.
    ///
    /// `apply` receives the current record (or `None` when absent or
    /// undecodable) and returns the record to persist plus a result for the
    /// caller. The table lock is held across the read and the rewrite.
    pub fn update<R, F>(&self, key: &str, apply: F) -> Result<R>
    where
        F: FnOnce(Option<V>) -> (V, R),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("table lock for {} is poisoned", self.path.display()))?;
        let mut table = self.load_raw();
        let current = table
            .get(key)
            .cloned()
            .and_then(|value| decode_entry::<V>(&self.path, key, value));
        let (next, result) = apply(current);
        let encoded = serde_json::to_value(&next)
            .with_context(|| format!("failed to encode entry '{key}'"))?;
        table.insert(key.to_string(), encoded);
        self.write_table(&table)?;
        Ok(result)
    }

    /// Creates an empty table file when none exists yet.
    pub fn ensure_exists(&self) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("table lock for {} is poisoned", self.path.display()))?;
        if self.path.exists() {
            return Ok(());
        }
        self.write_table(&Map::new())
    }

    fn write_table(&self, table: &Map<String, Value>) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(table)
            .with_context(|| format!("failed to encode table {}", self.path.display()))?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write table {}", self.path.display()))
    }
}

fn decode_entry<V: DeserializeOwned>(path: &Path, key: &str, value: Value) -> Option<V> {
    match serde_json::from_value::<V>(value) {
        Ok(decoded) => Some(decoded),
        Err(error) => {
            warn!(path = %path.display(), key, %error, "skipping undecodable table entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tempfile::tempdir;

    use super::FlatTable;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn unit_missing_table_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let table = FlatTable::<String>::open(temp.path().join("absent.json"));
        assert!(table.load_raw().is_empty());
        assert_eq!(table.get("42"), None);
    }

    #[test]
    fn regression_corrupt_table_fails_open_and_is_replaced_on_write() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tokens.json");
        std::fs::write(&path, "{not json").expect("write corrupt");
        let table = FlatTable::<String>::open(&path);
        assert!(table.entries().is_empty());

        table.upsert("42", "tok".to_string()).expect("upsert");
        assert_eq!(table.get("42").as_deref(), Some("tok"));
    }

    #[test]
    fn functional_upsert_preserves_unrelated_and_foreign_entries() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("counters.json");
        std::fs::write(
            &path,
            json!({"a": {"count": 1}, "legacy": "not-a-counter"}).to_string(),
        )
        .expect("seed");
        let table = FlatTable::<Counter>::open(&path);

        table.upsert("b", Counter { count: 7 }).expect("upsert");

        let raw = table.load_raw();
        assert_eq!(raw.get("legacy"), Some(&json!("not-a-counter")));
        assert_eq!(table.get("a"), Some(Counter { count: 1 }));
        assert_eq!(table.get("b"), Some(Counter { count: 7 }));
        assert_eq!(table.entries().len(), 2);
    }

    #[test]
    fn unit_entries_follow_file_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("ordered.json");
        std::fs::write(&path, r#"{"zeta": "1", "alpha": "2", "mid": "3"}"#).expect("seed");
        let table = FlatTable::<String>::open(&path);
        let keys = table
            .entries()
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn functional_update_passes_current_record_and_returns_result() {
        let temp = tempdir().expect("tempdir");
        let table = FlatTable::<Counter>::open(temp.path().join("counters.json"));
        for expected in 1..=3_u32 {
            let seen = table
                .update("k", |current| {
                    let next = current.map(|c| c.count + 1).unwrap_or(1);
                    (Counter { count: next }, next)
                })
                .expect("update");
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn integration_concurrent_writers_to_different_keys_never_lose_updates() {
        let temp = tempdir().expect("tempdir");
        let table = Arc::new(FlatTable::<String>::open(temp.path().join("tokens.json")));
        let handles = (0..16)
            .map(|index| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    table
                        .upsert(&format!("user-{index}"), format!("token-{index}"))
                        .expect("upsert");
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join");
        }
        for index in 0..16 {
            assert_eq!(
                table.get(&format!("user-{index}")),
                Some(format!("token-{index}"))
            );
        }
    }

    #[test]
    fn unit_ensure_exists_writes_empty_object_once() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested/dir/tokens.json");
        let table = FlatTable::<String>::open(&path);
        table.ensure_exists().expect("ensure");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read").trim(),
            "{}"
        );
        table.upsert("1", "t".to_string()).expect("upsert");
        table.ensure_exists().expect("ensure again");
        assert_eq!(table.get("1").as_deref(), Some("t"));
    }
}
