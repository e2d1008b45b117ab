//! Ordered key-value substrate underneath the certificate store.
//!
//! [`KvStore`] is the small surface the record layer needs: `set`, `get`
//! and `keys` with a trailing `*` wildcard. [`RedbStore`] persists to a redb
//! file; [`MemoryStore`] keeps everything in a `BTreeMap`.
//!
//! Individual operations are serialized by the backend. There is no
//! compare-and-set; callers that need first-write-wins must lock above this
//! layer.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use redb::{Database, TableDefinition};

use crate::error::{CaError, Result};

/// Key: record id, Value: JSON document
const RECORDS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("records");

pub trait KvStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Keys matching `pattern` in ascending order. A trailing `*` matches any
    /// suffix; without it the pattern is an exact key.
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

enum KeyPattern<'a> {
    Prefix(&'a str),
    Exact(&'a str),
}

impl<'a> KeyPattern<'a> {
    fn parse(pattern: &'a str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => KeyPattern::Prefix(prefix),
            None => KeyPattern::Exact(pattern),
        }
    }
}

pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Create or open the database file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path)?;

        // make sure read transactions always find the table
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(RECORDS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for RedbStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;
        let value = table.get(key)?.map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => Ok(table
                .get(key)?
                .map(|_| vec![key.to_string()])
                .unwrap_or_default()),
            KeyPattern::Prefix(prefix) => {
                let mut keys = Vec::new();
                for item in table.range::<&str>(prefix..)? {
                    let (key, _value) = item?;
                    let key = key.value();
                    if !key.starts_with(prefix) {
                        break;
                    }
                    keys.push(key.to_string());
                }
                Ok(keys)
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| CaError::Storage("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.lock()?;
        let keys = match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => entries
                .contains_key(key)
                .then(|| vec![key.to_string()])
                .unwrap_or_default(),
            KeyPattern::Prefix(prefix) => entries
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect(),
        };
        Ok(keys)
    }
}
