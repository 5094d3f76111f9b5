//! Generic record storage over an indexed, versioned SQLite store.
//!
//! A `StoreProvider` owns one database and the fixed set of collections
//! declared at open time. `Collection<T>` is the typed per-collection handle
//! offering atomic add/get/get_all/get_all_from_index/update/delete. Record
//! shape never leaks into this layer: records travel as JSON bodies, and
//! declared secondary indices are materialized as integer columns filled
//! from `Record::index_key`.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// Schema version gate. The provider refuses databases written by a newer
/// schema and upgrades older ones before the first operation.
pub const SCHEMA_VERSION: i32 = 1;

/// A persistable record: string primary key plus values for any secondary
/// index its collection declares.
pub trait Record: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + 'static {
    /// Primary key; assigned once, immutable.
    fn id(&self) -> &str;
    /// Value for the named secondary index, or `None` when this record type
    /// does not carry it.
    fn index_key(&self, index: &str) -> Option<i64>;
}

/// One named collection and its secondary indices, declared once at open.
/// Schema is fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    name: String,
    indices: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            indices: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: &str) -> Self {
        self.indices.push(index.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Provider over one SQLite database, partitioned into collections.
pub struct StoreProvider {
    conn: Arc<Mutex<Connection>>,
    collections: HashMap<String, CollectionSpec>,
}

impl StoreProvider {
    /// Opens (creating if needed) the database at `path` and runs the
    /// schema-version gate before returning any collection handle.
    pub fn open(path: &Path, specs: Vec<CollectionSpec>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
        )?;
        Self::with_connection(conn, specs)
    }

    /// In-memory store with the same schema handling; used by tests and
    /// throwaway sessions.
    pub fn open_in_memory(specs: Vec<CollectionSpec>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, specs)
    }

    fn with_connection(
        mut conn: Connection,
        specs: Vec<CollectionSpec>,
    ) -> Result<Self, StoreError> {
        for spec in &specs {
            if !is_valid_identifier(&spec.name) {
                return Err(StoreError::Unavailable(format!(
                    "invalid collection name '{}'",
                    spec.name
                )));
            }
            for index in &spec.indices {
                if !is_valid_identifier(index) {
                    return Err(StoreError::Unavailable(format!(
                        "invalid index name '{}' on collection '{}'",
                        index, spec.name
                    )));
                }
            }
        }

        Self::migrate(&mut conn, &specs)?;

        let collections = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collections,
        })
    }

    /// One-time upgrade routine: creates missing collections and indices
    /// without touching existing records, then stamps the schema version.
    fn migrate(conn: &mut Connection, specs: &[CollectionSpec]) -> Result<(), StoreError> {
        let on_disk: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if on_disk > SCHEMA_VERSION {
            return Err(StoreError::Unavailable(format!(
                "database schema version {} is newer than supported version {}",
                on_disk, SCHEMA_VERSION
            )));
        }

        let tx = conn.transaction()?;
        for spec in specs {
            let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
            for index in &spec.indices {
                columns.push(format!("{} INTEGER NOT NULL DEFAULT 0", index_column(index)));
            }
            columns.push("record TEXT NOT NULL".to_string());
            tx.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                spec.name,
                columns.join(", ")
            ))?;
            for index in &spec.indices {
                tx.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {}_{} ON {} ({})",
                    spec.name,
                    index_column(index),
                    spec.name,
                    index_column(index)
                ))?;
            }
        }
        tx.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        tx.commit()?;

        if on_disk < SCHEMA_VERSION {
            info!(
                "StoreProvider: Migrated schema from version {} to {}",
                on_disk, SCHEMA_VERSION
            );
        }
        Ok(())
    }

    /// Typed handle for a declared collection.
    pub fn collection<T: Record>(&self, name: &str) -> Result<Collection<T>, StoreError> {
        let spec = self.collections.get(name).ok_or_else(|| {
            StoreError::Unavailable(format!("collection '{}' was not declared at open", name))
        })?;
        Ok(Collection {
            conn: Arc::clone(&self.conn),
            spec: spec.clone(),
            _record: PhantomData,
        })
    }
}

/// Typed handle over one collection. Operations are individually atomic;
/// no multi-record transaction is exposed.
pub struct Collection<T: Record> {
    conn: Arc<Mutex<Connection>>,
    spec: CollectionSpec,
    _record: PhantomData<T>,
}

impl<T: Record> Collection<T> {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Persists a new record; fails with `DuplicateKey` if the id exists.
    pub fn add(&self, item: &T) -> Result<String, StoreError> {
        let (sql, values) = self.write_statement("INSERT INTO", item)?;
        let conn = self.conn.lock().expect("store connection lock poisoned");
        match conn.execute(&sql, rusqlite::params_from_iter(values)) {
            Ok(_) => {
                debug!("Store: Added '{}' to {}", item.id(), self.spec.name);
                Ok(item.id().to_string())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey(item.id().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Current record for `id`, or `None`; never fails for a missing key.
    pub fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let conn = self.conn.lock().expect("store connection lock poisoned");
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT record FROM {} WHERE id = ?1", self.spec.name),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);
        raw.map(|raw| self.decode(&raw)).transpose()
    }

    /// Unordered snapshot of every record in the collection.
    pub fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.select(&format!("SELECT record FROM {}", self.spec.name))
    }

    /// Snapshot ordered ascending by the named secondary index.
    pub fn get_all_from_index(&self, index: &str) -> Result<Vec<T>, StoreError> {
        if !self.spec.indices.iter().any(|declared| declared == index) {
            return Err(StoreError::UnknownIndex {
                collection: self.spec.name.clone(),
                index: index.to_string(),
            });
        }
        self.select(&format!(
            "SELECT record FROM {} ORDER BY {} ASC",
            self.spec.name,
            index_column(index)
        ))
    }

    /// Upsert: fully replaces the record at `item.id()`, creating it if
    /// absent.
    pub fn update(&self, item: &T) -> Result<String, StoreError> {
        let (sql, values) = self.write_statement("INSERT OR REPLACE INTO", item)?;
        let conn = self.conn.lock().expect("store connection lock poisoned");
        conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(item.id().to_string())
    }

    /// Idempotent delete; removing a missing id succeeds silently.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store connection lock poisoned");
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.spec.name),
            params![id],
        )?;
        Ok(())
    }

    fn select(&self, sql: &str) -> Result<Vec<T>, StoreError> {
        let conn = self.conn.lock().expect("store connection lock poisoned");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut raw_records = Vec::new();
        for row in rows {
            raw_records.push(row?);
        }
        drop(stmt);
        drop(conn);
        raw_records.iter().map(|raw| self.decode(raw)).collect()
    }

    fn write_statement(&self, verb: &str, item: &T) -> Result<(String, Vec<Value>), StoreError> {
        let mut columns = vec!["id".to_string()];
        let mut values = vec![Value::Text(item.id().to_string())];
        for index in &self.spec.indices {
            columns.push(index_column(index));
            values.push(Value::Integer(item.index_key(index).unwrap_or(0)));
        }
        columns.push("record".to_string());
        values.push(Value::Text(self.encode(item)?));

        let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("?{}", n)).collect();
        let sql = format!(
            "{} {} ({}) VALUES ({})",
            verb,
            self.spec.name,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, values))
    }

    fn encode(&self, item: &T) -> Result<String, StoreError> {
        serde_json::to_string(item).map_err(|source| StoreError::Corrupt {
            collection: self.spec.name.clone(),
            source,
        })
    }

    fn decode(&self, raw: &str) -> Result<T, StoreError> {
        serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
            collection: self.spec.name.clone(),
            source,
        })
    }
}

fn index_column(index: &str) -> String {
    format!("idx_{}", index)
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
