//! Persistent configuration store.
//!
//! Plugin settings live in named tables of JSON values. The whole store is
//! kept in memory and persisted as a single snapshot file in the data
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::StoreConfig;

const SNAPSHOT_FILE: &str = "configstore.json";

type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("store databases not initialized")]
    NotInitialized,

    #[error("unknown table {0:?}")]
    UnknownTable(String),
}

/// Connection to the persistent configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    tables: DashSet<String>,
    entries: DashMap<(String, String), Value>,
    initialized: AtomicBool,
}

impl ConfigStore {
    /// Open the store, creating its data directory if needed.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let dir = PathBuf::from(&config.data_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        tracing::debug!(dir = %dir.display(), "Config store connected");

        Ok(Self {
            dir,
            tables: DashSet::new(),
            entries: DashMap::new(),
            initialized: AtomicBool::new(false),
        })
    }

    /// Load the backing snapshot. Must run before tables are registered.
    pub async fn init_databases(&self) -> Result<(), StoreError> {
        let path = self.snapshot_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                for (table, rows) in snapshot {
                    for (key, value) in rows {
                        self.entries.insert((table.clone(), key), value);
                    }
                    self.tables.insert(table);
                }
                tracing::info!(
                    tables = self.tables.len(),
                    entries = self.entries.len(),
                    "Loaded config store snapshot"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config store snapshot, starting empty");
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Declare a table. Registering an existing table is a no-op.
    pub fn register_table(&self, table: &str) -> Result<(), StoreError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(StoreError::NotInitialized);
        }
        self.tables.insert(table.to_string());
        Ok(())
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        tables.sort();
        tables
    }

    pub fn put(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError> {
        if !self.tables.contains(table) {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        self.entries.insert((table.to_string(), key.to_string()), value);
        Ok(())
    }

    pub fn get(&self, table: &str, key: &str) -> Option<Value> {
        self.entries
            .get(&(table.to_string(), key.to_string()))
            .map(|v| v.value().clone())
    }

    /// Every row of `table`, sorted by key.
    pub fn rows(&self, table: &str) -> Vec<(String, Value)> {
        let mut rows: Vec<(String, Value)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == table)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Remove every row of `table`, keeping the table itself.
    pub fn clear_table(&self, table: &str) -> Result<(), StoreError> {
        if !self.tables.contains(table) {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        self.entries.retain(|(t, _), _| t != table);
        Ok(())
    }

    /// Persist the current contents to the snapshot file.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let mut snapshot = Snapshot::new();
        for table in self.tables.iter() {
            snapshot.entry(table.key().clone()).or_default();
        }
        for entry in self.entries.iter() {
            let (table, key) = entry.key();
            snapshot
                .entry(table.clone())
                .or_default()
                .insert(key.clone(), entry.value().clone());
        }

        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let path = self.snapshot_path();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StoreError::Io { path, source })?;

        tracing::debug!(entries = self.entries.len(), "Config store flushed");
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }
}
