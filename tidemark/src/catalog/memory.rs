//! In-memory catalog with optional JSON snapshot persistence.

use super::{Checkpoint, HighWaterMark, NodeCommit, TableCatalog, TableSchema, TableSlice, WriteMode};
use crate::core::Record;
use crate::errors::TidemarkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredTable {
    schema: TableSchema,
    generation: u64,
    rows: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CatalogState {
    next_generation: u64,
    tables: BTreeMap<String, StoredTable>,
    checkpoint: Checkpoint,
}

impl CatalogState {
    fn new_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn replace(&mut self, name: &str, schema: TableSchema, rows: Vec<Record>) {
        let generation = self.new_generation();
        self.tables.insert(
            name.to_string(),
            StoredTable {
                schema,
                generation,
                rows,
            },
        );
    }

    fn append(&mut self, name: &str, rows: Vec<Record>) {
        let schema = TableSchema::infer(&rows);
        if !self.tables.contains_key(name) {
            self.replace(name, TableSchema::default(), Vec::new());
        }
        if let Some(table) = self.tables.get_mut(name) {
            table.schema.merge(&schema);
            table.rows.extend(rows);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    fingerprint: String,
    state: CatalogState,
}

fn fingerprint(state: &CatalogState) -> Result<String, TidemarkError> {
    let bytes = serde_json::to_vec(state)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// A catalog kept in memory.
///
/// With a snapshot path, the whole catalog is written to a JSON file after
/// every commit (to a temporary file, then renamed over the previous one),
/// so a new process opening the same path resumes from the last commit.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
    snapshot_path: Option<PathBuf>,
    fail_next_commit: parking_lot::Mutex<Option<String>>,
}

impl InMemoryCatalog {
    /// Creates an empty, non-persistent catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a catalog persisted at `path`, creating it on first commit.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::Catalog` when the snapshot exists but is
    /// unreadable, of an unknown version, or fails its fingerprint check.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TidemarkError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: SnapshotFile = serde_json::from_slice(&bytes)
                    .map_err(|e| TidemarkError::Catalog(format!("unreadable snapshot {}: {e}", path.display())))?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(TidemarkError::Catalog(format!(
                        "snapshot {} has unsupported version {}",
                        path.display(),
                        snapshot.version
                    )));
                }
                if fingerprint(&snapshot.state)? != snapshot.fingerprint {
                    return Err(TidemarkError::Catalog(format!(
                        "snapshot {} failed its fingerprint check",
                        path.display()
                    )));
                }
                info!(path = %path.display(), tables = snapshot.state.tables.len(), "Loaded catalog snapshot");
                snapshot.state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path),
            fail_next_commit: parking_lot::Mutex::new(None),
        })
    }

    /// Makes the next commit fail without changing anything.
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        *self.fail_next_commit.lock() = Some(reason.into());
    }

    /// Returns every row of a table, or an empty vector if it does not exist.
    pub async fn rows(&self, name: &str) -> Vec<Record> {
        self.state
            .lock()
            .await
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Returns the schema of a table.
    pub async fn schema(&self, name: &str) -> Option<TableSchema> {
        self.state.lock().await.tables.get(name).map(|t| t.schema.clone())
    }

    async fn persist(&self, state: &CatalogState) -> Result<(), TidemarkError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            fingerprint: fingerprint(state)?,
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote catalog snapshot");
        Ok(())
    }
}

#[async_trait]
impl TableCatalog for InMemoryCatalog {
    async fn create_or_replace_table(&self, name: &str, schema: TableSchema) -> Result<(), TidemarkError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.replace(name, schema, Vec::new());
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn append_rows(&self, name: &str, rows: Vec<Record>) -> Result<(), TidemarkError> {
        let mut state = self.state.lock().await;
        if !state.tables.contains_key(name) {
            return Err(TidemarkError::Catalog(format!("table '{name}' does not exist")));
        }
        let mut next = state.clone();
        next.append(name, rows);
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn read_rows(&self, name: &str, since: Option<HighWaterMark>) -> Result<TableSlice, TidemarkError> {
        let state = self.state.lock().await;
        let table = state
            .tables
            .get(name)
            .ok_or_else(|| TidemarkError::Catalog(format!("table '{name}' does not exist")))?;

        let start = match since {
            Some(mark) if mark.generation == table.generation => {
                usize::try_from(mark.offset).unwrap_or(usize::MAX).min(table.rows.len())
            }
            _ => 0,
        };
        Ok(TableSlice {
            rows: table.rows[start..].to_vec(),
            end: HighWaterMark {
                generation: table.generation,
                offset: table.rows.len() as u64,
            },
        })
    }

    async fn commit(&self, commit: &NodeCommit) -> Result<(), TidemarkError> {
        let mut state = self.state.lock().await;
        let rejected = self.fail_next_commit.lock().take();
        if let Some(reason) = rejected {
            return Err(TidemarkError::Catalog(format!("commit of '{}' rejected: {reason}", commit.node)));
        }

        let mut next = state.clone();
        let write = &commit.write;
        let rows_written = write.rows.len();
        match write.mode {
            WriteMode::Append => next.append(&write.table, write.rows.clone()),
            WriteMode::Replace => next.replace(&write.table, TableSchema::infer(&write.rows), write.rows.clone()),
        }
        next.checkpoint.apply(commit);

        self.persist(&next).await?;
        *state = next;

        debug!(
            node = %commit.node,
            table = %write.table,
            mode = ?write.mode,
            rows = rows_written,
            files = commit.ingested.len(),
            "Committed node output"
        );
        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Checkpoint, TidemarkError> {
        Ok(self.state.lock().await.checkpoint.clone())
    }

    async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }
}
