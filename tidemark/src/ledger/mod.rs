//! Exactly-once file discovery.
//!
//! The ledger remembers every file it has seen per source location. A file
//! gets a discovery sequence the first time it is sighted and keeps it
//! forever; it turns INGESTED only when the node that read it commits. The
//! coordinator carries ingested files inside the node commit so the catalog
//! records them atomically with the table output, then calls
//! [`FileLedger::apply_committed`].

mod format;
mod source;

pub use format::FileFormat;
pub use source::{InMemorySource, LocalDirectorySource, SourceEntry, SourceLister};

use crate::errors::TidemarkError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Consumption state of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Sighted (or never seen) but not committed.
    #[default]
    Unseen,
    /// Records were committed together with node output.
    Ingested,
}

/// A file known to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// The source location the file belongs to.
    pub location: String,
    /// The file identity within the location.
    pub identity: String,
    /// Discovery sequence, assigned at first sighting.
    pub sequence: u64,
    /// Consumption state.
    pub state: FileState,
}

/// A discovered, not yet ingested file with its content.
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Ledger metadata.
    pub file: SourceFile,
    /// Raw content returned by the lister.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerEntry {
    sequence: u64,
    state: FileState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LocationLedger {
    next_sequence: u64,
    files: BTreeMap<String, LedgerEntry>,
}

/// Serializable ledger contents, persisted in the catalog checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    locations: BTreeMap<String, LocationLedger>,
}

impl LedgerState {
    /// Records files as INGESTED.
    ///
    /// Sequences carried by the files are kept, and the location's next
    /// sequence moves past them.
    pub fn mark_ingested(&mut self, files: &[SourceFile]) {
        for file in files {
            let location = self.locations.entry(file.location.clone()).or_default();
            location.files.insert(
                file.identity.clone(),
                LedgerEntry {
                    sequence: file.sequence,
                    state: FileState::Ingested,
                },
            );
            location.next_sequence = location.next_sequence.max(file.sequence + 1);
        }
    }

    /// Returns the state of a file; unknown files are UNSEEN.
    #[must_use]
    pub fn state_of(&self, location: &str, identity: &str) -> FileState {
        self.locations
            .get(location)
            .and_then(|l| l.files.get(identity))
            .map_or(FileState::Unseen, |e| e.state)
    }

    /// Returns the number of INGESTED files at a location.
    #[must_use]
    pub fn ingested_count(&self, location: &str) -> usize {
        self.locations.get(location).map_or(0, |l| {
            l.files.values().filter(|e| e.state == FileState::Ingested).count()
        })
    }
}

/// Tracks which source files have been consumed.
pub struct FileLedger {
    lister: Arc<dyn SourceLister>,
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for FileLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedger")
            .field("locations", &self.state.lock().locations.len())
            .finish_non_exhaustive()
    }
}

impl FileLedger {
    /// Creates an empty ledger over a lister.
    #[must_use]
    pub fn new(lister: Arc<dyn SourceLister>) -> Self {
        Self {
            lister,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Replaces the in-memory state with a checkpointed one.
    pub fn restore(&self, state: LedgerState) {
        *self.state.lock() = state;
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    /// Returns the state of a file.
    #[must_use]
    pub fn state_of(&self, location: &str, identity: &str) -> FileState {
        self.state.lock().state_of(location, identity)
    }

    /// Returns the files at a location that were never ingested, in
    /// discovery-sequence order.
    ///
    /// Newly sighted files are sequenced in lexical order of identity.
    /// Calling `discover` twice without a commit in between returns the
    /// same files with the same sequences.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::SourceUnavailable` when listing fails; the
    /// ledger is unchanged in that case.
    pub async fn discover(
        &self,
        location: &str,
        format: FileFormat,
    ) -> Result<Vec<PendingFile>, TidemarkError> {
        let mut entries = self.lister.list_new_entries(location, format).await?;
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut state = self.state.lock();
        let ledger = state.locations.entry(location.to_string()).or_default();

        let mut pending = Vec::new();
        let mut sighted = 0usize;
        for entry in entries {
            let existing = ledger.files.get(&entry.identity).copied();
            let sequence = match existing {
                Some(LedgerEntry {
                    state: FileState::Ingested,
                    ..
                }) => continue,
                Some(known) => known.sequence,
                None => {
                    let sequence = ledger.next_sequence;
                    ledger.next_sequence += 1;
                    ledger.files.insert(
                        entry.identity.clone(),
                        LedgerEntry {
                            sequence,
                            state: FileState::Unseen,
                        },
                    );
                    sighted += 1;
                    sequence
                }
            };
            pending.push(PendingFile {
                file: SourceFile {
                    location: location.to_string(),
                    identity: entry.identity,
                    sequence,
                    state: FileState::Unseen,
                },
                bytes: entry.bytes,
            });
        }
        pending.sort_by_key(|p| p.file.sequence);

        debug!(location, pending = pending.len(), sighted, "Discovered source files");
        Ok(pending)
    }

    /// Marks files INGESTED after their commit succeeded.
    pub fn apply_committed(&self, files: &[SourceFile]) {
        if files.is_empty() {
            return;
        }
        self.state.lock().mark_ingested(files);
        info!(files = files.len(), "Marked source files ingested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger_with(files: &[&str]) -> (Arc<InMemorySource>, FileLedger) {
        let source = Arc::new(InMemorySource::new());
        for f in files {
            source.put("orders", f, "{}\n");
        }
        let ledger = FileLedger::new(source.clone());
        (source, ledger)
    }

    fn identities(pending: &[PendingFile]) -> Vec<(String, u64)> {
        pending.iter().map(|p| (p.file.identity.clone(), p.file.sequence)).collect()
    }

    #[tokio::test]
    async fn test_discover_assigns_lexical_sequences() {
        let (_, ledger) = ledger_with(&["01.json", "00.json"]);
        let pending = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();
        assert_eq!(
            identities(&pending),
            vec![("00.json".to_string(), 0), ("01.json".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_rediscovery_without_commit_is_stable() {
        let (source, ledger) = ledger_with(&["00.json"]);
        let first = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();

        source.put("orders", "01.json", "{}\n");
        let second = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();

        assert_eq!(identities(&first), vec![("00.json".to_string(), 0)]);
        assert_eq!(
            identities(&second),
            vec![("00.json".to_string(), 0), ("01.json".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_ingested_files_never_return() {
        let (source, ledger) = ledger_with(&["00.json", "01.json"]);
        let pending = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();
        let files: Vec<SourceFile> = pending.into_iter().map(|p| p.file).collect();
        ledger.apply_committed(&files);

        assert!(ledger.discover("orders", FileFormat::JsonLines).await.unwrap().is_empty());

        source.put("orders", "02.json", "{}\n");
        let pending = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();
        assert_eq!(identities(&pending), vec![("02.json".to_string(), 2)]);
        assert_eq!(ledger.state_of("orders", "00.json"), FileState::Ingested);
    }

    #[tokio::test]
    async fn test_unavailable_leaves_state_unchanged() {
        let (source, ledger) = ledger_with(&["00.json"]);
        let before = ledger.snapshot();

        source.fail_with("timeout");
        let err = ledger.discover("orders", FileFormat::JsonLines).await.unwrap_err();
        assert_eq!(err.kind(), "SourceUnavailable");
        assert_eq!(ledger.snapshot(), before);
    }

    #[tokio::test]
    async fn test_restore_from_checkpoint() {
        let (_, ledger) = ledger_with(&["00.json", "01.json"]);
        let mut state = LedgerState::default();
        state.mark_ingested(&[SourceFile {
            location: "orders".into(),
            identity: "00.json".into(),
            sequence: 0,
            state: FileState::Ingested,
        }]);
        ledger.restore(state);

        let pending = ledger.discover("orders", FileFormat::JsonLines).await.unwrap();
        assert_eq!(identities(&pending), vec![("01.json".to_string(), 1)]);
        assert_eq!(ledger.snapshot().ingested_count("orders"), 1);
    }

    #[test]
    fn test_ledger_state_serde() {
        let mut state = LedgerState::default();
        state.mark_ingested(&[SourceFile {
            location: "customers".into(),
            identity: "00.json".into(),
            sequence: 4,
            state: FileState::Ingested,
        }]);
        let json = serde_json::to_string(&state).unwrap();
        let back: LedgerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.state_of("customers", "00.json"), FileState::Ingested);
    }
}
