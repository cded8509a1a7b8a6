//! Source listing collaborators.

use super::FileFormat;
use crate::errors::TidemarkError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// A file visible at a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Stable identity of the file within its location.
    pub identity: String,
    /// The raw file content.
    pub bytes: Vec<u8>,
}

impl SourceEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(identity: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            bytes: bytes.into(),
        }
    }
}

/// Lists the files currently visible at a location.
///
/// Implementations may return files the ledger has already ingested; the
/// ledger filters them.
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Lists entries at a location.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::SourceUnavailable` when the location cannot
    /// be listed.
    async fn list_new_entries(
        &self,
        location: &str,
        format: FileFormat,
    ) -> Result<Vec<SourceEntry>, TidemarkError>;
}

/// Lists regular files of a local directory.
///
/// Listing is non-recursive, hidden files are skipped, and only files
/// whose extension the format accepts are returned. Identities are file
/// names relative to the directory. Relative locations are resolved
/// against the root, if one is set.
#[derive(Debug, Clone, Default)]
pub struct LocalDirectorySource {
    root: Option<PathBuf>,
}

impl LocalDirectorySource {
    /// Creates a source resolving locations as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative locations against `root`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = PathBuf::from(location);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl SourceLister for LocalDirectorySource {
    async fn list_new_entries(
        &self,
        location: &str,
        format: FileFormat,
    ) -> Result<Vec<SourceEntry>, TidemarkError> {
        let dir = self.resolve(location);
        let unavailable = |e: std::io::Error| TidemarkError::source_unavailable(location, e.to_string());

        let mut reader = tokio::fs::read_dir(&dir).await.map_err(unavailable)?;
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(unavailable)? {
            if !entry.file_type().await.map_err(unavailable)?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !format.accepts(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let bytes = tokio::fs::read(dir.join(&name)).await.map_err(unavailable)?;
            entries.push(SourceEntry::new(name, bytes));
        }

        debug!(location, files = entries.len(), "Listed source directory");
        Ok(entries)
    }
}

/// An in-memory source for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemorySource {
    locations: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    unavailable: RwLock<Option<String>>,
}

impl InMemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lands a file at a location, replacing any file with the same identity.
    pub fn put(&self, location: &str, identity: &str, bytes: impl Into<Vec<u8>>) {
        self.locations
            .write()
            .entry(location.to_string())
            .or_default()
            .insert(identity.to_string(), bytes.into());
    }

    /// Makes every listing fail with the given reason until `restore` is called.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.unavailable.write() = Some(reason.into());
    }

    /// Makes listings succeed again.
    pub fn restore(&self) {
        *self.unavailable.write() = None;
    }
}

#[async_trait]
impl SourceLister for InMemorySource {
    async fn list_new_entries(
        &self,
        location: &str,
        format: FileFormat,
    ) -> Result<Vec<SourceEntry>, TidemarkError> {
        if let Some(reason) = self.unavailable.read().clone() {
            return Err(TidemarkError::source_unavailable(location, reason));
        }
        let locations = self.locations.read();
        let files = locations
            .get(location)
            .ok_or_else(|| TidemarkError::source_unavailable(location, "location does not exist"))?;

        Ok(files
            .iter()
            .filter(|(identity, _)| format.accepts(identity))
            .map(|(identity, bytes)| SourceEntry::new(identity.clone(), bytes.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_directory_lists_sorted_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("01.json"), "{}\n").unwrap();
        std::fs::write(dir.path().join("00.json"), "{}\n").unwrap();
        std::fs::write(dir.path().join(".hidden.json"), "{}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let source = LocalDirectorySource::new();
        let entries = source
            .list_new_entries(dir.path().to_str().unwrap(), FileFormat::JsonLines)
            .await
            .unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(names, vec!["00.json", "01.json"]);
    }

    #[tokio::test]
    async fn test_local_directory_relative_to_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("orders")).unwrap();
        std::fs::write(dir.path().join("orders/00.json"), "{}\n").unwrap();

        let source = LocalDirectorySource::new().with_root(dir.path());
        let entries = source.list_new_entries("orders", FileFormat::JsonLines).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let source = LocalDirectorySource::new();
        let err = source
            .list_new_entries("/definitely/not/here", FileFormat::JsonLines)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SourceUnavailable");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_in_memory_toggle_unavailable() {
        let source = InMemorySource::new();
        source.put("orders", "00.json", "{}");

        source.fail_with("network partition");
        assert!(source.list_new_entries("orders", FileFormat::JsonLines).await.is_err());

        source.restore();
        assert_eq!(source.list_new_entries("orders", FileFormat::JsonLines).await.unwrap().len(), 1);
    }
}
