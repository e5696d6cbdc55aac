//! Memoization backends.
//!
//! A stage is memoized when its declared output artifact already exists.
//! The filesystem store checks the real stage directory; the in-memory
//! store lets tests pretend artifacts exist.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Answers whether a stage artifact already exists.
pub trait MemoStore: Send + Sync {
    /// Returns true if the artifact exists.
    fn contains(&self, artifact: &Path) -> bool;

    /// Records that the artifact now exists.
    fn record(&self, artifact: &Path);
}

/// Checks artifacts on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMemoStore;

impl MemoStore for FsMemoStore {
    fn contains(&self, artifact: &Path) -> bool {
        artifact.exists()
    }

    // The rendered script writes the marker itself.
    fn record(&self, _artifact: &Path) {}
}

/// In-memory memo store.
#[derive(Debug, Default)]
pub struct InMemoryMemoStore {
    artifacts: Mutex<HashSet<PathBuf>>,
}

impl InMemoryMemoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds the given artifacts.
    #[must_use]
    pub fn with_artifacts<I, P>(artifacts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            artifacts: Mutex::new(artifacts.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns the number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }
}

impl MemoStore for InMemoryMemoStore {
    fn contains(&self, artifact: &Path) -> bool {
        self.artifacts.lock().contains(artifact)
    }

    fn record(&self, artifact: &Path) {
        self.artifacts.lock().insert(artifact.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_store_checks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("DONE");
        assert!(!FsMemoStore.contains(&marker));
        std::fs::write(&marker, "").unwrap();
        assert!(FsMemoStore.contains(&marker));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryMemoStore::with_artifacts(["/exp/a/DONE"]);
        assert_eq!(store.len(), 1);
        assert!(store.contains(Path::new("/exp/a/DONE")));
        assert!(!store.contains(Path::new("/exp/b/DONE")));
        store.record(Path::new("/exp/b/DONE"));
        assert!(store.contains(Path::new("/exp/b/DONE")));
    }
}
