use super::MirrorStore;
use crate::error::MirrorResult;
use bytes::Bytes;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Keeps mirrored files in memory. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, Bytes>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Bytes> {
        self.files().get(path.as_ref()).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}

impl MirrorStore for MemoryStore {
    async fn write(&self, path: &Path, data: Bytes) -> MirrorResult<()> {
        self.files().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn read(&self, path: &Path) -> MirrorResult<Option<Bytes>> {
        Ok(self.get(path))
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }
}
