use super::MirrorStore;
use crate::error::MirrorResult;
use bytes::Bytes;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Stores mirrored files under a root directory.
///
/// Every file is written to a temporary file next to its destination first and then
/// renamed into place, so an interrupted run never leaves a truncated file behind.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", target.display()),
        )
    })?;
    std::fs::create_dir_all(parent)?;

    let mut file = tempfile::Builder::new()
        .prefix(".kagami-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    file.write_all(data)?;
    file.flush()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

impl MirrorStore for FileStore {
    async fn write(&self, path: &Path, data: Bytes) -> MirrorResult<()> {
        let target = self.target(path);
        tokio::task::spawn_blocking(move || write_atomic(&target, &data))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }

    async fn read(&self, path: &Path) -> MirrorResult<Option<Bytes>> {
        match tokio::fs::read(self.target(path)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(self.target(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or_default()
    }

    fn location_hint(&self) -> Option<String> {
        Some(self.root.display().to_string())
    }
}
