pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::MirrorResult;
use bytes::Bytes;
use std::{future::Future, path::Path, sync::Arc};

/// Where mirrored files end up.
///
/// Paths are the relative paths produced by [`map_url`](crate::util::path::map_url).
pub trait MirrorStore: Send + Sync + 'static {
    /// Replace the content at `path`, creating parent directories as needed.
    ///
    /// Readers must never observe a partially written file.
    fn write(&self, path: &Path, data: Bytes) -> impl Future<Output = MirrorResult<()>> + Send;

    /// Read the content at `path`, `None` if nothing is stored there.
    fn read(&self, path: &Path) -> impl Future<Output = MirrorResult<Option<Bytes>>> + Send;

    /// Whether a complete file is stored at `path`.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;

    /// Hint a location for the mirrored files.
    fn location_hint(&self) -> Option<String> {
        None
    }
}

impl<S> MirrorStore for Arc<S>
where
    S: MirrorStore,
{
    fn write(&self, path: &Path, data: Bytes) -> impl Future<Output = MirrorResult<()>> + Send {
        self.as_ref().write(path, data)
    }

    fn read(&self, path: &Path) -> impl Future<Output = MirrorResult<Option<Bytes>>> + Send {
        self.as_ref().read(path)
    }

    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send {
        self.as_ref().exists(path)
    }

    fn location_hint(&self) -> Option<String> {
        self.as_ref().location_hint()
    }
}
