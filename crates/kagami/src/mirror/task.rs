use url::Url;

use crate::manifest::{ManifestFormat, ResourceRole};

/// Lifecycle of a discovered url.
///
/// Manifests go through `Queued -> Fetching -> Parsed -> Rewritten -> Done`, other
/// resources through `Queued -> Fetching -> Done`. Any step may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    Fetching,
    Parsed,
    Rewritten,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: Url,
    pub role: ResourceRole,
}

impl CrawlTask {
    pub fn new(mut url: Url, role: ResourceRole) -> Self {
        url.set_fragment(None);
        Self { url, role }
    }

    /// Whether the content should be checked for being a manifest.
    pub fn is_manifest_candidate(&self) -> bool {
        self.role == ResourceRole::SubManifest || ManifestFormat::from_url(&self.url).is_some()
    }
}
