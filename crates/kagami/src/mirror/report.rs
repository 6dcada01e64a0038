use std::fmt;

use serde::Serialize;
use url::Url;

use crate::manifest::ResourceRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Fetch,
    Parse,
    /// The store refused a write. Usually affects the whole run, e.g. a full disk.
    Write,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Parse => "parse",
            FailureKind::Write => "write",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTask {
    pub url: Url,
    pub role: ResourceRole,
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of a mirror run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorReport {
    /// Manifests fetched, rewritten and stored.
    pub manifests: usize,
    /// Other resources fetched and stored.
    pub resources: usize,
    /// Resources already present in the store.
    pub skipped: usize,
    pub failed: Vec<FailedTask>,
    pub cancelled: bool,
}

impl MirrorReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn failures(&self, kind: FailureKind) -> impl Iterator<Item = &FailedTask> {
        self.failed.iter().filter(move |f| f.kind == kind)
    }

    pub fn finished(&self) -> usize {
        self.manifests + self.resources + self.skipped + self.failed.len()
    }

    pub(crate) fn log_summary(&self) {
        tracing::info!(
            "Mirrored {} manifest(s) and {} resource(s), {} already present.",
            self.manifests,
            self.resources,
            self.skipped
        );
        if !self.failed.is_empty() {
            tracing::error!("Failed to mirror {} resource(s):", self.failed.len());
            for failed in self.failed.iter() {
                tracing::error!("  - [{}] {} ({}): {}", failed.kind, failed.url, failed.role, failed.reason);
            }
        }
        let write_failures = self.failures(FailureKind::Write).count();
        if write_failures > 0 {
            tracing::error!("{write_failures} write(s) failed, check the output directory.");
        }
        if self.cancelled {
            tracing::warn!("Mirroring was cancelled before completion.");
        }
    }
}
