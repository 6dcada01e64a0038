//! The crawl scheduler.
//!
//! Starting from one manifest url, [`Mirror::run`] fetches every reachable manifest and
//! resource with a bounded number of workers. Manifests are parsed, their references
//! scheduled, then stored twice: rewritten at the mapped path and untouched next to it
//! with the [`ORIGINAL_SUFFIX`](crate::util::path::ORIGINAL_SUFFIX).

mod report;
mod task;
mod visited;

pub use report::{FailedTask, FailureKind, MirrorReport};
pub use task::{CrawlTask, TaskState};
pub use visited::VisitedSet;

use std::{
    any::Any, collections::VecDeque, num::NonZeroU32, panic::AssertUnwindSafe, path::Path,
    sync::Arc,
};

use bytes::Bytes;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::{
    error::{MirrorError, MirrorResult},
    fetch::{fetch_with_retry, Fetcher, RetryPolicy},
    manifest::{is_mirrorable, ManifestFormat, ResourceRole},
    rewrite::rewrite_bytes,
    store::MirrorStore,
    util::path::{map_url, original_path},
};

pub struct Mirror<F, S> {
    fetcher: Arc<F>,
    store: Arc<S>,

    concurrency: NonZeroU32,
    retry: RetryPolicy,
    overwrite: bool,
    handle_ctrl_c: bool,
    token: CancellationToken,
}

impl<F, S> Mirror<F, S>
where
    F: Fetcher,
    S: MirrorStore,
{
    pub fn builder(fetcher: F, store: S) -> MirrorBuilder<F, S> {
        MirrorBuilder::new(fetcher, store)
    }

    /// Mirror everything reachable from the manifest at `start`.
    ///
    /// Failures of single resources are collected in the returned report, only an
    /// unusable start url is an error.
    pub async fn run(&self, start: Url) -> MirrorResult<MirrorReport> {
        if !is_mirrorable(&start) {
            return Err(MirrorError::UnsupportedScheme(start.scheme().to_string()));
        }

        let token = self.token.child_token();
        let ctrl_c = self
            .handle_ctrl_c
            .then(|| tokio::spawn(cancel_on_ctrl_c(token.clone())));

        let worker = Arc::new(Worker {
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            visited: VisitedSet::new(),
            retry: self.retry.clone(),
            overwrite: self.overwrite,
            token: token.clone(),
        });
        let concurrency = self.concurrency.get() as usize;
        tracing::info!("Start mirroring {start} with {concurrency} worker(s).");

        let mut queue = VecDeque::new();
        let start = CrawlTask::new(start, ResourceRole::SubManifest);
        worker.visited.schedule(&start.url);
        queue.push_back(start);

        let mut workers = JoinSet::new();
        let mut report = MirrorReport::default();
        loop {
            while workers.len() < concurrency && !token.is_cancelled() {
                let Some(task) = queue.pop_front() else {
                    break;
                };
                let span = tracing::info_span!("task", url = %task.url, role = %task.role);
                workers.spawn(worker.clone().run(task).instrument(span));
            }
            if workers.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    report.cancelled = true;
                    break;
                }
                Some(joined) = workers.join_next() => match joined {
                    Ok(outcome) => {
                        queue.extend(outcome.discovered.iter().cloned());
                        worker.record(outcome, &mut report);
                    }
                    Err(e) => tracing::error!("Worker exited unexpectedly: {e}"),
                },
            }
        }
        if token.is_cancelled() && !queue.is_empty() {
            report.cancelled = true;
        }

        if let Some(ctrl_c) = ctrl_c {
            ctrl_c.abort();
        }
        report.log_summary();
        if let Some(location) = self.store.location_hint() {
            tracing::info!("Mirror saved to {location}");
        }
        Ok(report)
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("Ctrl-C received, stopping mirror.");
    token.cancel();

    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!("Ctrl-C received again, force exit.");
    std::process::exit(1);
}

pub struct MirrorBuilder<F, S> {
    fetcher: F,
    store: S,

    concurrency: NonZeroU32,
    retry: RetryPolicy,
    overwrite: bool,
    handle_ctrl_c: bool,
    token: Option<CancellationToken>,
}

impl<F, S> MirrorBuilder<F, S>
where
    F: Fetcher,
    S: MirrorStore,
{
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            concurrency: NonZeroU32::MIN.saturating_add(4),
            retry: RetryPolicy::default(),
            overwrite: false,
            handle_ctrl_c: false,
            token: None,
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    /// Fetch resources again even if the store already has them.
    ///
    /// Manifests are always fetched again.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Stop on the first Ctrl-C and exit the process on the second one.
    pub fn handle_ctrl_c(mut self, handle_ctrl_c: bool) -> Self {
        self.handle_ctrl_c = handle_ctrl_c;
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn build(self) -> Mirror<F, S> {
        Mirror {
            fetcher: Arc::new(self.fetcher),
            store: Arc::new(self.store),
            concurrency: self.concurrency,
            retry: self.retry,
            overwrite: self.overwrite,
            handle_ctrl_c: self.handle_ctrl_c,
            token: self.token.unwrap_or_default(),
        }
    }
}

enum TaskResult {
    Manifest,
    Resource,
    Skipped,
    Cancelled,
    Failed(FailureKind, String),
}

struct TaskOutcome {
    task: CrawlTask,
    discovered: Vec<CrawlTask>,
    result: TaskResult,
}

type TaskError = (FailureKind, MirrorError);

struct Worker<F, S> {
    fetcher: Arc<F>,
    store: Arc<S>,
    visited: VisitedSet,

    retry: RetryPolicy,
    overwrite: bool,
    token: CancellationToken,
}

impl<F, S> Worker<F, S>
where
    F: Fetcher,
    S: MirrorStore,
{
    async fn run(self: Arc<Self>, task: CrawlTask) -> TaskOutcome {
        let mut discovered = Vec::new();
        let result = AssertUnwindSafe(self.process(&task, &mut discovered))
            .catch_unwind()
            .await;

        let result = match result {
            Ok(Ok(result)) => result,
            Ok(Err((_, MirrorError::Cancelled))) => TaskResult::Cancelled,
            Ok(Err((kind, e))) => TaskResult::Failed(kind, e.to_string()),
            Err(panic) => TaskResult::Failed(FailureKind::Internal, panic_message(panic)),
        };
        TaskOutcome {
            task,
            discovered,
            result,
        }
    }

    async fn process(
        &self,
        task: &CrawlTask,
        discovered: &mut Vec<CrawlTask>,
    ) -> Result<TaskResult, TaskError> {
        let path = map_url(&task.url);
        let manifest_candidate = task.is_manifest_candidate();
        if !self.overwrite && !manifest_candidate && self.store.exists(&path).await {
            tracing::debug!("{} already exists, skipping.", path.display());
            return Ok(TaskResult::Skipped);
        }

        self.visited.transition(&task.url, TaskState::Fetching);
        let data = fetch_with_retry(self.fetcher.as_ref(), &task.url, &self.retry, &self.token)
            .await
            .map_err(|e| (FailureKind::Fetch, e))?;

        if manifest_candidate {
            if let Some(format) = ManifestFormat::detect(&task.url, &data) {
                self.mirror_manifest(task, format, data, &path, discovered)
                    .await?;
                return Ok(TaskResult::Manifest);
            }
            tracing::warn!("{} is neither an HLS playlist nor an MPD, storing as is.", task.url);
        }

        self.write(&path, data).await?;
        Ok(TaskResult::Resource)
    }

    async fn mirror_manifest(
        &self,
        task: &CrawlTask,
        format: ManifestFormat,
        data: Bytes,
        path: &Path,
        discovered: &mut Vec<CrawlTask>,
    ) -> Result<(), TaskError> {
        let document = format
            .decode(&data)
            .and_then(|text| format.parse(&text, &task.url))
            .map_err(|e| (FailureKind::Parse, e))?;
        self.visited.transition(&task.url, TaskState::Parsed);
        tracing::debug!(
            "Found {} reference(s) in {:?} manifest.",
            document.references.len(),
            document.kind
        );

        for reference in document.references.iter() {
            if self.visited.schedule(&reference.url) {
                discovered.push(CrawlTask::new(reference.url.clone(), reference.role));
            }
        }

        let rewritten = rewrite_bytes(&document, &data);
        self.visited.transition(&task.url, TaskState::Rewritten);

        let original = original_path(path);
        let unchanged = matches!(
            self.store.read(&original).await,
            Ok(Some(existing)) if existing == data
        );
        if !unchanged {
            self.write(&original, data).await?;
        }
        self.write(path, Bytes::from(rewritten)).await
    }

    async fn write(&self, path: &Path, data: Bytes) -> Result<(), TaskError> {
        self.store
            .write(path, data)
            .await
            .map_err(|e| (FailureKind::Write, e))
    }

    fn record(&self, outcome: TaskOutcome, report: &mut MirrorReport) {
        let TaskOutcome { task, result, .. } = outcome;
        match result {
            TaskResult::Manifest => report.manifests += 1,
            TaskResult::Resource => report.resources += 1,
            TaskResult::Skipped => report.skipped += 1,
            TaskResult::Cancelled => {
                report.cancelled = true;
                return;
            }
            TaskResult::Failed(kind, reason) => {
                self.visited.transition(&task.url, TaskState::Failed);
                match kind {
                    FailureKind::Write | FailureKind::Internal => {
                        tracing::error!("Failed to mirror {} ({kind}): {reason}", task.url)
                    }
                    FailureKind::Fetch | FailureKind::Parse => {
                        tracing::warn!("Failed to mirror {} ({kind}): {reason}", task.url)
                    }
                }
                report.failed.push(FailedTask {
                    url: task.url,
                    role: task.role,
                    kind,
                    reason,
                });
                return;
            }
        }
        self.visited.transition(&task.url, TaskState::Done);

        let finished = report.finished();
        let total = self.visited.len();
        tracing::info!(
            "Processing {} finished. ({finished} / {total} or {:.2}%)",
            task.url,
            finished as f32 / total as f32 * 100.
        );
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast_ref::<&str>() {
            Some(message) => message.to_string(),
            None => "worker panicked".to_string(),
        },
    }
}
