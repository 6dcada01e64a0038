use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::{MirrorError, MirrorResult},
    util::http::HttpClient,
};

/// Performs a single GET request.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = MirrorResult<Bytes>> + Send;
}

impl<F> Fetcher for Arc<F>
where
    F: Fetcher,
{
    fn fetch(&self, url: &Url) -> impl Future<Output = MirrorResult<Bytes>> + Send {
        self.as_ref().fetch(url)
    }
}

impl Fetcher for HttpClient {
    fn fetch(&self, url: &Url) -> impl Future<Output = MirrorResult<Bytes>> + Send {
        let request = self.get(url.clone());
        let url = url.to_string();
        async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                if let Ok(body) = response.text().await {
                    tracing::debug!("Error body: {body}");
                }
                return Err(MirrorError::HttpError { status, url });
            }

            let bytes = response.bytes().await?;
            Ok(bytes)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to half of `base_delay` to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        if !self.jitter {
            return delay;
        }

        let jitter_range = self.base_delay / 2;
        let jitter_limit = jitter_range.min(self.max_delay.saturating_sub(delay));
        let jitter_limit_ms = u64::try_from(jitter_limit.as_millis()).unwrap_or(u64::MAX);
        if jitter_limit_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_limit_ms))
    }
}

/// Fetch `url`, retrying transient failures with exponential backoff.
///
/// Permanent failures are returned at once. Cancelling `token` interrupts both the
/// request and the backoff.
pub async fn fetch_with_retry<F>(
    fetcher: &F,
    url: &Url,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> MirrorResult<Bytes>
where
    F: Fetcher,
{
    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MirrorError::Cancelled),
            result = fetcher.fetch(url) => result,
        };

        match result {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying {url}"
                );
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(MirrorError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
