use std::{fs::File, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context};
use clap::Parser;
use fake_user_agent::get_chrome_rua;
use kagami::{FileStore, HttpClient, Mirror, RetryPolicy, Url};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder,
};

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct KagamiArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Concurrent requests limit
    #[clap(long, alias = "threads", default_value = "5")]
    concurrency: NonZeroU32,

    /// Retry limit of each request
    #[clap(long, default_value = "5")]
    retries: u32,

    /// Delay before the first retry in milliseconds, doubled on every retry
    #[clap(long, default_value = "500")]
    retry_delay: u64,

    /// Request timeout in seconds
    #[clap(long, default_value = "10")]
    timeout: u64,

    /// Output directory
    #[clap(short, long, env = "KAGAMI_OUTPUT", default_value = "./mirror")]
    output: PathBuf,

    /// Fetch resources again even if they have been mirrored before
    #[clap(long)]
    overwrite: bool,

    /// Write a JSON report of the run to this path
    #[clap(long)]
    report: Option<PathBuf>,

    /// Cookies used to fetch
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to fetch
    ///
    /// Custom header. eg. "Referer: https://example.com". This option will override --cookies.
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Url of the m3u8 playlist or mpd manifest
    url: String,
}

impl KagamiArgs {
    fn client(&self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(cookies) = &self.cookies {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(cookies).context("Invalid cookie")?,
            );
        }

        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        let builder = ClientBuilder::new()
            .default_headers(headers)
            .user_agent(get_chrome_rua())
            .connect_timeout(Duration::from_secs(self.timeout))
            .timeout(Duration::from_secs(self.timeout.saturating_mul(6)));
        Ok(HttpClient::new(builder)?)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retries,
            base_delay: Duration::from_millis(self.retry_delay),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = KagamiArgs::parse();

    let default_level = if args.verbose { "kagami=debug" } else { "kagami=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let url = Url::parse(&args.url).with_context(|| format!("Invalid url: {}", args.url))?;
    let client = args.client()?;
    let store = FileStore::new(&args.output);

    let mirror = Mirror::builder(client, store)
        .concurrency(args.concurrency)
        .retry_policy(args.retry_policy())
        .overwrite(args.overwrite)
        .handle_ctrl_c(true)
        .build();
    let report = mirror.run(url).await?;

    if let Some(path) = &args.report {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
        log::info!("Report written to {}", path.display());
    }

    if report.cancelled {
        bail!("Mirroring was cancelled.");
    }
    if !report.failed.is_empty() {
        bail!("{} resource(s) failed to mirror.", report.failed.len());
    }
    Ok(())
}
