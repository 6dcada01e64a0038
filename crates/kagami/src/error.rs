use std::error::Error as _;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("HTTP error {status} for {url}")]
    HttpError {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Invalid m3u8 file: {0}")]
    M3u8Parse(String),

    #[error("Invalid mpd file: {0}")]
    MpdParse(String),

    #[error(transparent)]
    XmlError(#[from] roxmltree::Error),

    #[error("Manifest is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Mirroring cancelled")]
    Cancelled,

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

impl MirrorError {
    /// Whether retrying the same request may succeed.
    ///
    /// Server errors, `408`, `429`, timeouts and broken connections are transient.
    /// Other status codes, DNS failures and malformed content are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::HttpError { status, .. } => {
                status.is_server_error()
                    || *status == reqwest::StatusCode::REQUEST_TIMEOUT
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            MirrorError::RequestError(e) => {
                if is_dns_failure(e) {
                    return false;
                }
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }
}

fn is_dns_failure(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if err.to_string().contains("dns error") {
            return true;
        }
        source = err.source();
    }
    false
}

pub type MirrorResult<T> = Result<T, MirrorError>;
