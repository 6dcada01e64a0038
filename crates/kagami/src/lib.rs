//! Mirror HLS and DASH streams to a local directory that can be served as is.
//!
//! ```text
//!  start url ──► fetch ──► manifest? ──no──► store leaf
//!                  ▲           │
//!                  │          yes
//!                  │           ▼
//!                  │    parse (hls / dash) ──► rewrite ──► store manifest + .orig
//!                  │           │
//!                  └── queue ◄─┘ new references
//! ```

pub mod dash;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod manifest;
pub mod mirror;
pub mod rewrite;
pub mod store;
pub mod util;

pub use error::{MirrorError, MirrorResult};
pub use fetch::{Fetcher, RetryPolicy};
pub use manifest::{
    ManifestDocument, ManifestFormat, ManifestKind, ResourceReference, ResourceRole,
    RewriteTarget, TemplateExpansion, UriLocation,
};
pub use mirror::{FailedTask, FailureKind, Mirror, MirrorBuilder, MirrorReport};
pub use store::{FileStore, MemoryStore, MirrorStore};
pub use util::http::HttpClient;

pub use reqwest;
pub use url::Url;
