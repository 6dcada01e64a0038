//! HLS playlists.
//!
//! Playlists are scanned line by line instead of being parsed into a full model, so
//! every byte that is not a URI survives rewriting untouched.

mod parser;
mod tag;

pub(crate) use parser::decode;
pub use parser::parse;
