//! Mapping between remote urls and local paths.
//!
//! A url is mirrored to `<host>[~p<port>]/<path segments>`, with its query folded into
//! the file name. `~` is the only escape character:
//!
//! * in the host and the query, every byte outside `[A-Za-z0-9._-]` becomes `~XX`;
//! * in path segments only `~` itself is escaped (`~7E`), the rest of the segment
//!   is kept as the url spells it;
//! * `~e` is an empty segment, `~index` an empty file name;
//! * `~q~<encoded query>` or `~h~<sha256 prefix>` is inserted before the extension.
//!
//! As an escape is always followed by two hex digits, none of the markers above can be
//! produced from a real url component, so two different urls never share a local path.

use std::{
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
};

use sha2::{Digest, Sha256};
use url::Url;

/// Suffix of the untouched copy of a rewritten manifest.
pub const ORIGINAL_SUFFIX: &str = ".orig";

const QUERY_DELIMITER: &str = "~q~";
const HASHED_QUERY_DELIMITER: &str = "~h~";
const MAX_ENCODED_QUERY_LEN: usize = 64;
const HASHED_QUERY_LEN: usize = 32;

/// Relative local path of a mirrored url.
pub fn map_url(url: &Url) -> PathBuf {
    let mut path = local_dir(url);
    path.push(file_name(url));
    path
}

/// The local directory relative references inside `url` resolve against.
///
/// This is always the parent of [`map_url`].
pub fn local_dir(url: &Url) -> PathBuf {
    let mut path = PathBuf::from(host_component(url));
    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.collect();
        if let Some((_, dirs)) = segments.split_last() {
            for dir in dirs {
                path.push(escape_segment(dir));
            }
        }
    }
    path
}

/// `/`-separated path leading from directory `from` to `to`.
///
/// Both paths must be relative paths produced by this module.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::with_capacity(from.len() - common + to.len() - common);
    parts.extend(std::iter::repeat("..".to_string()).take(from.len() - common));
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn host_component(url: &Url) -> String {
    let mut host = encode(url.host_str().unwrap_or("localhost"));
    if let Some(port) = url.port() {
        host.push_str(&format!("~p{port}"));
    }
    host
}

fn file_name(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let mut name = if last.is_empty() {
        "~index".to_string()
    } else {
        escape_segment(last)
    };

    if let Some(query) = url.query() {
        name = insert_before_extension(&name, &fold_query(query));
    }

    if let Some(stem) = name.strip_suffix(ORIGINAL_SUFFIX) {
        name = format!("{stem}~2Eorig");
    }
    name
}

fn escape_segment(segment: &str) -> String {
    match segment {
        "" => "~e".to_string(),
        "." => "~2E".to_string(),
        ".." => "~2E~2E".to_string(),
        _ => segment.replace('~', "~7E"),
    }
}

fn fold_query(query: &str) -> String {
    let encoded = encode(query);
    if encoded.len() > MAX_ENCODED_QUERY_LEN {
        let digest = hex::encode(Sha256::digest(query.as_bytes()));
        format!("{HASHED_QUERY_DELIMITER}{}", &digest[..HASHED_QUERY_LEN])
    } else {
        format!("{QUERY_DELIMITER}{encoded}")
    }
}

fn insert_before_extension(name: &str, suffix: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{}{suffix}{}", &name[..pos], &name[pos..]),
        _ => format!("{name}{suffix}"),
    }
}

fn encode(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            output.push(byte as char);
        } else {
            output.push_str(&format!("~{byte:02X}"));
        }
    }
    output
}

pub trait MirrorPathExt {
    /// Append suffix to the whole file name, including its extension.
    ///
    /// For example, `index.m3u8` with `.orig` will be `index.m3u8.orig`.
    fn with_appended_suffix<T: AsRef<OsStr>>(&self, suffix: T) -> PathBuf;
}

impl MirrorPathExt for Path {
    fn with_appended_suffix<T: AsRef<OsStr>>(&self, suffix: T) -> PathBuf {
        let mut filename = OsString::new();
        if let Some(name) = self.file_name() {
            filename.push(name);
        }
        filename.push(suffix);
        self.with_file_name(filename)
    }
}

/// Where the original bytes of the manifest mirrored at `path` are kept.
pub fn original_path(path: &Path) -> PathBuf {
    path.with_appended_suffix(ORIGINAL_SUFFIX)
}
