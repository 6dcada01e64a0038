use std::{borrow::Cow, fmt, ops::Range};

use serde::Serialize;
use url::Url;

use crate::{dash, error::MirrorResult, hls};

/// What a referenced resource is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRole {
    SubManifest,
    MediaSegment,
    InitSegment,
    /// A DASH segment index (`sidx`) stored apart from the media.
    IndexSegment,
    Key,
    TextTrack,
    /// A JSON file named by `EXT-X-SESSION-DATA`.
    SessionData,
}

impl fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceRole::SubManifest => "sub-manifest",
            ResourceRole::MediaSegment => "media-segment",
            ResourceRole::InitSegment => "init-segment",
            ResourceRole::IndexSegment => "index-segment",
            ResourceRole::Key => "key",
            ResourceRole::TextTrack => "text-track",
            ResourceRole::SessionData => "session-data",
        };
        f.write_str(name)
    }
}

/// A single URI found inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    pub role: ResourceRole,
    /// The URI as it is written in the manifest.
    ///
    /// For expanded DASH templates this is the expanded, still unresolved string.
    pub raw_uri: String,
    /// Absolute url of the resource.
    pub url: Url,
}

/// What a [`UriLocation`] is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteTarget {
    /// The local path of a single resource.
    Resource { url: Url },
    /// The local directory of a base url, ending with `/`.
    Directory { url: Url },
    /// A DASH segment template, rewritten into a template over local paths.
    ///
    /// `expansions` lists every url the template expanded to, so the local
    /// template can be checked against the mapped paths before it is written.
    Template {
        template: String,
        expansions: Vec<TemplateExpansion>,
    },
}

/// The identifier values one expansion of a DASH template was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExpansion {
    pub values: Vec<(&'static str, String)>,
    pub url: Url,
}

/// A byte range of the manifest text that refers to remote content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriLocation {
    pub range: Range<usize>,
    /// The url the value at `range` is resolved against.
    pub base: Url,
    pub target: RewriteTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ManifestFormat {
    Hls,
    Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    HlsMaster,
    HlsMedia,
    Dash,
}

impl ManifestFormat {
    /// Guess format from the extension of the url path.
    pub fn from_url(url: &Url) -> Option<Self> {
        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            Some(Self::Hls)
        } else if path.ends_with(".mpd") {
            Some(Self::Dash)
        } else {
            None
        }
    }

    /// Guess format from the leading bytes of a document.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let data = &data[start..];

        if data.starts_with(b"#EXTM3U") {
            return Some(Self::Hls);
        }
        if data.starts_with(b"<") {
            // Skip the xml declaration, comments and doctype before the root element.
            let head = &data[..data.len().min(4096)];
            let head = String::from_utf8_lossy(head);
            let mut rest = head.as_ref();
            while let Some(pos) = rest.find('<') {
                rest = &rest[pos + 1..];
                if rest.starts_with('?') || rest.starts_with('!') {
                    continue;
                }
                let name_end = rest
                    .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                    .unwrap_or(rest.len());
                let name = &rest[..name_end];
                let local = name.rsplit(':').next().unwrap_or(name);
                return (local == "MPD").then_some(Self::Dash);
            }
        }
        None
    }

    /// Extension first, content second.
    pub fn detect(url: &Url, data: &[u8]) -> Option<Self> {
        Self::from_url(url).or_else(|| Self::sniff(data))
    }

    /// Text of a fetched manifest.
    ///
    /// MPDs have to be UTF-8. Playlists are read even when they are not: each byte of
    /// an invalid sequence is replaced by a single placeholder character, so offsets
    /// into the text are offsets into `data`.
    pub fn decode(self, data: &[u8]) -> MirrorResult<Cow<'_, str>> {
        match self {
            ManifestFormat::Hls => Ok(hls::decode(data)),
            ManifestFormat::Dash => Ok(Cow::Borrowed(std::str::from_utf8(data)?)),
        }
    }

    pub fn parse(self, text: &str, url: &Url) -> MirrorResult<ManifestDocument> {
        match self {
            ManifestFormat::Hls => hls::parse(text, url),
            ManifestFormat::Dash => dash::parse(text, url),
        }
    }
}

/// A parsed manifest, alive until its rewritten copy is persisted.
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    pub url: Url,
    pub format: ManifestFormat,
    pub kind: ManifestKind,
    pub text: String,
    pub references: Vec<ResourceReference>,
    pub locations: Vec<UriLocation>,
}

impl ManifestDocument {
    pub(crate) fn new(url: Url, format: ManifestFormat, kind: ManifestKind, text: &str) -> Self {
        Self {
            url,
            format,
            kind,
            text: text.to_string(),
            references: Vec::new(),
            locations: Vec::new(),
        }
    }

    pub fn references_with_role(
        &self,
        role: ResourceRole,
    ) -> impl Iterator<Item = &ResourceReference> {
        self.references.iter().filter(move |r| r.role == role)
    }
}

/// Only http(s) resources are mirrored. Everything else is left as is.
pub(crate) fn is_mirrorable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
