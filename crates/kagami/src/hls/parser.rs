use std::borrow::Cow;

use url::Url;

use super::tag::Tag;
use crate::{
    error::{MirrorError, MirrorResult},
    manifest::{
        is_mirrorable, ManifestDocument, ManifestFormat, ManifestKind, ResourceReference,
        ResourceRole, RewriteTarget, UriLocation,
    },
};

/// Stands in for every byte of an invalid UTF-8 sequence in [`decode`]d text.
const INVALID_BYTE: char = '\u{1A}';

/// `data` as text of the same length, with invalid UTF-8 bytes replaced.
pub(crate) fn decode(data: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(data) {
        return Cow::Borrowed(text);
    }

    let mut text = String::with_capacity(data.len());
    for chunk in data.utf8_chunks() {
        text.push_str(chunk.valid());
        text.extend(std::iter::repeat(INVALID_BYTE).take(chunk.invalid().len()));
    }
    Cow::Owned(text)
}

/// Extract every mirrorable URI of an HLS playlist.
///
/// Master and media playlists share one grammar, so both are handled by the same scan.
/// Lines this parser does not understand are kept and contribute nothing.
pub fn parse(text: &str, manifest_url: &Url) -> MirrorResult<ManifestDocument> {
    let mut lines = lines_with_offsets(text).filter(|(_, line)| !line.trim().is_empty());
    match lines.next() {
        Some((_, line)) if line.trim_start_matches('\u{feff}').trim().starts_with("#EXTM3U") => {}
        Some((_, line)) => {
            return Err(MirrorError::M3u8Parse(format!(
                "expected #EXTM3U header, found {line:?}"
            )))
        }
        None => return Err(MirrorError::M3u8Parse("empty playlist".to_string())),
    }

    let mut playlist = PlaylistBuilder::new(manifest_url, text);
    let mut next_uri_is_variant = false;

    for (offset, line) in lines {
        let leading = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if !trimmed.starts_with('#') {
            let role = if std::mem::take(&mut next_uri_is_variant) {
                ResourceRole::SubManifest
            } else {
                ResourceRole::MediaSegment
            };
            let start = offset + leading;
            playlist.push(role, trimmed, start, true);
            continue;
        }

        let Some(tag) = Tag::parse(trimmed) else {
            // comment
            continue;
        };
        let value_start = offset + leading + tag.value_offset;

        let role = match tag.name {
            "EXT-X-STREAM-INF" => {
                playlist.is_master = true;
                next_uri_is_variant = true;
                continue;
            }
            "EXT-X-I-FRAME-STREAM-INF" | "EXT-X-MEDIA" => {
                playlist.is_master = true;
                ResourceRole::SubManifest
            }
            "EXT-X-RENDITION-REPORT" => ResourceRole::SubManifest,
            "EXT-X-KEY" | "EXT-X-SESSION-KEY" => ResourceRole::Key,
            "EXT-X-MAP" => ResourceRole::InitSegment,
            "EXT-X-PART" => ResourceRole::MediaSegment,
            "EXT-X-SESSION-DATA" => ResourceRole::SessionData,
            _ => continue,
        };

        let attributes = tag.attributes();
        let is_clear_key = attributes
            .iter()
            .any(|a| a.name == "METHOD" && a.value == "NONE");
        if role == ResourceRole::Key && is_clear_key {
            continue;
        }

        for attribute in attributes.iter().filter(|a| a.name == "URI") {
            let start = value_start + attribute.value_range.start;
            playlist.push(role, attribute.value, start, false);
        }
    }

    Ok(playlist.build())
}

struct PlaylistBuilder<'a> {
    document: ManifestDocument,
    manifest_url: &'a Url,
    is_master: bool,
}

impl<'a> PlaylistBuilder<'a> {
    fn new(manifest_url: &'a Url, text: &str) -> Self {
        Self {
            document: ManifestDocument::new(
                manifest_url.clone(),
                ManifestFormat::Hls,
                ManifestKind::HlsMedia,
                text,
            ),
            manifest_url,
            is_master: false,
        }
    }

    /// Record `raw` located at byte `start` of the playlist.
    ///
    /// `infer_role` refines the role of plain URI lines from their extension.
    fn push(&mut self, role: ResourceRole, raw: &str, start: usize, infer_role: bool) {
        if raw.is_empty() {
            return;
        }
        if raw.contains(INVALID_BYTE) {
            log::warn!("Skipping uri {raw:?} with invalid UTF-8 in {}", self.manifest_url);
            return;
        }

        let url = match self.manifest_url.join(raw) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Skipping invalid uri {raw:?} in {}: {e}", self.manifest_url);
                return;
            }
        };
        if !is_mirrorable(&url) {
            log::debug!("Skipping non-http uri {raw:?}");
            return;
        }

        let role = if infer_role && role == ResourceRole::MediaSegment {
            role_from_extension(&url)
        } else {
            role
        };

        self.document.locations.push(UriLocation {
            range: start..start + raw.len(),
            base: self.manifest_url.clone(),
            target: RewriteTarget::Resource { url: url.clone() },
        });
        self.document.references.push(ResourceReference {
            role,
            raw_uri: raw.to_string(),
            url,
        });
    }

    fn build(mut self) -> ManifestDocument {
        if self.is_master {
            self.document.kind = ManifestKind::HlsMaster;
        }
        self.document
    }
}

fn role_from_extension(url: &Url) -> ResourceRole {
    let path = url.path().to_ascii_lowercase();
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension {
        "m3u8" | "m3u" => ResourceRole::SubManifest,
        "vtt" | "webvtt" | "srt" | "ttml" => ResourceRole::TextTrack,
        _ => ResourceRole::MediaSegment,
    }
}

/// Lines of `text` without their terminators, with the byte offset they start at.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        (start, raw.trim_end_matches(|c| c == '\n' || c == '\r'))
    })
}
