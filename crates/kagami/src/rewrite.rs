//! Rewriting of manifests to point at mirrored files.
//!
//! Parsers record where each URI sits in the manifest text, so rewriting is a single
//! splice over those ranges and every other byte is copied as is.

use std::{ops::Range, path::Path};

use url::Url;

use crate::{
    dash::{
        merge_baseurls,
        template::{substitute_identifiers, Template},
    },
    manifest::{
        is_mirrorable, ManifestDocument, ManifestFormat, RewriteTarget, TemplateExpansion,
        UriLocation,
    },
    util::path::{local_dir, map_url, relative_path},
};

/// Produce the text of `document` with every located URI replaced by the relative
/// path of its mirrored copy.
pub fn rewrite(document: &ManifestDocument) -> String {
    let text = document.text.as_str();
    let mut output = String::with_capacity(text.len() + text.len() / 4);
    let mut cursor = 0;
    for (range, value) in replacements(document) {
        output.push_str(&text[cursor..range.start]);
        output.push_str(&value);
        cursor = range.end;
    }
    output.push_str(&text[cursor..]);
    output
}

/// [`rewrite`] over the bytes `document` was decoded from.
///
/// Bytes outside of the located URIs are copied from `original`, so a playlist
/// that is not valid UTF-8 keeps them as they were served.
pub fn rewrite_bytes(document: &ManifestDocument, original: &[u8]) -> Vec<u8> {
    if original.len() != document.text.len() {
        tracing::warn!("{} does not match its decoded text", document.url);
        return rewrite(document).into_bytes();
    }

    let mut output = Vec::with_capacity(original.len() + original.len() / 4);
    let mut cursor = 0;
    for (range, value) in replacements(document) {
        output.extend_from_slice(&original[cursor..range.start]);
        output.extend_from_slice(value.as_bytes());
        cursor = range.end;
    }
    output.extend_from_slice(&original[cursor..]);
    output
}

/// Sorted, non-overlapping ranges of `document.text` and their new values.
fn replacements(document: &ManifestDocument) -> Vec<(Range<usize>, String)> {
    let text = document.text.as_str();
    let mut locations: Vec<&UriLocation> = document.locations.iter().collect();
    locations.sort_by_key(|l| (l.range.start, l.range.end));

    let mut replacements = Vec::new();
    let mut cursor = 0;
    // locations sharing a range are replaced only if they all agree
    for group in locations.chunk_by(|a, b| a.range == b.range) {
        let range = group[0].range.clone();
        if range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            tracing::warn!("Ignoring location {range:?} outside of {}", document.url);
            continue;
        }
        if range.start < cursor {
            tracing::warn!("Ignoring overlapping location {range:?} in {}", document.url);
            continue;
        }
        cursor = range.end;

        let mut values = group.iter().map(|l| replacement(l, document.format));
        let agreed = match values.next().flatten() {
            Some(first) if values.all(|v| v.as_ref() == Some(&first)) => Some(first),
            _ => None,
        };
        match agreed {
            Some(value) => replacements.push((range, value)),
            None if group.len() > 1 => tracing::warn!(
                "{:?} in {} is shared by resources that map differently, keeping it",
                &text[range],
                document.url
            ),
            None => {}
        }
    }
    replacements
}

/// The new value of `location`, or `None` to keep the original one.
fn replacement(location: &UriLocation, format: ManifestFormat) -> Option<String> {
    let from = local_dir(&location.base);
    let value = match &location.target {
        RewriteTarget::Resource { url } => escape_path(relative_path(&from, &map_url(url))),
        RewriteTarget::Directory { url } => {
            let relative = escape_path(relative_path(&from, &local_dir(url)));
            if relative.is_empty() {
                "./".to_string()
            } else {
                format!("{relative}/")
            }
        }
        RewriteTarget::Template {
            template,
            expansions,
        } => local_template(template, expansions, &location.base, &from)?,
    };

    Some(match format {
        ManifestFormat::Hls => value,
        ManifestFormat::Dash => escape_xml(&value),
    })
}

/// Turn a segment template into one over mapped paths.
///
/// Identifiers are swapped for alphanumeric sentinels, which every mapping keeps
/// verbatim, so the mapped url can be turned back into a template. The result is
/// only used if each of `expansions` expands to the mapped path of its url.
fn local_template(
    template: &str,
    expansions: &[TemplateExpansion],
    base: &Url,
    from: &Path,
) -> Option<String> {
    let sentinel = |index: usize| format!("kagami{index}x");

    let mut identifiers = Vec::new();
    let with_sentinels = substitute_identifiers(template, |identifier| {
        identifiers.push(identifier.to_string());
        sentinel(identifiers.len() - 1)
    });

    let url = match merge_baseurls(base, &with_sentinels) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Keeping template {template:?}: {e}");
            return None;
        }
    };

    let mut local = escape_path(relative_path(from, &map_url(&url))).replace('$', "$$");
    for (index, identifier) in identifiers.iter().enumerate() {
        let sentinel = sentinel(index);
        if !local.contains(&sentinel) {
            tracing::warn!("Keeping template {template:?}, its mapped path {local:?} lost {identifier}");
            return None;
        }
        local = local.replace(&sentinel, identifier);
    }

    for expansion in expansions {
        if !is_mirrorable(&expansion.url) {
            return None;
        }
        let expanded = expansion
            .values
            .iter()
            .cloned()
            .collect::<Template>()
            .resolve(&local);
        let expected = escape_path(relative_path(from, &map_url(&expansion.url)));
        if expanded != expected {
            tracing::warn!(
                "Keeping template {template:?}, {local:?} expands to {expanded:?} instead of {expected:?}"
            );
            return None;
        }
    }
    Some(local)
}

/// Make a relative path safe to be read back as a relative url.
fn escape_path(path: String) -> String {
    let path = path.replace('%', "%25");
    // `a:b.ts` would be read as an url with scheme `a`
    if path.split('/').next().is_some_and(|first| first.contains(':')) {
        format!("./{path}")
    } else {
        path
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
