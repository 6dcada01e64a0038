// References:
// 1. https://github.com/clitic/vsd/blob/30ca1985e4a467ea3304b11c08d3176deaafd22a/vsd/src/dash/template.rs
// 2. https://github.com/emarsden/dash-mpd-rs/blob/6ebdfb4759adbda8233b5b3520804e23ff86e7de/src/fetch.rs#L435-L466

use regex::{Captures, Regex, Replacer};
use std::{collections::HashMap, sync::LazyLock};

// From https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf:
// "For the avoidance of doubt, only %0[width]d is permitted and no other identifiers. The reason
// is that such a string replacement can be easily implemented without requiring a specific library."
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
//
// `$$` is an escaped dollar sign.
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(RepresentationID|Number|Time|Bandwidth)(?:%0(\d+)d)?)?\$")
        .expect("template regex is valid")
});

/// Values of the identifiers of a `SegmentTemplate`.
#[derive(Debug, Clone, Default)]
pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl Template<'_> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'static str, value: String) {
        self.args.insert(key, value);
    }

    /// Expand `template`. Identifiers without a value are kept as they are.
    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE_REGEX
            .replace_all(template, TemplateReplacer(&self.args))
            .to_string()
    }
}

impl<'a> FromIterator<(&'a str, String)> for Template<'a> {
    fn from_iter<I: IntoIterator<Item = (&'a str, String)>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

struct TemplateReplacer<'a>(&'a HashMap<&'a str, String>);

impl Replacer for TemplateReplacer<'_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        let Some(key) = caps.get(1) else {
            dst.push('$');
            return;
        };
        let Some(value) = self.0.get(key.as_str()) else {
            dst.push_str(&caps[0]);
            return;
        };

        match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
            Some(width) => dst.push_str(&format!("{value:0>width$}")),
            None => dst.push_str(value),
        }
    }
}

/// Replace every identifier of `template` by `substitute(identifier)`, where
/// `identifier` is the whole `$...$` text, and every `$$` by a plain `$`.
pub(crate) fn substitute_identifiers(
    template: &str,
    mut substitute: impl FnMut(&str) -> String,
) -> String {
    TEMPLATE_REGEX
        .replace_all(template, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                substitute(&caps[0])
            } else {
                "$".to_string()
            }
        })
        .to_string()
}

/// Whether `template` uses the identifier `name`.
pub(crate) fn has_identifier(template: &str, name: &str) -> bool {
    TEMPLATE_REGEX
        .captures_iter(template)
        .any(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))
}
