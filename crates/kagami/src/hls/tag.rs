use std::ops::Range;

/// One `NAME=VALUE` pair of an attribute list.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Attribute<'a> {
    pub name: &'a str,
    /// Value without surrounding quotes.
    pub value: &'a str,
    /// Range of `value` inside the attribute list.
    pub value_range: Range<usize>,
}

/// A tag line split into its name and attribute list.
pub(crate) struct Tag<'a> {
    pub name: &'a str,
    pub value: &'a str,
    /// Offset of `value` inside the line.
    pub value_offset: usize,
}

impl<'a> Tag<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let body = line.strip_prefix('#')?;
        if !body.starts_with("EXT") {
            return None;
        }

        match body.find(':') {
            Some(colon) => Some(Self {
                name: &body[..colon],
                value: &body[colon + 1..],
                value_offset: colon + 2,
            }),
            None => Some(Self {
                name: body,
                value: "",
                value_offset: line.len(),
            }),
        }
    }

    pub fn attributes(&self) -> Vec<Attribute<'a>> {
        parse_attributes(self.value)
    }
}

/// Parse an attribute list as defined in RFC 8216 section 4.2.
///
/// Quoted strings may contain commas. Attributes without a value are skipped.
pub(crate) fn parse_attributes(list: &str) -> Vec<Attribute<'_>> {
    let bytes = list.as_bytes();
    let len = bytes.len();
    let mut attributes = Vec::new();
    let mut i = 0;

    while i < len {
        while i < len && (bytes[i] == b',' || bytes[i].is_ascii_whitespace()) {
            i += 1;
        }
        if i >= len {
            break;
        }

        let name_start = i;
        while i < len && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        if i >= len || bytes[i] == b',' {
            continue;
        }
        let name = list[name_start..i].trim();
        i += 1;

        let (value_start, value_end) = if i < len && bytes[i] == b'"' {
            let value_start = i + 1;
            let value_end = list[value_start..]
                .find('"')
                .map(|end| value_start + end)
                .unwrap_or(len);
            i = (value_end + 1).min(len);
            (value_start, value_end)
        } else {
            let value_start = i;
            while i < len && bytes[i] != b',' {
                i += 1;
            }
            (value_start, i)
        };

        attributes.push(Attribute {
            name,
            value: &list[value_start..value_end],
            value_range: value_start..value_end,
        });
    }

    attributes
}
