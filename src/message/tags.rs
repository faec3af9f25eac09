//! Tag block decoding.
//!
//! Twitch attaches a `@key=value;key=value` block to most lines. Some values
//! carry their own sub-grammar:
//!
//! - `badges=subscriber/12,premium/1` is a map of badge name to version;
//! - `emotes=25:0-4,12-16/1902:6-10` is a map of emote id to character ranges.
//!
//! [`Tags::parse`] resolves both forms so no delimiter-bearing string ever
//! reaches the caller. Plain values are IRCv3-unescaped.

use std::collections::BTreeMap;
use std::fmt::{self, Result as FmtResult, Write};

use crate::error::TagParseError;

/// Key whose value has no published grammar and is never decoded.
pub const RAW_KEY: &str = "flags";

/// A single `-` separated range from a `:` form value, e.g. `0-4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagRange(pub Vec<String>);

impl TagRange {
    /// Numeric `(start, end)` bounds, if the range has exactly two numeric parts.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        match self.0.as_slice() {
            [start, end] => Some((start.parse().ok()?, end.parse().ok()?)),
            _ => None,
        }
    }
}

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagValue {
    /// A plain (unescaped) string.
    Text(String),
    /// `/` form: sub-key to values, e.g. `badges`.
    List(BTreeMap<String, Vec<String>>),
    /// `:` form: sub-key to ranges, e.g. `emotes`.
    Ranges(BTreeMap<String, Vec<TagRange>>),
}

impl TagValue {
    /// Decode one raw value.
    pub fn parse(key: &str, raw: &str) -> Self {
        if key == RAW_KEY {
            return Self::Text(raw.to_owned());
        }
        // Escaped text is free-form, never structured.
        if !raw.contains('\\') {
            if raw.contains(':') {
                if let Some(ranges) = parse_ranges(raw) {
                    return Self::Ranges(ranges);
                }
            } else if raw.contains('/') {
                if let Some(list) = parse_list(raw) {
                    return Self::List(list);
                }
            }
        }
        Self::Text(unescape_tag_value(raw))
    }

    /// The value as plain text, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The `/` form map, if the value is one.
    pub fn as_list(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::List(map) => Some(map),
            _ => None,
        }
    }

    /// The `:` form map, if the value is one.
    pub fn as_ranges(&self) -> Option<&BTreeMap<String, Vec<TagRange>>> {
        match self {
            Self::Ranges(map) => Some(map),
            _ => None,
        }
    }

    fn write_wire(&self, key: &str, f: &mut dyn Write) -> FmtResult {
        match self {
            Self::Text(s) if key == RAW_KEY => f.write_str(s),
            Self::Text(s) => {
                let mut escaped = String::with_capacity(s.len());
                escape_tag_value(&mut escaped, s)?;
                if !escaped.contains('\\') && !matches!(Self::parse(key, &escaped), Self::Text(_)) {
                    mark_as_text(&mut escaped);
                }
                f.write_str(&escaped)
            }
            Self::List(map) => {
                let mut first = true;
                for (sub, values) in map {
                    for value in values {
                        if !first {
                            f.write_char(',')?;
                        }
                        first = false;
                        write!(f, "{}/{}", sub, value)?;
                    }
                }
                Ok(())
            }
            Self::Ranges(map) => {
                for (i, (sub, ranges)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_char('/')?;
                    }
                    write!(f, "{}:", sub)?;
                    for (j, range) in ranges.iter().enumerate() {
                        if j > 0 {
                            f.write_char(',')?;
                        }
                        f.write_str(&range.0.join("-"))?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Make an escaped value that would decode as a list or ranges decode as
/// text instead. Any `\` keeps [`TagValue::parse`] from reading structure, so
/// put one before a character it unescapes to itself. When every character
/// has an escape meaning, a lone trailing `\` is appended; unescaping drops it.
fn mark_as_text(escaped: &mut String) {
    match escaped.find(|c| !matches!(c, ':' | 's' | 'r' | 'n' | '\\')) {
        Some(at) => escaped.insert(at, '\\'),
        None => escaped.push('\\'),
    }
}

fn parse_list(raw: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in raw.split(',') {
        let (sub, value) = entry.split_once('/')?;
        if sub.is_empty() {
            return None;
        }
        map.entry(sub.to_owned()).or_default().push(value.to_owned());
    }
    Some(map)
}

fn parse_ranges(raw: &str) -> Option<BTreeMap<String, Vec<TagRange>>> {
    let mut map: BTreeMap<String, Vec<TagRange>> = BTreeMap::new();
    for entry in raw.split('/') {
        let (sub, list) = entry.split_once(':')?;
        if sub.is_empty() || list.is_empty() {
            return None;
        }
        let ranges = map.entry(sub.to_owned()).or_default();
        for item in list.split(',') {
            if item.is_empty() {
                return None;
            }
            ranges.push(TagRange(item.split('-').map(str::to_owned).collect()));
        }
    }
    Some(map)
}

/// A decoded tag block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tags(BTreeMap<String, TagValue>);

impl Tags {
    /// Create an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a tag block without its leading `@`.
    ///
    /// Empty segments (a trailing `;`) are ignored. A later duplicate key
    /// replaces an earlier one.
    pub fn parse(block: &str) -> Result<Self, TagParseError> {
        let mut tags = BTreeMap::new();
        for pair in block.split(';').filter(|p| !p.is_empty()) {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| TagParseError::MissingDelimiter(pair.to_owned()))?;
            if key.is_empty() {
                return Err(TagParseError::EmptyKey(pair.to_owned()));
            }
            tags.insert(key.to_owned(), TagValue::parse(key, raw));
        }
        Ok(Self(tags))
    }

    /// Look up a tag.
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.get(key)
    }

    /// Look up a plain-text tag.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(TagValue::as_str)
    }

    /// Insert or replace a tag.
    pub fn insert(&mut self, key: impl Into<String>, value: TagValue) -> Option<TagValue> {
        self.0.insert(key.into(), value)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the block had no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode back to wire form, without the leading `@`.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> FmtResult {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(';')?;
            }
            f.write_str(key)?;
            f.write_char('=')?;
            value.write_wire(key, f)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Tags {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<(String, TagValue)> for Tags {
    fn from_iter<I: IntoIterator<Item = (String, TagValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Escape a tag value for serialization.
///
/// Escapes special characters according to IRCv3 message tags.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Unescape a tag value from wire format.
///
/// Reverses the escaping applied by [`escape_tag_value`].
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, &[&str])]) -> TagValue {
        TagValue::List(
            pairs
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_scalars_and_badges() {
        let tags = Tags::parse("badge-info=;badges=subscriber/12;color=#FF0000;mod=0").unwrap();
        assert_eq!(tags.len(), 4);
        assert_eq!(tags.get_str("badge-info"), Some(""));
        assert_eq!(tags.get("badges"), Some(&list(&[("subscriber", &["12"])])));
        assert_eq!(tags.get_str("color"), Some("#FF0000"));
        assert_eq!(tags.get_str("mod"), Some("0"));
    }

    #[test]
    fn test_parse_multiple_badges() {
        let tags = Tags::parse("badges=broadcaster/1,subscriber/0,premium/1").unwrap();
        assert_eq!(
            tags.get("badges"),
            Some(&list(&[("broadcaster", &["1"]), ("premium", &["1"]), ("subscriber", &["0"])]))
        );
    }

    #[test]
    fn test_parse_emote_ranges() {
        let tags = Tags::parse("emotes=25:0-4,12-16/1902:6-10").unwrap();
        let ranges = tags.get("emotes").and_then(TagValue::as_ranges).unwrap();
        assert_eq!(ranges.len(), 2);
        let kappa: Vec<_> = ranges["25"].iter().map(|r| r.bounds().unwrap()).collect();
        assert_eq!(kappa, vec![(0, 4), (12, 16)]);
        assert_eq!(ranges["1902"][0].bounds(), Some((6, 10)));
    }

    #[test]
    fn test_flags_left_raw() {
        let tags = Tags::parse("flags=0-4:A.3/P.1,6-9:S.5").unwrap();
        assert_eq!(tags.get_str("flags"), Some("0-4:A.3/P.1,6-9:S.5"));
    }

    #[test]
    fn test_escaped_text_not_structured() {
        let tags = Tags::parse("system-msg=5\\sraiders\\sfrom\\sa/b:c").unwrap();
        assert_eq!(tags.get_str("system-msg"), Some("5 raiders from a/b:c"));
    }

    #[test]
    fn test_free_text_with_colon_stays_text() {
        let tags = Tags::parse("reply-parent-msg-body=hi:").unwrap();
        assert_eq!(tags.get_str("reply-parent-msg-body"), Some("hi:"));
    }

    #[test]
    fn test_missing_delimiter() {
        let err = Tags::parse("color=#FFF;mod;subscriber=1").unwrap_err();
        assert_eq!(err, TagParseError::MissingDelimiter("mod".to_string()));
    }

    #[test]
    fn test_empty_key() {
        let err = Tags::parse("=1").unwrap_err();
        assert_eq!(err, TagParseError::EmptyKey("=1".to_string()));
    }

    #[test]
    fn test_trailing_semicolon() {
        let tags = Tags::parse("mod=1;").unwrap();
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_to_wire() {
        let raw = "badges=subscriber/12;color=#FF0000;emotes=25:0-4,12-16;mod=0";
        let tags = Tags::parse(raw).unwrap();
        assert_eq!(tags.to_wire(), raw);
        assert_eq!(Tags::parse(&tags.to_wire()).unwrap(), tags);
    }

    #[test]
    fn test_structured_looking_text_round_trips() {
        for text in ["a/b", "a:b", "25:0-4", "s:n", "x/y,z/w"] {
            let mut tags = Tags::new();
            tags.insert("msg", TagValue::Text(text.to_string()));
            let wire = tags.to_wire();
            assert_eq!(Tags::parse(&wire).unwrap(), tags, "wire form {:?}", wire);
        }
    }

    #[test]
    fn test_plain_text_is_not_marked() {
        let mut tags = Tags::new();
        tags.insert("msg", TagValue::from("hi:"));
        tags.insert("color", TagValue::from("#FF0000"));
        assert_eq!(tags.to_wire(), "color=#FF0000;msg=hi:");
    }

    /// IRCv3 specifies these escape sequences:
    /// - `\:` → `;` (semicolon)
    /// - `\s` → ` ` (space)
    /// - `\\` → `\` (backslash)
    /// - `\r` → CR (carriage return)
    /// - `\n` → LF (line feed)
    #[test]
    fn test_unescape_combined() {
        let input = "a\\:b\\sc\\\\d\\re\\nf";
        let expected = "a;b c\\d\re\nf";
        assert_eq!(unescape_tag_value(input), expected);
    }

    #[test]
    fn test_unescape_trailing_backslash() {
        assert_eq!(unescape_tag_value("test\\"), "test");
    }

    #[test]
    fn test_unescape_unknown_escape() {
        assert_eq!(unescape_tag_value("a\\xb"), "axb");
    }

    #[test]
    fn test_escape_roundtrip() {
        let test_values = vec![
            "simple",
            "with space",
            "with;semicolon",
            "with\\backslash",
            "with\nnewline",
            "complex; \\ \n \r all",
        ];

        for original in test_values {
            let mut escaped = String::new();
            escape_tag_value(&mut escaped, original).unwrap();
            let unescaped = unescape_tag_value(&escaped);
            assert_eq!(
                unescaped, original,
                "Roundtrip failed: '{}' -> '{}' -> '{}'",
                original, escaped, unescaped
            );
        }
    }
}
