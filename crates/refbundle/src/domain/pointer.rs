//! JSON pointer codec: parsed key paths and their escaped textual form.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::domain::errors::PointerError;

/// Characters escaped when a pointer is embedded as a URI fragment.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// Ordered sequence of keys locating a node inside a tree.
///
/// Array indices are stored as their decimal representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPath(Vec<String>);

impl JsonPath {
    /// The empty path, addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_key(&self, key: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.0.push(key.into());
        copy
    }

    pub fn with_keys<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut copy = self.clone();
        copy.0.extend(keys.into_iter().map(Into::into));
        copy
    }

    pub fn push(&mut self, key: impl Into<String>) {
        self.0.push(key.into());
    }

    /// Returns `true` when `prefix` is a prefix of `self` (a path is a sub path of itself).
    pub fn is_sub_path_of(&self, prefix: &JsonPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Keys remaining after removing `prefix`, if `prefix` is a prefix of `self`.
    pub fn tail_after(&self, prefix: &JsonPath) -> Option<&[String]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    pub fn to_pointer(&self) -> JsonPointer {
        JsonPointer::from_path(self)
    }
}

impl Deref for JsonPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for JsonPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for JsonPath {
    fn from(keys: Vec<String>) -> Self {
        Self(keys)
    }
}

impl<'a> IntoIterator for &'a JsonPath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// RFC 6901 pointer in its escaped textual form, e.g. `/paths/~1pets/get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPointer(String);

impl JsonPointer {
    /// Validate and wrap a textual pointer. The empty string addresses the whole document.
    pub fn parse(pointer: &str) -> Result<Self, PointerError> {
        decode_segments(pointer)?;
        Ok(Self(pointer.to_owned()))
    }

    /// Parse a percent-encoded URI fragment (without the leading `#`).
    pub fn from_fragment(fragment: &str) -> Result<Self, PointerError> {
        let decoded = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|_| PointerError::InvalidEncoding(fragment.to_owned()))?;
        Self::parse(&decoded)
    }

    pub fn from_path(path: &JsonPath) -> Self {
        let mut out = String::new();
        for key in path {
            out.push('/');
            for c in key.chars() {
                match c {
                    '~' => out.push_str("~0"),
                    '/' => out.push_str("~1"),
                    other => out.push(other),
                }
            }
        }
        Self(out)
    }

    pub fn to_path(&self) -> JsonPath {
        // Validated on construction.
        decode_segments(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Percent-encoded form suitable for a URI fragment.
    pub fn to_fragment(&self) -> String {
        utf8_percent_encode(&self.0, FRAGMENT).to_string()
    }

    /// Same-document reference string, e.g. `#/components/schemas/Pet`.
    pub fn to_local_ref(&self) -> String {
        format!("#{}", self.to_fragment())
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JsonPointer {
    type Err = PointerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl AsRef<str> for JsonPointer {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn decode_segments(pointer: &str) -> Result<JsonPath, PointerError> {
    if pointer.is_empty() {
        return Ok(JsonPath::root());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PointerError::MissingLeadingSlash(pointer.to_owned()));
    };
    rest.split('/')
        .map(|segment| unescape(segment).ok_or_else(|| PointerError::InvalidEscape(pointer.to_owned())))
        .collect::<Result<Vec<_>, _>>()
        .map(JsonPath::from)
}

fn unescape(segment: &str) -> Option<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[&str]) -> JsonPath {
        keys.iter().copied().collect()
    }

    #[test]
    fn empty_pointer_is_whole_document() {
        let pointer = JsonPointer::parse("").unwrap();
        assert!(pointer.to_path().is_empty());
        assert!(pointer.is_root());
    }

    #[test]
    fn single_slash_addresses_empty_key() {
        let pointer = JsonPointer::parse("/").unwrap();
        assert_eq!(pointer.to_path(), path(&[""]));
    }

    #[test]
    fn rejects_structurally_invalid_pointers() {
        assert!(matches!(
            JsonPointer::parse("foo/bar"),
            Err(PointerError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            JsonPointer::parse("/a~2b"),
            Err(PointerError::InvalidEscape(_))
        ));
        assert!(JsonPointer::parse("/trailing~").is_err());
    }

    #[test]
    fn escapes_reserved_characters() {
        let p = path(&["paths", "/pets/{petId}", "a~b"]);
        let pointer = p.to_pointer();
        assert_eq!(pointer.as_str(), "/paths/~1pets~1{petId}/a~0b");
        assert_eq!(pointer.to_path(), p);
    }

    #[test]
    fn pointer_round_trips_through_path() {
        for raw in ["", "/", "//", "/a/b", "/~0~1/x~01", "/é/ü/空", "/application~1json", "/0/1"] {
            let pointer = JsonPointer::parse(raw).unwrap();
            assert_eq!(pointer.to_path().to_pointer().as_str(), raw);
        }
    }

    #[test]
    fn fragment_round_trips_keys_with_reserved_and_non_ascii_characters() {
        let p = path(&["components", "a/b", "c~d", "100%", "with space", "é#"]);
        let fragment = p.to_pointer().to_fragment();
        assert!(fragment.is_ascii());
        assert!(!fragment.contains(' '));
        assert!(!fragment.contains('#'));
        let decoded = JsonPointer::from_fragment(&fragment).unwrap();
        assert_eq!(decoded.to_path(), p);
    }

    #[test]
    fn local_ref_keeps_common_characters_verbatim() {
        let pointer = JsonPointer::parse("/paths/~1pets~1{petId}/get").unwrap();
        assert_eq!(pointer.to_local_ref(), "#/paths/~1pets~1{petId}/get");
    }

    #[test]
    fn sub_path_checks_prefix() {
        let a = path(&["components", "schemas", "Pet", "properties"]);
        let b = path(&["components", "schemas"]);
        assert!(a.is_sub_path_of(&b));
        assert!(a.is_sub_path_of(&a));
        assert!(!b.is_sub_path_of(&a));
        assert!(!a.is_sub_path_of(&path(&["components", "responses"])));
        assert!(a.is_sub_path_of(&JsonPath::root()));
        assert_eq!(a.tail_after(&b), Some(&["Pet".to_owned(), "properties".to_owned()][..]));
    }
}
