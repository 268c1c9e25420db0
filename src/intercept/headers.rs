//! Header capture and normalization.
//!
//! HTTP permits repeated header names (`Set-Cookie`, `Via`, ...). Headers are
//! therefore captured as an ordered list of pairs and only grouped by name
//! when a multimap is needed for serialization.

use axum::http::HeaderMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Ordered `(name, value)` pairs, duplicates preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// All values recorded for `name`, in capture order (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Group by name, keeping the encounter order of names and values.
    pub fn to_multimap(&self) -> HeaderMultiMap {
        let mut map = HeaderMultiMap::default();
        for (name, value) in &self.0 {
            map.insert(name, value);
        }
        map
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }
}

/// Name → all values, serialized as a JSON object of string arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultiMap {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl HeaderMultiMap {
    fn insert(&mut self, name: &str, value: &str) {
        match self.index.get(name) {
            Some(&slot) => self.entries[slot].1.push(value.to_string()),
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), vec![value.to_string()]));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.index.get(name).map(|&slot| self.entries[slot].1.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for HeaderMultiMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Captures header sets from the host runtime.
pub struct HeaderCollector;

impl HeaderCollector {
    /// Capture from a segmented source.
    ///
    /// Every segment is walked to the end; entries without a value are skipped.
    pub fn capture<S, I, N, V>(segments: S) -> HeaderList
    where
        S: IntoIterator<Item = I>,
        I: IntoIterator<Item = (N, Option<V>)>,
        N: Into<String>,
        V: Into<String>,
    {
        segments
            .into_iter()
            .flatten()
            .filter_map(|(name, value)| value.map(|v| (name.into(), v.into())))
            .collect()
    }

    /// Capture from a hyper/axum header map.
    ///
    /// Values that are not valid UTF-8 are converted lossily rather than dropped.
    pub fn from_header_map(headers: &HeaderMap) -> HeaderList {
        Self::capture(std::iter::once(headers.iter().map(|(name, value)| {
            (
                name.as_str().to_string(),
                Some(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })))
    }
}
