//! Call metadata (headers and trailers exchanged with the RPC engine).

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Multi-valued, case-insensitive key/value bag.
///
/// Keys are normalized to lowercase on insert; values keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values under `key` with a single one.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), vec![value.into()]);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Merge every value from `other`, preserving order.
    pub fn extend(&mut self, other: Metadata) {
        for (key, values) in other.entries {
            self.entries.entry(key).or_default().extend(values);
        }
    }

    /// Write every entry into `headers` as `{prefix}{key}`.
    ///
    /// Entries whose name or value is not a legal HTTP header are skipped.
    pub fn write_headers(&self, headers: &mut HeaderMap, prefix: &str) {
        for (key, value) in self.iter() {
            let name = match HeaderName::from_bytes(format!("{prefix}{key}").as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    tracing::debug!(key = %key, "Dropping metadata with invalid header name");
                    continue;
                }
            };
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name, value);
                }
                Err(_) => tracing::debug!(key = %key, "Dropping metadata with invalid header value"),
            }
        }
    }

    /// Collect the headers for which `select` returns a metadata key.
    pub fn from_headers<F>(headers: &HeaderMap, mut select: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut metadata = Metadata::new();
        for (name, value) in headers {
            let Some(key) = select(name.as_str()) else {
                continue;
            };
            if let Ok(value) = value.to_str() {
                metadata.append(key, value);
            }
        }
        metadata
    }
}
