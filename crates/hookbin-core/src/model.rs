//! Shared data models for captured requests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered header bag.
///
/// Serializes as a JSON object with keys in insertion order. Lookups through
/// [`HeaderList::get`] are case-insensitive; the stored names keep whatever
/// case the caller supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets a header, replacing the value of an entry with the same name.
    ///
    /// The entry keeps its original position when replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Adds a header, joining repeated names with `", "`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                entry.1.push_str(", ");
                entry.1.push_str(&value);
            }
            None => self.0.push((name, value)),
        }
    }

    /// Returns the first value whose name matches case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderList::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderListVisitor;

        impl<'de> Visitor<'de> for HeaderListVisitor {
            type Value = HeaderList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = HeaderList::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    headers.insert(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeaderListVisitor)
    }
}

/// The canonical record of one captured HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    /// Unique identifier, never reused.
    pub id: String,
    /// Owning token.
    pub token_id: String,
    /// Session that owns the token.
    pub session_id: String,
    /// Uppercase HTTP verb (not validated against a fixed set).
    pub method: String,
    /// Absolute URL or path+query, exactly as received.
    pub url: String,
    pub headers: HeaderList,
    pub content_type: String,
    /// Body length in bytes.
    pub content_length: u64,
    pub is_binary: bool,
    pub client_ip: String,
    pub remote_ip: String,
    /// Relative path of the stored body, `None` when there is no body.
    pub body_storage_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CapturedRequest {
    /// Returns true if the request carried a body.
    pub fn has_body(&self) -> bool {
        self.content_length > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderList::new();
        headers.insert("Content-Type", "text/plain");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.get("accept").is_none());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut headers = HeaderList::new();
        headers.insert("a", "1");
        headers.insert("b", "2");
        headers.insert("a", "3");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_append_joins_repeated_names() {
        let mut headers = HeaderList::new();
        headers.append("accept", "text/html");
        headers.append("accept", "application/json");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("accept"), Some("text/html, application/json"));
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let headers: HeaderList = vec![("zeta", "1"), ("Alpha", "2"), ("mid", "3")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"zeta":"1","Alpha":"2","mid":"3"}"#);

        let back: HeaderList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, headers);
    }

    #[test]
    fn test_captured_request_uses_camel_case() {
        let request = CapturedRequest {
            id: "r1".to_string(),
            token_id: "t1".to_string(),
            session_id: "s1".to_string(),
            method: "GET".to_string(),
            url: "/hook".to_string(),
            headers: HeaderList::new(),
            content_type: "application/octet-stream".to_string(),
            content_length: 0,
            is_binary: false,
            client_ip: "127.0.0.1".to_string(),
            remote_ip: "127.0.0.1".to_string(),
            body_storage_ref: None,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tokenId"], "t1");
        assert_eq!(value["contentLength"], 0);
        assert!(value["bodyStorageRef"].is_null());
        assert!(value["createdAt"].is_string());
        assert!(!request.has_body());
    }
}
