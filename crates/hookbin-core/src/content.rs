//! Content type lookup and binary detection.
//!
//! Two policies exist:
//!
//! - [`classify_binary`] runs on every captured request and only looks at the
//!   declared type and for NUL bytes in the first [`SNIFF_LEN`] bytes.
//! - [`classify_binary_strict`] runs when a body is opened for display and
//!   also checks control characters and UTF-8 validity.

use crate::model::HeaderList;

/// Content type recorded when a request declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Number of leading body bytes inspected by the classifiers.
pub const SNIFF_LEN: usize = 8000;

/// Disallowed control characters tolerated by the strict classifier.
const MAX_CONTROL_CHARS: usize = 2;

/// Exact content types that are always binary.
const BINARY_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
];

/// Content type prefixes that are always binary.
const BINARY_PREFIXES: &[&str] = &["image/", "video/", "audio/"];

/// Substrings marking a declared type as text.
const TEXTISH_MARKERS: &[&str] = &["json", "xml", "html", "form-urlencoded"];

/// Returns the `Content-Type` header value, looked up case-insensitively.
pub fn extract_content_type(headers: &HeaderList) -> Option<&str> {
    headers.get("content-type")
}

/// Returns the declared content type or [`DEFAULT_CONTENT_TYPE`].
pub fn resolve_content_type(headers: &HeaderList) -> String {
    extract_content_type(headers)
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Strips parameters and lowercases a content type (`Text/HTML; charset=x` -> `text/html`).
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Returns true if the declared type belongs to a known-binary family.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let essence = essence(content_type);
    BINARY_TYPES.contains(&essence.as_str())
        || BINARY_PREFIXES.iter().any(|p| essence.starts_with(p))
}

/// Returns true if the declared type is textual (`text/*`, JSON, XML, HTML, forms).
pub fn is_textish_content_type(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.starts_with("text/") || TEXTISH_MARKERS.iter().any(|m| essence.contains(m))
}

fn sniff_window(body: &[u8]) -> &[u8] {
    &body[..body.len().min(SNIFF_LEN)]
}

/// Fast binary check used at ingestion.
///
/// An empty or missing body is never binary. A known-binary declared type
/// wins over content; otherwise a NUL byte in the sniff window marks the
/// body as binary.
pub fn classify_binary(body: Option<&[u8]>, declared_content_type: Option<&str>) -> bool {
    let body = match body {
        Some(b) if !b.is_empty() => b,
        _ => return false,
    };

    if declared_content_type.is_some_and(is_binary_content_type) {
        return true;
    }

    sniff_window(body).contains(&0)
}

/// Stricter binary check used before rendering a body as text.
pub fn classify_binary_strict(body: Option<&[u8]>, declared_content_type: Option<&str>) -> bool {
    let body = match body {
        Some(b) if !b.is_empty() => b,
        _ => return false,
    };

    if declared_content_type.is_some_and(is_binary_content_type) {
        return true;
    }

    let window = sniff_window(body);
    if window.contains(&0) {
        return true;
    }

    let control_chars = window
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    if control_chars > MAX_CONTROL_CHARS {
        return true;
    }

    let text = match std::str::from_utf8(window) {
        Ok(text) => text,
        // A multi-byte character cut off by the sniff window is not a decode failure.
        Err(e) if e.error_len().is_none() && window.len() < body.len() => {
            match std::str::from_utf8(&window[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return true,
            }
        }
        Err(_) => return true,
    };

    if text.contains('\u{FFFD}') {
        return true;
    }

    if control_chars > 0 {
        return !declared_content_type.is_some_and(is_textish_content_type);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_binary_types_short_circuit() {
        for ct in [
            "image/png",
            "application/pdf",
            "application/zip",
            "application/octet-stream",
            "video/mp4",
            "audio/ogg; codecs=opus",
        ] {
            assert!(classify_binary(Some(b"A"), Some(ct)), "{ct}");
            assert!(classify_binary(Some(b"plain text"), Some(ct)), "{ct}");
        }
    }

    #[test]
    fn test_empty_body_is_never_binary() {
        assert!(!classify_binary(Some(&[]), Some("image/png")));
        assert!(!classify_binary(None, Some("application/pdf")));
        assert!(!classify_binary_strict(Some(&[]), Some("image/png")));
        assert!(classify_binary(Some(&[0x41]), Some("image/png")));
    }

    #[test]
    fn test_nul_byte_detection() {
        assert!(classify_binary(Some(&[0x00, 0x41]), None));
        assert!(!classify_binary(Some(&[0x41, 0x42]), None));
        assert!(!classify_binary(Some(b"{\"a\":1}"), Some("application/json")));
    }

    #[test]
    fn test_nul_beyond_sniff_window_is_ignored() {
        let mut body = vec![b'a'; SNIFF_LEN];
        body.push(0);
        assert!(!classify_binary(Some(&body), None));
    }

    #[test]
    fn test_fast_path_ignores_control_chars() {
        let body = [0x01, 0x02, 0x03, b'a'];
        assert!(!classify_binary(Some(&body), Some("text/plain")));
        assert!(classify_binary_strict(Some(&body), Some("text/plain")));
    }

    #[test]
    fn test_strict_rejects_invalid_utf8() {
        let body = [0xff, 0xfe, b'a', b'b'];
        assert!(!classify_binary(Some(&body), None));
        assert!(classify_binary_strict(Some(&body), None));
    }

    #[test]
    fn test_strict_rejects_replacement_character() {
        let body = "broken \u{FFFD} text".as_bytes();
        assert!(classify_binary_strict(Some(body), Some("text/plain")));
    }

    #[test]
    fn test_strict_few_control_chars_depend_on_declared_type() {
        let body = b"line one\x1bline two";
        assert!(!classify_binary_strict(Some(body), Some("application/json")));
        assert!(!classify_binary_strict(Some(body), Some("text/plain; charset=utf-8")));
        assert!(classify_binary_strict(Some(body), Some("application/x-custom")));
        assert!(classify_binary_strict(Some(body), None));
    }

    #[test]
    fn test_strict_control_char_limit_boundary() {
        let two = b"a\x01b\x02c";
        assert!(!classify_binary_strict(Some(two), Some("text/plain")));
        assert!(!classify_binary_strict(Some(two), Some("application/xml")));
        assert!(classify_binary_strict(Some(two), Some("application/x-protobuf")));

        let three = b"a\x01b\x02c\x03";
        assert!(classify_binary_strict(Some(three), Some("text/plain")));
    }

    #[test]
    fn test_undeclared_body_with_resolved_default_is_binary() {
        let headers = HeaderList::new();
        let resolved = resolve_content_type(&headers);
        assert!(classify_binary(Some(b"hello"), Some(&resolved)));
        assert!(!classify_binary(Some(b"hello"), extract_content_type(&headers)));
    }

    #[test]
    fn test_strict_accepts_plain_text() {
        let body = "héllo\tworld\r\n".as_bytes();
        assert!(!classify_binary_strict(Some(body), None));
    }

    #[test]
    fn test_strict_tolerates_split_multibyte_at_window_edge() {
        let mut body = vec![b'a'; SNIFF_LEN - 1];
        body.extend_from_slice("é".as_bytes());
        assert!(!classify_binary_strict(Some(&body), Some("text/plain")));
    }

    #[test]
    fn test_extract_content_type() {
        let headers: HeaderList = vec![("Content-Type", "application/json")]
            .into_iter()
            .collect();
        assert_eq!(extract_content_type(&headers), Some("application/json"));
        assert_eq!(resolve_content_type(&headers), "application/json");

        let empty = HeaderList::new();
        assert_eq!(extract_content_type(&empty), None);
        assert_eq!(resolve_content_type(&empty), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_textish_types() {
        assert!(is_textish_content_type("text/csv"));
        assert!(is_textish_content_type("application/vnd.api+json"));
        assert!(is_textish_content_type("application/x-www-form-urlencoded"));
        assert!(!is_textish_content_type("application/x-protobuf"));
    }
}
