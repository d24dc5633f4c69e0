//! Originating client IP resolution from proxy headers.
//!
//! These headers are trivially spoofable. Only consult them when an operator
//! has declared that a trusted proxy sits in front of the server.

use crate::model::HeaderList;

/// Single-value headers, checked in order after `X-Forwarded-For`.
const DIRECT_HEADERS: &[&str] = &["x-real-ip", "x-client-ip", "true-client-ip"];

/// CDN-specific headers, checked after [`DIRECT_HEADERS`].
const CDN_HEADERS: &[&str] = &["cf-connecting-ip", "fastly-client-ip"];

/// Returns the first non-empty entry of a comma-separated address list.
fn first_listed(value: &str) -> Option<String> {
    value
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_present(headers: &HeaderList, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| headers.get(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Host part of a `Forwarded` node: `"[2001:db8::1]:4711"` -> `2001:db8::1`,
/// `192.0.2.60:8080` -> `192.0.2.60`. Bare IPv6 is returned unchanged.
fn node_host(value: &str) -> Option<&str> {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .trim();

    let host = match value.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None if value.matches(':').count() == 1 => value.split(':').next().unwrap_or(value),
        None => value,
    };

    Some(host.trim()).filter(|h| !h.is_empty())
}

/// Extracts the `for=` node from an RFC 7239 `Forwarded` header.
///
/// Elements are comma separated and pairs within an element are `;`
/// separated. The first element carrying a usable `for` pair wins.
fn forwarded_for(value: &str) -> Option<String> {
    value.split(',').find_map(|element| {
        element.split(';').find_map(|pair| {
            let (token, value) = pair.split_once('=')?;
            if !token.trim().eq_ignore_ascii_case("for") {
                return None;
            }
            node_host(value.trim()).map(str::to_string)
        })
    })
}

/// Derives the originating client IP from proxy headers.
///
/// Precedence, first match wins:
/// 1. `X-Forwarded-For` (first listed address)
/// 2. `X-Real-IP`, `X-Client-IP`, `True-Client-IP`
/// 3. `CF-Connecting-IP`, `Fastly-Client-IP`
/// 4. `Forwarded` (`for=` parameter)
/// 5. `X-Vercel-Forwarded-For` (first listed address)
pub fn determine_client_ip(headers: &HeaderList) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(first_listed)
        .or_else(|| first_present(headers, DIRECT_HEADERS))
        .or_else(|| first_present(headers, CDN_HEADERS))
        .or_else(|| headers.get("forwarded").and_then(forwarded_for))
        .or_else(|| {
            headers
                .get("x-vercel-forwarded-for")
                .and_then(first_listed)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderList {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_forwarded_for_wins_over_real_ip() {
        let h = headers(&[
            ("x-real-ip", "198.51.100.1"),
            ("x-forwarded-for", "203.0.113.1"),
        ]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("203.0.113.1"));
    }

    #[test]
    fn test_forwarded_for_takes_first_non_empty() {
        let h = headers(&[("X-Forwarded-For", " , 203.0.113.7, 10.0.0.1")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let h = headers(&[("x-forwarded-for", " , "), ("x-client-ip", "198.51.100.9")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn test_direct_header_order() {
        let h = headers(&[
            ("true-client-ip", "192.0.2.3"),
            ("x-client-ip", "192.0.2.2"),
        ]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("192.0.2.2"));
    }

    #[test]
    fn test_cdn_headers() {
        let h = headers(&[
            ("fastly-client-ip", "192.0.2.20"),
            ("CF-Connecting-IP", "192.0.2.10"),
        ]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("192.0.2.10"));
    }

    #[test]
    fn test_forwarded_header() {
        let h = headers(&[("forwarded", "for=203.0.113.1;proto=https")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("203.0.113.1"));

        let h = headers(&[("Forwarded", "proto=http;by=10.0.0.1, For=\"[2001:db8::17]\"")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("2001:db8::17"));

        let h = headers(&[("forwarded", "proto=https;for=\"198.51.100.4\"")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_forwarded_node_ports_are_dropped() {
        let h = headers(&[("forwarded", "for=\"[2001:db8:cafe::17]:4711\"")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("2001:db8:cafe::17"));

        let h = headers(&[("forwarded", "for=\"192.0.2.43:47011\";proto=http")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("192.0.2.43"));
    }

    #[test]
    fn test_forwarded_skips_elements_without_for() {
        let h = headers(&[("forwarded", "by=10.0.0.1;proto=http, for=\"\", for=192.0.2.60")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("192.0.2.60"));
    }

    #[test]
    fn test_vercel_header_is_last_resort() {
        let h = headers(&[("x-vercel-forwarded-for", "203.0.113.50, 10.0.0.2")]);
        assert_eq!(determine_client_ip(&h).as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn test_no_relevant_headers() {
        let h = headers(&[("content-type", "text/plain")]);
        assert_eq!(determine_client_ip(&h), None);
        assert_eq!(determine_client_ip(&HeaderList::new()), None);
    }
}
