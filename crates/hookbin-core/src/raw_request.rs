//! Raw HTTP request text parsing and rendering.
//!
//! Parses the "paste a raw request" format:
//!
//! ```text
//! POST /hook?x=1 HTTP/1.1
//! Content-Type: application/json
//!
//! {"a":1}
//! ```
//!
//! Input must be CRLF-delimited; use [`normalize_line_endings`] on
//! user-supplied text first.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::model::HeaderList;

static REQUEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)\s+HTTP/[\d.]+$").expect("valid request line regex"));

static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):\s*(.*)$").expect("valid header line regex"));

/// Raw request text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRequest {
    /// The input had no request line at all.
    #[error("missing request line")]
    MissingRequestLine,

    /// The first line was not `METHOD target HTTP/x.y`.
    #[error("malformed request line: {0:?} (expected `METHOD target HTTP/1.1`)")]
    InvalidRequestLine(String),
}

/// A request parsed from raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    /// Request target, absolute or origin form, unmodified.
    pub url: String,
    /// Headers with lowercased names.
    pub headers: HeaderList,
    pub body: String,
}

/// Parses CRLF-delimited raw HTTP request text.
pub fn parse_raw_request(text: &str) -> Result<ParsedRequest, MalformedRequest> {
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or(MalformedRequest::MissingRequestLine)?;

    let caps = REQUEST_LINE
        .captures(request_line)
        .ok_or_else(|| MalformedRequest::InvalidRequestLine(request_line.to_string()))?;
    let method = caps[1].to_string();
    let url = caps[2].to_string();

    let mut headers = HeaderList::new();
    let mut body_lines: Option<Vec<&str>> = None;

    for line in lines.by_ref() {
        if line.is_empty() {
            body_lines = Some(Vec::new());
            break;
        }
        if let Some(caps) = HEADER_LINE.captures(line) {
            headers.insert(caps[1].trim().to_lowercase(), caps[2].trim());
        }
    }

    let body = match body_lines {
        Some(mut rest) => {
            rest.extend(lines);
            rest.join("\r\n")
        }
        None => String::new(),
    };

    Ok(ParsedRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Converts bare LF and CR line endings into CRLF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// Capitalizes a header name canonically (`x-request-id` -> `X-Request-Id`).
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Renders a request back into raw HTTP/1.1 text.
///
/// Header names are capitalized canonically regardless of how they were
/// captured. `body` is `None` when the body should be left out (for example
/// when it is binary).
pub fn render_raw_request(
    method: &str,
    url: &str,
    headers: &HeaderList,
    body: Option<&str>,
) -> String {
    let mut out = format!("{} {} HTTP/1.1\r\n", method, url);
    for (name, value) in headers.iter() {
        out.push_str(&canonical_header_name(name));
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    if let Some(body) = body {
        out.push_str(body);
    }
    out
}
