//! Data models for storage.

use chrono::{DateTime, Utc};
use hookbin_core::HeaderList;
use serde::{Deserialize, Serialize};

/// Status returned to webhook senders when no custom status is set.
pub const DEFAULT_RESPONSE_STATUS: u16 = 200;

/// A client session that owns tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Last time the session made an API call.
    pub last_seen_at: DateTime<Utc>,
}

/// Custom response returned by `/payload/{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// When false, the default acknowledgement is returned instead.
    pub enabled: bool,
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderList,
    #[serde(default)]
    pub body: String,
}

impl Default for TokenResponse {
    fn default() -> Self {
        Self {
            enabled: false,
            status: DEFAULT_RESPONSE_STATUS,
            headers: HeaderList::new(),
            body: String::new(),
        }
    }
}

/// A webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub response: TokenResponse,
}

/// Token listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub request_count: i64,
    pub response_enabled: bool,
    pub response_status: u16,
}

/// Parameters for storing a captured request.
///
/// The id, body reference, length and timestamp are assigned by storage.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub session_id: String,
    pub token_id: String,
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    pub content_type: String,
    pub is_binary: bool,
    pub client_ip: String,
    pub remote_ip: String,
}

/// Counts removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub requests_deleted: usize,
    pub sessions_deleted: usize,
}
