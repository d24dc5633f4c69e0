//! Typed live events and their wire envelope.
//!
//! Every event serializes to one flat JSON object tagged by `type`:
//!
//! ```text
//! {"type":"request.received","token":"<tokenId>","request":{...}}
//! {"type":"token.cleared"}
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::CapturedRequest;

/// Token fields carried by `token.created`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreatedInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Token fields carried by `token.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRef {
    pub id: String,
}

/// Token fields carried by `token.response.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponseInfo {
    pub id: String,
    pub response_enabled: bool,
    pub response_status: u16,
}

/// A live event published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A request was captured and stored.
    #[serde(rename = "request.received")]
    RequestReceived {
        token: String,
        request: Box<CapturedRequest>,
    },

    /// A single request was deleted.
    #[serde(rename = "request.deleted", rename_all = "camelCase")]
    RequestDeleted { token: String, request_id: String },

    /// All requests of a token were deleted.
    #[serde(rename = "request.cleared")]
    RequestCleared { token: String },

    /// A token was created. Session channel only.
    #[serde(rename = "token.created")]
    TokenCreated { token: TokenCreatedInfo },

    /// A token was deleted. Session channel only.
    #[serde(rename = "token.deleted")]
    TokenDeleted { token: TokenRef },

    /// All tokens of a session were deleted. Session channel only.
    #[serde(rename = "token.cleared")]
    TokenCleared {},

    /// A token's custom response settings changed. Session channel only.
    #[serde(rename = "token.response.updated")]
    TokenResponseUpdated { token: TokenResponseInfo },
}

impl Event {
    /// Builds a `request.received` event for a stored request.
    pub fn request_received(request: CapturedRequest) -> Self {
        Event::RequestReceived {
            token: request.token_id.clone(),
            request: Box::new(request),
        }
    }

    /// Returns the wire `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RequestReceived { .. } => "request.received",
            Event::RequestDeleted { .. } => "request.deleted",
            Event::RequestCleared { .. } => "request.cleared",
            Event::TokenCreated { .. } => "token.created",
            Event::TokenDeleted { .. } => "token.deleted",
            Event::TokenCleared {} => "token.cleared",
            Event::TokenResponseUpdated { .. } => "token.response.updated",
        }
    }

    /// Returns the token channel key, if this event is routed to one.
    ///
    /// Only events whose `token` field is a non-empty token id qualify;
    /// token lifecycle events carry an object there and stay on the
    /// session channel.
    pub fn token_channel(&self) -> Option<&str> {
        let token = match self {
            Event::RequestReceived { token, .. }
            | Event::RequestDeleted { token, .. }
            | Event::RequestCleared { token } => token.as_str(),
            _ => return None,
        };
        (!token.is_empty()).then_some(token)
    }

    /// Serializes the session channel envelope.
    pub fn session_envelope(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serializes the token channel envelope, which always names its token.
    pub fn token_envelope(&self, token: &str) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            if !map.get("token").is_some_and(Value::is_string) {
                map.insert("token".to_string(), Value::String(token.to_string()));
            }
        }
        serde_json::to_string(&value)
    }
}
