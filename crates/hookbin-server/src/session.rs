//! Session identification for API calls.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session: Option<String>,
}

/// The calling session, verified to exist.
///
/// Read from the `X-Session-Id` header, or the `session` query parameter for
/// clients such as `EventSource` that cannot set headers. Extraction marks the
/// session as active.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

impl FromRequestParts<AppState> for SessionId {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());

        let id = match from_header {
            Some(id) => Some(id),
            None => Query::<SessionQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.session),
        }
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::Unauthorized)?;

        if !state.db.touch_session(&id)? {
            debug!(session = %id, "Unknown session");
            return Err(ApiError::Unauthorized);
        }

        Ok(SessionId(id))
    }
}
