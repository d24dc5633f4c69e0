//! Live webhook capture on `/payload/{token}`.

use std::collections::HashMap;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookbin_core::HeaderList;
use hookbin_storage::TokenResponse;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::handlers::peer_ip;
use crate::ingest::IngestRequest;
use crate::models::CaptureAck;
use crate::state::AppState;

/// ANY /payload/{token}[/{*path}] - Record the request for the token.
///
/// Replies with the token's custom response when one is enabled, otherwise
/// with `{"ok": true, "requestId": ...}`.
pub async fn capture(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Result<Response> {
    let token_id = params
        .get("token")
        .ok_or_else(|| ApiError::BadRequest("missing token".to_string()))?;

    let token = state
        .db
        .get_token(token_id)?
        .ok_or_else(|| ApiError::NotFound(format!("token {}", token_id)))?;

    let max_body = state.config.max_body_bytes;
    let declared_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > max_body) {
        return Err(ApiError::PayloadTooLarge(max_body));
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(max_body))?;

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let record = state.ingest.ingest(IngestRequest {
        session_id: token.session_id.clone(),
        token_id: token.id.clone(),
        method: parts.method.as_str().to_string(),
        url,
        headers: header_list(&parts.headers),
        body: body.to_vec(),
        fallback_client_ip: peer_ip(&parts.extensions),
        override_client_ip: None,
        override_remote_ip: None,
    })?;

    if token.response.enabled {
        debug!(token_id = %token.id, status = token.response.status, "Custom response");
        return Ok(custom_response(&token.response));
    }

    Ok(Json(CaptureAck {
        ok: true,
        request_id: record.id,
    })
    .into_response())
}

/// Copies transport headers in arrival order. Repeated names are joined.
fn header_list(headers: &HeaderMap) -> HeaderList {
    let mut list = HeaderList::new();
    for (name, value) in headers {
        list.append(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    list
}

fn custom_response(configured: &TokenResponse) -> Response {
    let status = StatusCode::from_u16(configured.status).unwrap_or(StatusCode::OK);

    let mut response = (status, configured.body.clone()).into_response();
    for (name, value) in configured.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid custom response header"),
        }
    }
    response
}
