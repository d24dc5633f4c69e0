//! API route handlers.

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, Extensions, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use tracing::{debug, info};

use hookbin_core::{
    classify_binary_strict, extract_content_type, normalize_line_endings, parse_raw_request,
    render_raw_request, CapturedRequest, ChannelKind, Event, TokenCreatedInfo, TokenRef,
    TokenResponseInfo, DEFAULT_CONTENT_TYPE,
};
use hookbin_storage::{Token, TokenResponse};

use crate::error::{ApiError, Result};
use crate::ingest::IngestRequest;
use crate::models::{
    BodyPreview, BodyQuery, DeletedResponse, HealthResponse, ManualIngest, RequestsQuery,
    RequestsResponse, SessionResponse, TokensResponse, UpdateResponseRequest, MAX_LIMIT,
};
use crate::session::SessionId;
use crate::state::AppState;

/// Stand-in peer address when the connection info is unavailable.
pub(crate) const UNKNOWN_PEER: &str = "unknown";

/// Peer IP of the current connection.
pub(crate) fn peer_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_PEER.to_string())
}

/// Looks up a token owned by `session`. Foreign tokens are reported as missing.
fn owned_token(state: &AppState, session: &str, token_id: &str) -> Result<Token> {
    state
        .db
        .get_token(token_id)?
        .filter(|t| t.session_id == session)
        .ok_or_else(|| ApiError::NotFound(format!("token {}", token_id)))
}

/// Looks up a request belonging to `token`.
fn token_request(state: &AppState, token: &Token, request_id: &str) -> Result<CapturedRequest> {
    state
        .db
        .get_request(request_id)?
        .filter(|r| r.token_id == token.id)
        .ok_or_else(|| ApiError::NotFound(format!("request {}", request_id)))
}

/// GET /health - Liveness and live channel counts.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_session_channels: state.fanout.active_channels(ChannelKind::Session).len(),
        active_token_channels: state.fanout.active_channels(ChannelKind::Token).len(),
    })
}

// === Sessions ===

/// POST /api/session - Create a session.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let session = state.db.create_session()?;
    info!(session = %session.id, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            id: session.id,
            created_at: session.created_at,
        }),
    ))
}

// === Tokens ===

/// GET /api/tokens - List the session's tokens.
pub async fn list_tokens(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<Json<TokensResponse>> {
    let tokens = state.db.list_tokens(&session)?;
    Ok(Json(TokensResponse { tokens }))
}

/// POST /api/tokens - Create a token.
pub async fn create_token(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<(StatusCode, Json<Token>)> {
    let token = state.db.create_token(&session)?;
    info!(session = %session, token_id = %token.id, "Token created");

    state.fanout.publish(
        &session,
        &Event::TokenCreated {
            token: TokenCreatedInfo {
                id: token.id.clone(),
                created_at: token.created_at,
            },
        },
    );

    Ok((StatusCode::CREATED, Json(token)))
}

/// DELETE /api/tokens - Delete all of the session's tokens.
pub async fn clear_tokens(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<Json<DeletedResponse>> {
    let deleted = state.db.delete_session_tokens(&session)?;
    info!(session = %session, count = deleted.len(), "Tokens cleared");

    state.fanout.publish(&session, &Event::TokenCleared {});

    Ok(Json(DeletedResponse {
        deleted: deleted.len(),
    }))
}

/// GET /api/tokens/{token} - Token details.
pub async fn get_token(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
) -> Result<Json<Token>> {
    owned_token(&state, &session, &token_id).map(Json)
}

/// DELETE /api/tokens/{token} - Delete a token with its requests.
pub async fn delete_token(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
) -> Result<StatusCode> {
    let token = owned_token(&state, &session, &token_id)?;
    state.db.delete_token(&token.id)?;
    info!(token_id = %token.id, "Token deleted");

    state.fanout.publish(
        &session,
        &Event::TokenDeleted {
            token: TokenRef { id: token.id },
        },
    );

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/tokens/{token}/response - Configure the custom response.
pub async fn update_token_response(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
    Json(req): Json<UpdateResponseRequest>,
) -> Result<Json<Token>> {
    if !(100..=599).contains(&req.status) {
        return Err(ApiError::BadRequest(format!(
            "status must be between 100 and 599, got {}",
            req.status
        )));
    }

    let mut token = owned_token(&state, &session, &token_id)?;
    token.response = TokenResponse {
        enabled: req.enabled,
        status: req.status,
        headers: req.headers,
        body: req.body,
    };

    if !state.db.update_token_response(&token.id, &token.response)? {
        return Err(ApiError::NotFound(format!("token {}", token_id)));
    }
    debug!(token_id = %token.id, enabled = req.enabled, status = req.status, "Response updated");

    state.fanout.publish(
        &session,
        &Event::TokenResponseUpdated {
            token: TokenResponseInfo {
                id: token.id.clone(),
                response_enabled: token.response.enabled,
                response_status: token.response.status,
            },
        },
    );

    Ok(Json(token))
}

// === Requests ===

/// GET /api/tokens/{token}/requests - List captured requests, newest first.
pub async fn list_requests(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<RequestsResponse>> {
    let token = owned_token(&state, &session, &token_id)?;
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let offset = query.offset.max(0);

    let requests = state.db.list_requests(&token.id, limit, offset)?;
    let total = state.db.count_requests(&token.id)?;

    Ok(Json(RequestsResponse { requests, total }))
}

/// POST /api/tokens/{token}/requests - Store a pasted or structured request.
pub async fn ingest_request(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
    extensions: Extensions,
    Json(req): Json<ManualIngest>,
) -> Result<(StatusCode, Json<CapturedRequest>)> {
    let token = owned_token(&state, &session, &token_id)?;
    let fallback_client_ip = peer_ip(&extensions);

    let ingest = match req {
        ManualIngest::Raw(raw) => {
            let parsed = parse_raw_request(&normalize_line_endings(&raw.raw))?;
            IngestRequest {
                session_id: session,
                token_id: token.id,
                method: parsed.method,
                url: parsed.url,
                headers: parsed.headers,
                body: parsed.body.into_bytes(),
                fallback_client_ip,
                override_client_ip: raw.client_ip,
                override_remote_ip: raw.remote_ip,
            }
        }
        ManualIngest::Structured(s) => {
            if s.method.trim().is_empty() {
                return Err(ApiError::BadRequest("method must not be empty".to_string()));
            }
            IngestRequest {
                session_id: session,
                token_id: token.id,
                method: s.method,
                url: s.url,
                headers: s.headers,
                body: s.body.into_bytes(),
                fallback_client_ip,
                override_client_ip: s.client_ip,
                override_remote_ip: s.remote_ip,
            }
        }
    };

    let record = state.ingest.ingest(ingest)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// DELETE /api/tokens/{token}/requests - Delete all requests of a token.
pub async fn clear_requests(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    let token = owned_token(&state, &session, &token_id)?;
    let deleted = state.db.clear_requests(&token.id)?;
    info!(token_id = %token.id, count = deleted, "Requests cleared");

    state
        .fanout
        .publish(&session, &Event::RequestCleared { token: token.id });

    Ok(Json(DeletedResponse { deleted }))
}

/// GET /api/tokens/{token}/requests/{id} - A single captured request.
pub async fn get_request(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path((token_id, request_id)): Path<(String, String)>,
) -> Result<Json<CapturedRequest>> {
    let token = owned_token(&state, &session, &token_id)?;
    token_request(&state, &token, &request_id).map(Json)
}

/// DELETE /api/tokens/{token}/requests/{id} - Delete a captured request.
pub async fn delete_request(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path((token_id, request_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let token = owned_token(&state, &session, &token_id)?;
    let request = token_request(&state, &token, &request_id)?;
    state.db.delete_request(&request)?;

    state.fanout.publish(
        &session,
        &Event::RequestDeleted {
            token: token.id,
            request_id: request.id,
        },
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tokens/{token}/requests/{id}/body - Stored body bytes or a preview.
pub async fn get_request_body(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path((token_id, request_id)): Path<(String, String)>,
    Query(query): Query<BodyQuery>,
) -> Result<Response> {
    let token = owned_token(&state, &session, &token_id)?;
    let request = token_request(&state, &token, &request_id)?;
    let body = state.db.read_body(&request)?.unwrap_or_default();

    if query.format.as_deref() == Some("preview") {
        let is_binary =
            classify_binary_strict(Some(body.as_slice()), extract_content_type(&request.headers));
        let text = (!is_binary).then(|| String::from_utf8_lossy(&body).into_owned());

        return Ok(Json(BodyPreview {
            is_binary,
            content_type: request.content_type,
            content_length: request.content_length,
            text,
        })
        .into_response());
    }

    let content_type = HeaderValue::from_str(&request.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// GET /api/tokens/{token}/requests/{id}/raw - Reconstructed raw HTTP text.
///
/// Binary bodies are left out.
pub async fn get_request_raw(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path((token_id, request_id)): Path<(String, String)>,
) -> Result<Response> {
    let token = owned_token(&state, &session, &token_id)?;
    let request = token_request(&state, &token, &request_id)?;
    let body = state.db.read_body(&request)?;

    let text = body
        .as_deref()
        .filter(|b| !classify_binary_strict(Some(*b), extract_content_type(&request.headers)))
        .map(String::from_utf8_lossy);

    let raw = render_raw_request(
        &request.method,
        &request.url,
        &request.headers,
        text.as_deref(),
    );

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        raw,
    )
        .into_response())
}
