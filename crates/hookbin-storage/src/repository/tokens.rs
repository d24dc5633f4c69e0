//! Tokens repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, parse_datetime};
use crate::error::Result;
use crate::models::{Token, TokenResponse, TokenSummary, DEFAULT_RESPONSE_STATUS};

const TOKEN_COLUMNS: &str = "id, session_id, created_at, response_enabled, response_status, response_headers, response_body";

/// Repository for token operations.
pub struct TokensRepo;

impl TokensRepo {
    /// Insert a new token.
    pub fn insert(conn: &Connection, token: &Token) -> Result<()> {
        let headers_json = serde_json::to_string(&token.response.headers)?;

        conn.execute(
            "INSERT INTO tokens (id, session_id, created_at, response_enabled, response_status, response_headers, response_body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.session_id,
                format_datetime(token.created_at),
                token.response.enabled as i32,
                token.response.status,
                headers_json,
                token.response.body,
            ],
        )?;
        Ok(())
    }

    /// Get a token by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Token>> {
        let token = conn
            .query_row(
                &format!("SELECT {} FROM tokens WHERE id = ?1", TOKEN_COLUMNS),
                [id],
                map_token,
            )
            .optional()?;

        Ok(token)
    }

    /// List a session's tokens, newest first, with their request counts.
    pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<TokenSummary>> {
        let mut stmt = conn.prepare(
            "SELECT t.id, t.created_at, t.response_enabled, t.response_status,
                    (SELECT COUNT(*) FROM requests r WHERE r.token_id = t.id)
             FROM tokens t WHERE t.session_id = ?1
             ORDER BY t.created_at DESC, t.rowid DESC",
        )?;

        let tokens = stmt
            .query_map([session_id], |row| {
                Ok(TokenSummary {
                    id: row.get(0)?,
                    created_at: parse_datetime(&row.get::<_, String>(1)?),
                    response_enabled: row.get::<_, i32>(2)? != 0,
                    response_status: row.get(3)?,
                    request_count: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(tokens)
    }

    /// IDs of a session's tokens.
    pub fn ids_by_session(conn: &Connection, session_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT id FROM tokens WHERE session_id = ?1")?;
        let ids = stmt
            .query_map([session_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// IDs of tokens whose session has been idle since before `cutoff`.
    pub fn ids_of_idle_sessions(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT t.id FROM tokens t JOIN sessions s ON s.id = t.session_id
             WHERE s.last_seen_at < ?1",
        )?;
        let ids = stmt
            .query_map([format_datetime(cutoff)], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Replace a token's response settings. Returns false if it does not exist.
    pub fn update_response(conn: &Connection, id: &str, response: &TokenResponse) -> Result<bool> {
        let headers_json = serde_json::to_string(&response.headers)?;

        let updated = conn.execute(
            "UPDATE tokens SET response_enabled = ?2, response_status = ?3,
                    response_headers = ?4, response_body = ?5
             WHERE id = ?1",
            params![
                id,
                response.enabled as i32,
                response.status,
                headers_json,
                response.body,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Delete a token; its requests cascade.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM tokens WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Delete all tokens of a session.
    pub fn delete_by_session(conn: &Connection, session_id: &str) -> Result<usize> {
        let deleted = conn.execute("DELETE FROM tokens WHERE session_id = ?1", [session_id])?;
        Ok(deleted)
    }
}

fn map_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    let headers_str: String = row.get(5)?;
    Ok(Token {
        id: row.get(0)?,
        session_id: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        response: TokenResponse {
            enabled: row.get::<_, i32>(3)? != 0,
            status: row
                .get::<_, u16>(4)
                .unwrap_or(DEFAULT_RESPONSE_STATUS),
            headers: serde_json::from_str(&headers_str).unwrap_or_default(),
            body: row.get(6)?,
        },
    })
}
