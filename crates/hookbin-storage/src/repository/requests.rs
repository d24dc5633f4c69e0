//! Captured requests repository.

use chrono::{DateTime, Utc};
use hookbin_core::CapturedRequest;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, parse_datetime};
use crate::error::Result;

const REQUEST_COLUMNS: &str = "id, token_id, session_id, method, url, headers, content_type, content_length, is_binary, client_ip, remote_ip, body_ref, created_at";

/// Repository for captured request operations.
pub struct RequestsRepo;

impl RequestsRepo {
    /// Insert a captured request.
    pub fn insert(conn: &Connection, request: &CapturedRequest) -> Result<()> {
        let headers_json = serde_json::to_string(&request.headers)?;

        conn.execute(
            "INSERT INTO requests (id, token_id, session_id, method, url, headers, content_type,
                                   content_length, is_binary, client_ip, remote_ip, body_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                request.id,
                request.token_id,
                request.session_id,
                request.method,
                request.url,
                headers_json,
                request.content_type,
                request.content_length as i64,
                request.is_binary as i32,
                request.client_ip,
                request.remote_ip,
                request.body_storage_ref,
                format_datetime(request.created_at),
            ],
        )?;

        Ok(())
    }

    /// Get a request by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<CapturedRequest>> {
        let request = conn
            .query_row(
                &format!("SELECT {} FROM requests WHERE id = ?1", REQUEST_COLUMNS),
                [id],
                map_request,
            )
            .optional()?;

        Ok(request)
    }

    /// Get a token's requests, newest first, with pagination.
    pub fn list_by_token(
        conn: &Connection,
        token_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CapturedRequest>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM requests WHERE token_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
            REQUEST_COLUMNS
        ))?;

        let requests = stmt
            .query_map(params![token_id, limit, offset], map_request)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(requests)
    }

    /// Count a token's requests.
    pub fn count_by_token(conn: &Connection, token_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE token_id = ?1",
            [token_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete a request by ID.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM requests WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Delete all requests of a token.
    pub fn delete_by_token(conn: &Connection, token_id: &str) -> Result<usize> {
        let deleted = conn.execute("DELETE FROM requests WHERE token_id = ?1", [token_id])?;
        Ok(deleted)
    }

    /// Body references of requests created before `cutoff`.
    pub fn body_refs_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT body_ref FROM requests WHERE created_at < ?1 AND body_ref IS NOT NULL",
        )?;
        let refs = stmt
            .query_map([format_datetime(cutoff)], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(refs)
    }

    /// Delete requests created before `cutoff`.
    pub fn delete_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM requests WHERE created_at < ?1",
            [format_datetime(cutoff)],
        )?;
        Ok(deleted)
    }
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<CapturedRequest> {
    let headers_str: String = row.get(5)?;
    Ok(CapturedRequest {
        id: row.get(0)?,
        token_id: row.get(1)?,
        session_id: row.get(2)?,
        method: row.get(3)?,
        url: row.get(4)?,
        headers: serde_json::from_str(&headers_str).unwrap_or_default(),
        content_type: row.get(6)?,
        content_length: row.get::<_, i64>(7)?.max(0) as u64,
        is_binary: row.get::<_, i32>(8)? != 0,
        client_ip: row.get(9)?,
        remote_ip: row.get(10)?,
        body_storage_ref: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}
