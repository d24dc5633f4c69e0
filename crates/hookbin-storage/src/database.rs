//! High-level database interface.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use directories::ProjectDirs;
use hookbin_core::CapturedRequest;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bodies::BodyStore;
use crate::error::{Result, StorageError};
use crate::models::{NewRequest, Session, SweepStats, Token, TokenResponse, TokenSummary};
use crate::pool::ConnectionPool;
use crate::repository::{RequestsRepo, SessionsRepo, TokensRepo};

/// High-level storage interface for Hookbin.
///
/// Owns the SQLite pool for records and the body store for request bodies.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
    bodies: BodyStore,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        let path = Self::default_db_path()?;
        let bodies = Self::default_body_dir(&path);
        Self::with_paths(path, bodies)
    }

    /// Create a new database at a specific path, with bodies next to it.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bodies = Self::default_body_dir(&path);
        Self::with_paths(path, bodies)
    }

    /// Create a new database with explicit database and body locations.
    pub fn with_paths(path: impl Into<PathBuf>, body_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let body_dir = body_dir.into();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;
        let bodies = BodyStore::disk(&body_dir)?;
        info!("Storing request bodies in: {:?}", body_dir);

        Ok(Self { pool, bodies })
    }

    /// Create an in-memory database (for testing and ephemeral runs).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self {
            pool,
            bodies: BodyStore::memory(),
        })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "hookbin", "hookbin").ok_or_else(|| {
            StorageError::Config("Could not determine app data directory".into())
        })?;

        Ok(proj_dirs.data_dir().join("hookbin.db"))
    }

    fn default_body_dir(db_path: &Path) -> PathBuf {
        db_path
            .parent()
            .map(|p| p.join("bodies"))
            .unwrap_or_else(|| PathBuf::from("bodies"))
    }

    // === Sessions ===

    /// Create a new session.
    pub fn create_session(&self) -> Result<Session> {
        let conn = self.pool.get()?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_seen_at: now,
        };
        SessionsRepo::insert(&conn, &session)?;
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.pool.get()?;
        SessionsRepo::get_by_id(&conn, id)
    }

    /// Mark a session as active now. Returns false for unknown sessions.
    pub fn touch_session(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionsRepo::touch(&conn, id, Utc::now())
    }

    // === Tokens ===

    /// Create a new token owned by `session_id`.
    pub fn create_token(&self, session_id: &str) -> Result<Token> {
        let conn = self.pool.get()?;
        let token = Token {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            response: TokenResponse::default(),
        };
        TokensRepo::insert(&conn, &token)?;
        Ok(token)
    }

    /// Get a token by ID.
    pub fn get_token(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.pool.get()?;
        TokensRepo::get_by_id(&conn, id)
    }

    /// List a session's tokens, newest first.
    pub fn list_tokens(&self, session_id: &str) -> Result<Vec<TokenSummary>> {
        let conn = self.pool.get()?;
        TokensRepo::list_by_session(&conn, session_id)
    }

    /// Replace a token's custom response. Returns false for unknown tokens.
    pub fn update_token_response(&self, id: &str, response: &TokenResponse) -> Result<bool> {
        let conn = self.pool.get()?;
        TokensRepo::update_response(&conn, id, response)
    }

    /// Delete a token with its requests and bodies.
    pub fn delete_token(&self, id: &str) -> Result<bool> {
        let deleted = {
            let conn = self.pool.get()?;
            TokensRepo::delete(&conn, id)?
        };

        if deleted {
            self.bodies.delete_token(id)?;
        }
        Ok(deleted)
    }

    /// Delete every token of a session. Returns the deleted token ids.
    pub fn delete_session_tokens(&self, session_id: &str) -> Result<Vec<String>> {
        let ids = self.pool.transaction(|tx| {
            let ids = TokensRepo::ids_by_session(tx, session_id)?;
            TokensRepo::delete_by_session(tx, session_id)?;
            Ok(ids)
        })?;

        for id in &ids {
            self.bodies.delete_token(id)?;
        }
        Ok(ids)
    }

    // === Requests ===

    /// Store a captured request and its body.
    ///
    /// The body is written first and the record second; if the record
    /// cannot be written the body is removed again.
    pub fn create_request(&self, new: NewRequest, body: &[u8]) -> Result<CapturedRequest> {
        let id = Uuid::new_v4().to_string();

        let body_storage_ref = if body.is_empty() {
            None
        } else {
            Some(self.bodies.write(&new.token_id, &id, body)?)
        };

        let request = CapturedRequest {
            id,
            token_id: new.token_id,
            session_id: new.session_id,
            method: new.method,
            url: new.url,
            headers: new.headers,
            content_type: new.content_type,
            content_length: body.len() as u64,
            is_binary: new.is_binary,
            client_ip: new.client_ip,
            remote_ip: new.remote_ip,
            body_storage_ref,
            // Stored timestamps keep microseconds
            created_at: Utc::now().trunc_subsecs(6),
        };

        let inserted = self
            .pool
            .get()
            .and_then(|conn| RequestsRepo::insert(&conn, &request));

        if let Err(e) = inserted {
            if let Some(body_ref) = &request.body_storage_ref {
                if let Err(cleanup) = self.bodies.delete(body_ref) {
                    warn!(body_ref = %body_ref, error = %cleanup, "Failed to remove orphaned body");
                }
            }
            return Err(e);
        }

        debug!(request_id = %request.id, token_id = %request.token_id, "Request stored");
        Ok(request)
    }

    /// Get a request by ID.
    pub fn get_request(&self, id: &str) -> Result<Option<CapturedRequest>> {
        let conn = self.pool.get()?;
        RequestsRepo::get_by_id(&conn, id)
    }

    /// List a token's requests, newest first.
    pub fn list_requests(
        &self,
        token_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CapturedRequest>> {
        let conn = self.pool.get()?;
        RequestsRepo::list_by_token(&conn, token_id, limit, offset)
    }

    /// Count a token's requests.
    pub fn count_requests(&self, token_id: &str) -> Result<i64> {
        let conn = self.pool.get()?;
        RequestsRepo::count_by_token(&conn, token_id)
    }

    /// Delete a request and its body.
    pub fn delete_request(&self, request: &CapturedRequest) -> Result<bool> {
        let deleted = {
            let conn = self.pool.get()?;
            RequestsRepo::delete(&conn, &request.id)?
        };

        if let Some(body_ref) = &request.body_storage_ref {
            self.bodies.delete(body_ref)?;
        }
        Ok(deleted)
    }

    /// Delete every request of a token and their bodies.
    pub fn clear_requests(&self, token_id: &str) -> Result<usize> {
        let deleted = {
            let conn = self.pool.get()?;
            RequestsRepo::delete_by_token(&conn, token_id)?
        };

        self.bodies.delete_token(token_id)?;
        Ok(deleted)
    }

    /// Read a request's body. `None` when the request has no body.
    pub fn read_body(&self, request: &CapturedRequest) -> Result<Option<Vec<u8>>> {
        match &request.body_storage_ref {
            Some(body_ref) => self.bodies.read(body_ref).map(Some),
            None => Ok(None),
        }
    }

    // === Retention ===

    /// Delete requests created before `cutoff`, then sessions idle since
    /// before `cutoff` together with their tokens.
    pub fn sweep(&self, cutoff: DateTime<Utc>) -> Result<SweepStats> {
        let (body_refs, requests_deleted, idle_tokens, sessions_deleted) =
            self.pool.transaction(|tx| {
                let body_refs = RequestsRepo::body_refs_older_than(tx, cutoff)?;
                let requests_deleted = RequestsRepo::delete_older_than(tx, cutoff)?;
                let idle_tokens = TokensRepo::ids_of_idle_sessions(tx, cutoff)?;
                let sessions_deleted = SessionsRepo::delete_idle_since(tx, cutoff)?;
                Ok((body_refs, requests_deleted, idle_tokens, sessions_deleted))
            })?;

        for body_ref in &body_refs {
            self.bodies.delete(body_ref)?;
        }
        for token_id in &idle_tokens {
            self.bodies.delete_token(token_id)?;
        }

        Ok(SweepStats {
            requests_deleted,
            sessions_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hookbin_core::HeaderList;

    fn new_request(session: &Session, token: &Token) -> NewRequest {
        let mut headers = HeaderList::new();
        headers.insert("content-type", "application/json");
        NewRequest {
            session_id: session.id.clone(),
            token_id: token.id.clone(),
            method: "POST".to_string(),
            url: "/payload/x".to_string(),
            headers,
            content_type: "application/json".to_string(),
            is_binary: false,
            client_ip: "127.0.0.1".to_string(),
            remote_ip: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn test_session_and_token_lifecycle() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        assert!(db.get_session(&session.id).unwrap().is_some());
        assert!(db.touch_session(&session.id).unwrap());
        assert!(!db.touch_session("missing").unwrap());

        let token = db.create_token(&session.id).unwrap();
        let found = db.get_token(&token.id).unwrap().unwrap();
        assert_eq!(found.session_id, session.id);
        assert!(!found.response.enabled);

        let response = TokenResponse {
            enabled: true,
            status: 418,
            headers: HeaderList::new(),
            body: "teapot".to_string(),
        };
        assert!(db.update_token_response(&token.id, &response).unwrap());
        assert_eq!(db.get_token(&token.id).unwrap().unwrap().response, response);

        assert!(db.delete_token(&token.id).unwrap());
        assert!(db.get_token(&token.id).unwrap().is_none());
    }

    #[test]
    fn test_create_request_with_body() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();

        let request = db
            .create_request(new_request(&session, &token), br#"{"a": 1}"#)
            .unwrap();
        assert_eq!(request.content_length, 8);
        assert!(request.body_storage_ref.is_some());
        assert_eq!(
            db.read_body(&request).unwrap().unwrap(),
            br#"{"a": 1}"#.to_vec()
        );

        let stored = db.get_request(&request.id).unwrap().unwrap();
        assert_eq!(stored, request);
    }

    #[test]
    fn test_create_request_without_body() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();

        let request = db.create_request(new_request(&session, &token), b"").unwrap();
        assert_eq!(request.content_length, 0);
        assert!(request.body_storage_ref.is_none());
        assert!(db.read_body(&request).unwrap().is_none());
    }

    #[test]
    fn test_failed_record_removes_body() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::with_paths(dir.path().join("db.sqlite"), dir.path().join("b")).unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();

        let mut orphan = new_request(&session, &token);
        orphan.token_id = "no-such-token".to_string();

        assert!(db.create_request(orphan, b"payload").is_err());
        let leftovers = std::fs::read_dir(dir.path().join("b/no-such-token"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_delete_and_clear_requests() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();

        let first = db
            .create_request(new_request(&session, &token), b"one")
            .unwrap();
        db.create_request(new_request(&session, &token), b"two")
            .unwrap();
        assert_eq!(db.count_requests(&token.id).unwrap(), 2);

        assert!(db.delete_request(&first).unwrap());
        assert!(matches!(
            db.read_body(&first),
            Err(StorageError::NotFound(_))
        ));

        assert_eq!(db.clear_requests(&token.id).unwrap(), 1);
        assert!(db.list_requests(&token.id, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_delete_session_tokens() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let other = db.create_session().unwrap();
        let a = db.create_token(&session.id).unwrap();
        let b = db.create_token(&session.id).unwrap();
        let kept = db.create_token(&other.id).unwrap();

        let mut deleted = db.delete_session_tokens(&session.id).unwrap();
        deleted.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(db.get_token(&kept.id).unwrap().is_some());
    }

    #[test]
    fn test_sweep_removes_old_requests_and_idle_sessions() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();
        db.create_request(new_request(&session, &token), b"old")
            .unwrap();

        let stats = db.sweep(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(stats, SweepStats::default());

        let stats = db.sweep(Utc::now() + Duration::seconds(1)).unwrap();
        assert_eq!(stats.requests_deleted, 1);
        assert_eq!(stats.sessions_deleted, 1);
        assert!(db.get_token(&token.id).unwrap().is_none());
    }
}
