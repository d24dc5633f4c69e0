//! Sessions repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, parse_datetime};
use crate::error::Result;
use crate::models::Session;

/// Repository for session operations.
pub struct SessionsRepo;

impl SessionsRepo {
    /// Insert a new session.
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        conn.execute(
            "INSERT INTO sessions (id, created_at, last_seen_at) VALUES (?1, ?2, ?3)",
            params![
                session.id,
                format_datetime(session.created_at),
                format_datetime(session.last_seen_at),
            ],
        )?;
        Ok(())
    }

    /// Get a session by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Session>> {
        let session = conn
            .query_row(
                "SELECT id, created_at, last_seen_at FROM sessions WHERE id = ?1",
                [id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        created_at: parse_datetime(&row.get::<_, String>(1)?),
                        last_seen_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;

        Ok(session)
    }

    /// Record activity on a session. Returns false if it does not exist.
    pub fn touch(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let updated = conn.execute(
            "UPDATE sessions SET last_seen_at = ?2 WHERE id = ?1",
            params![id, format_datetime(at)],
        )?;
        Ok(updated > 0)
    }

    /// Delete sessions idle since before `cutoff`; tokens and requests cascade.
    pub fn delete_idle_since(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE last_seen_at < ?1",
            [format_datetime(cutoff)],
        )?;
        Ok(deleted)
    }

    /// Count all sessions.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use chrono::Duration;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn session(id: &str, last_seen_at: DateTime<Utc>) -> Session {
        Session {
            id: id.to_string(),
            created_at: last_seen_at,
            last_seen_at,
        }
    }

    #[test]
    fn test_insert_and_get_session() {
        let conn = setup_db();
        let now = Utc::now();
        SessionsRepo::insert(&conn, &session("s1", now)).unwrap();

        let found = SessionsRepo::get_by_id(&conn, "s1").unwrap().unwrap();
        assert_eq!(found.id, "s1");
        assert_eq!(found.created_at.timestamp_micros(), now.timestamp_micros());
        assert!(SessionsRepo::get_by_id(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_touch_session() {
        let conn = setup_db();
        let then = Utc::now() - Duration::hours(2);
        SessionsRepo::insert(&conn, &session("s1", then)).unwrap();

        let now = Utc::now();
        assert!(SessionsRepo::touch(&conn, "s1", now).unwrap());
        assert!(!SessionsRepo::touch(&conn, "nope", now).unwrap());

        let found = SessionsRepo::get_by_id(&conn, "s1").unwrap().unwrap();
        assert_eq!(found.last_seen_at.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_delete_idle_sessions() {
        let conn = setup_db();
        let now = Utc::now();
        SessionsRepo::insert(&conn, &session("old", now - Duration::days(3))).unwrap();
        SessionsRepo::insert(&conn, &session("new", now)).unwrap();

        let deleted = SessionsRepo::delete_idle_since(&conn, now - Duration::days(1)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(SessionsRepo::count(&conn).unwrap(), 1);
        assert!(SessionsRepo::get_by_id(&conn, "new").unwrap().is_some());
    }
}
