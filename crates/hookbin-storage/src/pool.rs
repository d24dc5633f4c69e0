//! Shared SQLite connection.
//!
//! Capture traffic is a steady trickle of small inserts, so all storage work
//! goes through one connection behind a mutex. Operations that touch several
//! tables run inside [`ConnectionPool::transaction`]; readers never observe a
//! half-applied sweep or token purge.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::schema::run_migrations;

/// How long a statement waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the storage connection. Clones share it.
#[derive(Clone)]
pub struct ConnectionPool {
    conn: Arc<Mutex<Connection>>,
}

impl ConnectionPool {
    /// Opens (or creates) a database file and brings its schema up to date.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Lets the body reader endpoints run while a capture is committing
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Token and request rows cascade from their session
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locks the connection for a single statement or a short read.
    pub fn get(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::PoolPoisoned)
    }

    /// Runs `work` in an immediate transaction.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back on
    /// `Err`, which is passed through unchanged.
    pub fn transaction<T>(&self, work: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Rolling back storage transaction");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO sessions (id, created_at, last_seen_at) VALUES ('s', 'x', 'x');
             INSERT INTO tokens (id, session_id, created_at) VALUES ('t', 's', 'x');
             INSERT INTO requests (id, token_id, session_id, method, url, content_type,
                                   client_ip, remote_ip, created_at)
             VALUES ('r', 't', 's', 'POST', '/', 'text/plain', 'ip', 'ip', 'x');",
        )
        .unwrap();
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let pool = ConnectionPool::in_memory().unwrap();

        let inserted = pool
            .transaction(|tx| {
                seed(tx);
                Ok(3)
            })
            .unwrap();

        assert_eq!(inserted, 3);
        assert_eq!(count(&pool.get().unwrap(), "requests"), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let pool = ConnectionPool::in_memory().unwrap();

        let result: Result<()> = pool.transaction(|tx| {
            seed(tx);
            Err(StorageError::NotFound("token t".to_string()))
        });

        assert!(matches!(result, Err(StorageError::NotFound(_))));
        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "sessions"), 0);
        assert_eq!(count(&conn, "requests"), 0);
    }

    #[test]
    fn test_session_delete_cascades_to_requests() {
        let pool = ConnectionPool::in_memory().unwrap();
        let conn = pool.get().unwrap();
        seed(&conn);

        conn.execute("DELETE FROM sessions WHERE id = 's'", []).unwrap();

        assert_eq!(count(&conn, "tokens"), 0);
        assert_eq!(count(&conn, "requests"), 0);
    }

    #[test]
    fn test_file_database_uses_wal_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookbin.db");

        {
            let pool = ConnectionPool::new(&path).unwrap();
            let conn = pool.get().unwrap();
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap();
            assert_eq!(mode, "wal");
            seed(&conn);
        }

        let reopened = ConnectionPool::new(&path).unwrap();
        assert_eq!(count(&reopened.get().unwrap(), "requests"), 1);
    }

    #[test]
    fn test_clones_share_the_connection() {
        let pool = ConnectionPool::in_memory().unwrap();
        let other = pool.clone();

        seed(&pool.get().unwrap());
        assert_eq!(count(&other.get().unwrap(), "tokens"), 1);
    }
}
