//! Periodic deletion of old requests and idle sessions.
//!
//! Sweeps publish no events; clients notice removed data on their next fetch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hookbin_storage::{Database, Result, SweepStats};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long data is kept and how often it is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: chrono::Duration,
    pub interval: Duration,
}

impl RetentionPolicy {
    /// Oldest timestamp that is still kept at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age
    }
}

/// Runs a single sweep as of `now`.
pub fn sweep_once(db: &Database, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<SweepStats> {
    let stats = db.sweep(policy.cutoff(now))?;
    if stats.requests_deleted > 0 || stats.sessions_deleted > 0 {
        info!(
            requests = stats.requests_deleted,
            sessions = stats.sessions_deleted,
            "Retention sweep removed expired data"
        );
    } else {
        debug!("Retention sweep found nothing to remove");
    }
    Ok(stats)
}

/// Starts the background sweeper. Abort the handle to stop it.
pub fn spawn_sweeper(db: Arc<Database>, policy: RetentionPolicy) -> JoinHandle<()> {
    info!(
        max_age_hours = policy.max_age.num_hours(),
        interval_secs = policy.interval.as_secs(),
        "Retention sweeper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        loop {
            ticker.tick().await;

            let db = db.clone();
            let swept =
                tokio::task::spawn_blocking(move || sweep_once(&db, &policy, Utc::now())).await;

            match swept {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Retention sweep failed"),
                Err(e) => warn!(error = %e, "Retention sweep task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookbin_storage::NewRequest;

    fn new_request(session_id: &str, token_id: &str) -> NewRequest {
        NewRequest {
            session_id: session_id.to_string(),
            token_id: token_id.to_string(),
            method: "POST".to_string(),
            url: "/payload".to_string(),
            headers: Default::default(),
            content_type: "text/plain".to_string(),
            is_binary: false,
            client_ip: "127.0.0.1".to_string(),
            remote_ip: "127.0.0.1".to_string(),
        }
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            max_age: chrono::Duration::hours(1),
            interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_fresh_data_is_kept() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();
        db.create_request(new_request(&session.id, &token.id), b"body")
            .unwrap();

        let stats = sweep_once(&db, &policy(), Utc::now()).unwrap();
        assert_eq!(stats, SweepStats::default());
        assert_eq!(db.count_requests(&token.id).unwrap(), 1);
    }

    #[test]
    fn test_expired_data_is_removed() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();
        let request = db
            .create_request(new_request(&session.id, &token.id), b"body")
            .unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        let stats = sweep_once(&db, &policy(), later).unwrap();
        assert_eq!(stats.requests_deleted, 1);
        assert_eq!(stats.sessions_deleted, 1);
        assert!(db.get_request(&request.id).unwrap().is_none());
        assert!(db.get_session(&session.id).unwrap().is_none());
    }
}
