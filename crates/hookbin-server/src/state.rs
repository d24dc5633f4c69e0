//! Application state for the API server.

use std::sync::Arc;

use hookbin_core::Fanout;
use hookbin_storage::{Database, StorageError};

use crate::ingest::IngestService;
use crate::ServerConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Arc<Database>,
    /// Live event channels.
    pub fanout: Fanout,
    /// Capture pipeline shared by every ingestion path.
    pub ingest: IngestService,
    /// Settings the handlers need at request time.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Creates a new application state with the given database.
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self::with_fanout(db, Fanout::new(), config)
    }

    /// Creates application state around an existing fanout.
    pub fn with_fanout(db: Database, fanout: Fanout, config: ServerConfig) -> Self {
        let db = Arc::new(db);
        let ingest = IngestService::new(db.clone(), fanout.clone(), config.trust_proxy);
        Self {
            db,
            fanout,
            ingest,
            config: Arc::new(config),
        }
    }

    /// Creates application state with default in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(Database::in_memory()?, ServerConfig::in_memory()))
    }
}
