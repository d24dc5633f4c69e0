//! Hookbin Storage - SQLite persistence layer.
//!
//! This crate provides storage for the Hookbin request inspector.
//! It handles:
//!
//! - Sessions and the tokens they own
//! - Per-token custom responses
//! - Captured request records (headers as JSON, newest-first listing)
//! - Request bodies, kept outside SQLite in a [`BodyStore`]
//! - Retention sweeps
//!
//! # Example
//!
//! ```no_run
//! use hookbin_core::HeaderList;
//! use hookbin_storage::{Database, NewRequest};
//!
//! let db = Database::in_memory().unwrap();
//! let session = db.create_session().unwrap();
//! let token = db.create_token(&session.id).unwrap();
//!
//! let request = db.create_request(
//!     NewRequest {
//!         session_id: session.id.clone(),
//!         token_id: token.id.clone(),
//!         method: "POST".to_string(),
//!         url: "/payload/abc".to_string(),
//!         headers: HeaderList::new(),
//!         content_type: "application/octet-stream".to_string(),
//!         is_binary: false,
//!         client_ip: "127.0.0.1".to_string(),
//!         remote_ip: "127.0.0.1".to_string(),
//!     },
//!     b"hello",
//! ).unwrap();
//! assert_eq!(request.content_length, 5);
//! ```

pub mod bodies;
mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use bodies::BodyStore;
pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{
    NewRequest, Session, SweepStats, Token, TokenResponse, TokenSummary, DEFAULT_RESPONSE_STATUS,
};
pub use pool::ConnectionPool;
