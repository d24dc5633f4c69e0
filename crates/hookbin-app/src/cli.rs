//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hookbin_server::{
    ServerConfig, DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT, DEFAULT_SSE_BUFFER,
};

use crate::retention::RetentionPolicy;

/// Hookbin - self-hosted HTTP request inspector
#[derive(Parser, Debug, Clone)]
#[command(name = "hookbin", version, about)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "HOOKBIN_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "HOOKBIN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// SQLite database file (default: app data directory)
    #[arg(long, env = "HOOKBIN_DB_PATH", conflicts_with = "in_memory")]
    pub db_path: Option<PathBuf>,

    /// Directory for request bodies (default: `bodies/` next to the database)
    #[arg(long, env = "HOOKBIN_BODY_DIR")]
    pub body_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long, env = "HOOKBIN_IN_MEMORY")]
    pub in_memory: bool,

    /// Resolve the remote address from X-Forwarded-For and friends
    #[arg(long, env = "HOOKBIN_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Largest accepted request body in bytes
    #[arg(long, env = "HOOKBIN_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Delete requests and idle sessions older than this many hours (0 = keep forever)
    #[arg(long, env = "HOOKBIN_RETENTION_HOURS", default_value_t = 0)]
    pub retention_hours: u64,

    /// Seconds between retention sweeps
    #[arg(long, env = "HOOKBIN_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Events buffered per live stream before it is considered lagging
    #[arg(long, env = "HOOKBIN_SSE_BUFFER", default_value_t = DEFAULT_SSE_BUFFER)]
    pub sse_buffer: usize,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, env = "HOOKBIN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "HOOKBIN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// Server settings. The database location is resolved separately.
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_trust_proxy(self.trust_proxy)
            .with_max_body_bytes(self.max_body_bytes)
            .with_sse_buffer(self.sse_buffer);
        config.db_path = self.db_path.clone();
        if let Some(dir) = &self.body_dir {
            config = config.with_body_dir(dir.clone());
        }
        config
    }

    /// Retention settings, or `None` when retention is disabled.
    pub fn retention(&self) -> Option<RetentionPolicy> {
        (self.retention_hours > 0).then(|| RetentionPolicy {
            max_age: chrono::Duration::hours(self.retention_hours as i64),
            interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        })
    }

    /// Effective log level.
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}
