//! Hookbin - self-hosted HTTP request inspector.
//!
//! Runs the HTTP server (API, payload capture and live streams) and, when
//! retention is configured, the background sweeper.

use clap::Parser;
use hookbin_app::logging::init_logging;
use hookbin_app::{spawn_sweeper, Args};
use hookbin_server::Server;
use hookbin_storage::Database;

/// Opens the database the arguments point at.
fn open_database(args: &Args) -> anyhow::Result<Database> {
    if args.in_memory {
        tracing::warn!("Using in-memory storage; data is lost on exit");
        return Ok(Database::in_memory()?);
    }

    let path = match &args.db_path {
        Some(path) => path.clone(),
        None => Database::default_db_path()?,
    };

    let db = match &args.body_dir {
        Some(bodies) => Database::with_paths(&path, bodies)?,
        None => Database::with_path(&path)?,
    };
    Ok(db)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(args.log_level(), args.log_dir.as_deref());

    tracing::info!("Starting Hookbin...");
    tracing::debug!("Args: {:?}", args);

    let db = open_database(&args)
        .map_err(|e| anyhow::anyhow!("Database error: {}", e))?;

    let server = Server::with_database(args.server_config(), db)?;

    let sweeper = args
        .retention()
        .map(|policy| spawn_sweeper(server.state().db.clone(), policy));

    tracing::info!("Listening on http://{}", server.addr());
    server.run_until(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    tracing::info!("Hookbin shutting down");
    Ok(())
}
