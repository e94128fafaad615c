//! # Storefront CLI
//!
//! JSON-lines front end for the storefront engines.
//!
//! ## Module Organization
//! ```text
//! storefront_cli/
//! ├── lib.rs       ◄─── Startup, command loop, tracing
//! ├── config.rs    ◄─── Environment configuration
//! ├── state.rs     ◄─── Engines wired to the database
//! ├── commands.rs  ◄─── Request / Command / Response protocol
//! ├── feed.rs      ◄─── Live event feed task
//! ├── output.rs    ◄─── Serialized line writer
//! └── error.rs     ◄─── ApiError for failed commands
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()            logs go to stderr, stdout is protocol     │
//! │  2. StorefrontConfig::load()  STOREFRONT_* environment variables        │
//! │  3. Database::new()           SQLite, WAL, migrations                   │
//! │  4. AppState::new()           engines share one BroadcastObserver       │
//! │  5. feed::spawn()             events → stdout                           │
//! │  6. command loop              until EOF or Ctrl+C                       │
//! │  7. shutdown                  close pool, drain feed                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod output;
pub mod state;

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storefront_db::{Database, DbConfig};

use crate::commands::Response;
use crate::config::StorefrontConfig;
use crate::error::ApiError;
use crate::output::Output;
use crate::state::AppState;

/// Runs the storefront until stdin closes or Ctrl+C.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = StorefrontConfig::load()?;
    info!(
        db_path = %config.db_path.display(),
        max_connections = config.db_max_connections,
        event_buffer = config.event_buffer,
        admin_enabled = config.admin_token.is_some(),
        "Configuration loaded"
    );

    let db = Database::new(
        DbConfig::new(config.db_path.clone()).max_connections(config.db_max_connections),
    )
    .await?;

    let state = AppState::new(db, config);
    let output = Output::stdout();
    let feed = feed::spawn(state.events.subscribe(), output.clone());

    info!("Storefront ready, reading commands from stdin");

    serve(&state, BufReader::new(tokio::io::stdin()), &output).await?;

    state.db.close().await;
    // Dropping the engines drops the last sender, which ends the feed.
    drop(state);
    if let Err(e) = feed.await {
        warn!(error = %e, "Event feed task failed");
    }

    info!("Storefront stopped");
    Ok(())
}

/// Answers every line of `input` until EOF or Ctrl+C.
///
/// Blank lines are skipped. A line that is not valid UTF-8 gets a
/// `BAD_REQUEST` reply and the loop keeps reading.
pub async fn serve<R>(state: &AppState, input: R, output: &Output) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut segments = input.split(b'\n');

    loop {
        let segment = tokio::select! {
            segment = segments.next_segment() => segment?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                None
            }
        };

        let Some(segment) = segment else { break };

        let response = match String::from_utf8(segment) {
            Ok(line) => {
                let line = line.trim_end_matches('\r');
                if line.trim().is_empty() {
                    continue;
                }
                commands::handle_line(state, line).await
            }
            Err(e) => {
                warn!(error = %e, "Input line is not valid UTF-8");
                Response::rejected(ApiError::bad_request("input line is not valid UTF-8"))
            }
        };

        output.write_json(&response).await?;
    }

    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=storefront=trace` - Show trace for storefront crates only
/// - Default: `info,storefront=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storefront=debug,sqlx=warn"));

    // try_init: a second call (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
