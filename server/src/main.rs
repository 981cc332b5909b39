//! kts CLI
//!
//! Usage:
//!   kts serve --port 3000
//!   kts serve --memory
//!   kts config

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kts_server::db::{Database, MemoryStore};
use kts_server::telemetry::init_tracing;
use kts_server::uploads::Uploads;
use kts_server::web::{self, state::AppState, WebConfig};
use kts_server::{KtsConfig, Services};
use kts_workflow::{DocumentStore, TracingLogger};

#[derive(Parser)]
#[command(name = "kts")]
#[command(about = "Account, page and album services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search for kts.toml)
    #[arg(short, long, env = "KTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging for kts crates
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(short, long, env = "KTS_PORT")]
        port: Option<u16>,

        /// SQLite database path (overrides [database] path)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep all data in memory
        #[arg(long, conflicts_with = "db")]
        memory: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = KtsConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, db, memory } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if db.is_some() {
                config.database.path = db;
            }

            let store: Arc<dyn DocumentStore> = if memory {
                tracing::info!("Using in-memory store; data is lost on exit");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(Database::open_at(config.database_path()?)?)
            };

            let services = Services::new(store, Arc::new(TracingLogger));
            let uploads = Uploads::new(config.uploads.dir.clone());
            let state = AppState::new(services, uploads, config.app.project_name.clone());

            web::serve(
                state,
                WebConfig {
                    addr: config.bind_addr(),
                    max_body_bytes: config.uploads.max_bytes,
                },
            )
            .await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
