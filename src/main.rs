use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lob_engine::cli::run_repl;
use lob_engine::persistence::Store;
use lob_engine::replay;
use lob_engine::state::AppState;
use lob_engine::symbol::Symbol;
use lob_engine::{api, utils::shutdown_token};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lob-engine")]
#[command(author = "Andrew Odiit", version = "0.1", about = "A multi-symbol limit order book matching engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the HTTP/WebSocket server.
    Server {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "trade_store")]
        store_path: PathBuf,
    },
    /// Runs the interactive textual REPL against its own store.
    Repl {
        #[arg(long, default_value = "trade_store")]
        store_path: PathBuf,
    },
    /// Replays persisted trades for a symbol in chronological order.
    Replay {
        symbol: Symbol,
        #[arg(long, default_value = "trade_store")]
        store_path: PathBuf,
        #[arg(long, default_value_t = 0)]
        pace_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { port, store_path } => {
            let state = AppState::new(&store_path).await?;
            let token = shutdown_token();
            let app = api::router(state);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            tracing::info!(port, "HTTP/WS server listening");
            axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned()).await?;
        }
        Commands::Repl { store_path } => {
            let state = AppState::new(&store_path).await?;
            run_repl(&state.pipeline).await;
        }
        Commands::Replay { symbol, store_path, pace_ms } => {
            let store = Store::open(Path::new(&store_path))?;
            replay::run(&store, &symbol, pace_ms).await?;
        }
    }
    Ok(())
}
