//! Monitoring server - read-only web interface for following a run.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "factory-ui")]
#[command(about = "Read-only web UI for monitoring an agent run")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3002")]
    port: u16,

    /// Run directory (contains meta.json and events.jsonl)
    #[arg(long, default_value = ".")]
    run_dir: PathBuf,

    /// Events retained for replay to late subscribers
    #[arg(long, default_value = "1000")]
    buffer_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("factory_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let run_dir = args.run_dir.canonicalize().unwrap_or(args.run_dir);
    info!(run_dir = %run_dir.display(), "starting factory-ui");

    let state = AppState::new(run_dir, args.buffer_capacity);

    // Start tailing the event log
    sse::start_event_tailer(state.clone());

    // Build router
    let api_router = routes::api_router();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", api_router)
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
