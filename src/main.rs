mod api;
mod config;
mod error;
mod firecrawl;
mod llm;
mod search;
mod stream;

pub const USER_AGENT: &str = concat!("tripscout/", env!("CARGO_PKG_VERSION"), " (Search API)");

use std::time::Duration;

use clap::Parser;
use config::Args;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tripscout=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Per-request timeouts are set by each client; answers stream for as long as they need.
    let http = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()?;
    let state = api::AppState::from_env(http);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .inspect_err(|e| tracing::error!("failed to bind {}: {e}", args.bind))?;
    info!(addr = %listener.local_addr()?, "starting tripscout");

    axum::serve(listener, api::router(state)).await?;
    info!("server stopped");
    Ok(())
}
