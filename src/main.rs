use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use smcflow::api::{self, AppState, BotSpawner};
use smcflow::config::BotConfig;
use smcflow::engine::{Bot, SharedState, TradeHistory};
use smcflow::gateway::{RestGateway, SimGateway};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON config file (defaults apply when omitted)
    #[arg(short, long, env = "SMCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to run the dashboard API on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Paper mode: run against the in-memory simulated venue
    #[arg(long)]
    paper: bool,

    /// Do not start the trading loop until /api/start is called
    #[arg(long)]
    manual: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smcflow=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = BotConfig::load(args.config.as_deref())?;
    config.tz()?;

    info!("Starting smcflow");
    info!(
        "Symbols: {}",
        config
            .symbols
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("Mode: {}", if args.paper { "paper" } else { "live" });
    info!("Port: {}", args.port);

    let shared = SharedState::new();
    let history = TradeHistory::new(&config.history_dir)?;

    // Venue connectivity is verified before any trading begins; a failed
    // login aborts the run. The blocking client runs off the async runtime.
    if !args.paper {
        tokio::task::spawn_blocking(|| -> Result<()> {
            let mut probe = RestGateway::from_env()?;
            probe.connect()
        })
        .await?
        .context("Venue connectivity check failed")?;
    }

    // The worker thread owns its own venue session; all blocking venue
    // calls happen there, never on the runtime.
    let spawner: BotSpawner = {
        let config = config.clone();
        let paper = args.paper;
        Box::new(move |shared| {
            let config = config.clone();
            if paper {
                let bot = Bot::new(config, SimGateway::new(10_000.0), shared)?;
                Ok(std::thread::spawn(move || bot.run()))
            } else {
                Ok(std::thread::spawn(move || {
                    let mut gateway = match RestGateway::from_env() {
                        Ok(gateway) => gateway,
                        Err(e) => {
                            error!("Venue credentials missing: {:#}", e);
                            return;
                        }
                    };
                    if let Err(e) = gateway.connect() {
                        error!("Venue login failed: {:#}", e);
                        return;
                    }
                    match Bot::new(config, gateway, shared) {
                        Ok(bot) => bot.run(),
                        Err(e) => error!("Bot init failed: {:#}", e),
                    }
                }))
            }
        })
    };

    let state = Arc::new(AppState::new(shared.clone(), history, spawner));

    if !args.manual {
        state.start_worker()?;
        info!("Trading worker started");
    }

    // Build router
    let app = api::router(state).layer(CorsLayer::new().allow_origin(Any));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("Dashboard API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
