//! edge-bot: trade gate and position lifecycle engine.
//!
//! Usage:
//!   edge-bot [OPTIONS]
//!
//! Options:
//!   -m, --mode <MODE>       Trading mode: paper, live
//!   -c, --config <FILE>     Config file path (default: config/bot.toml)
//!   --assets <ASSETS>       Comma-separated assets (overrides config)
//!   --bankroll <USDC>       Bankroll override

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use edge_bot::config::{BotConfig, TradingMode};
use edge_bot::engine::Engine;
use edge_bot::executor::PaperExecutor;
use edge_bot::feed::JsonFileCatalystSource;
use edge_bot::sim::SimExchange;
use edge_common::CryptoAsset;

/// CLI arguments for edge-bot.
#[derive(Parser, Debug)]
#[command(name = "edge-bot")]
#[command(about = "Trade gate and position lifecycle engine for 15-minute binary markets")]
#[command(version)]
struct Args {
    /// Trading mode: paper, live
    #[arg(short, long)]
    mode: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Comma-separated assets to trade (e.g., "BTC,ETH,SOL")
    #[arg(long, value_delimiter = ',')]
    assets: Option<Vec<CryptoAsset>>,

    /// Bankroll override (USDC)
    #[arg(long)]
    bankroll: Option<Decimal>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let mut config = if args.config.exists() {
        BotConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        warn!("Config file not found at {:?}, using defaults", args.config);
        BotConfig::default()
    };

    config.apply_env_overrides();
    config.apply_cli_overrides(args.mode, args.assets, args.bankroll);

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    config.validate().context("Configuration validation failed")?;

    info!("Starting edge-bot");
    info!("Mode: {}", config.mode);
    info!(
        "Assets: {:?}",
        config.assets.iter().map(|a| a.as_str()).collect::<Vec<_>>()
    );
    info!("Bankroll: ${}", config.bankroll);

    let engine = match config.mode {
        TradingMode::Paper => build_paper_engine(config),
        TradingMode::Live => {
            // The live transport (signed order placement, authenticated
            // market data) is an external collaborator and is not part
            // of this build.
            bail!(
                "live mode requires an exchange transport collaborator; \
                 this build ships paper mode only"
            );
        }
    };

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            error!("Shutdown signal handler error: {}", e);
        }
        info!("Requesting shutdown...");
        shutdown.request();
    });

    engine.run().await;
    Ok(())
}

fn build_paper_engine(config: BotConfig) -> Arc<Engine> {
    let catalyst_expiry = chrono::Duration::minutes(config.strategies.catalyst.expiry_minutes);
    let catalyst_source = Arc::new(JsonFileCatalystSource::new(
        config.strategies.catalyst.flag_path.clone(),
        catalyst_expiry,
    ));
    // Seed from the wall clock second so repeated paper runs differ;
    // pass EDGE_SIM_SEED for a reproducible session.
    let seed = std::env::var("EDGE_SIM_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| chrono::Utc::now().timestamp() as u64);
    let exchange = Arc::new(SimExchange::new(config.assets.clone(), seed));
    let executor = Arc::new(PaperExecutor::new(std::time::Duration::from_millis(50)));

    Arc::new(Engine::new(
        config,
        exchange.clone(),
        executor,
        exchange,
        catalyst_source,
    ))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
