//! Maker Hedger - Main Entry Point
//!
//! Paper trading against simulated maker and hedge venues.

use anyhow::Result;
use clap::{Parser, Subcommand};
use maker_hedger::config::Config;
use maker_hedger::exchange::{
    BookTop, RandomWalkParams, SimulatedMarketData, SimulatedVenue, Venue,
};
use maker_hedger::strategy::StrategyEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Maker Hedger CLI
#[derive(Parser)]
#[command(name = "maker-hedger")]
#[command(version, about = "Cross-venue market making with immediate hedging")]
struct Cli {
    /// Directory for rolling log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Paper trade against simulated venues (default)
    Run {
        /// Stop after this many cycles
        #[arg(short, long)]
        cycles: Option<u64>,

        /// Seed for the simulated price walk
        #[arg(short, long, default_value = "7")]
        seed: u64,
    },

    /// Load, validate and print the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(&cli.log_dir)?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::CheckConfig) => {
            log_config(&config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Run { cycles, seed }) => run(config, cycles, seed).await,
        None => run(config, None, 7).await,
    }
}

async fn run(config: Config, cycles: Option<u64>, seed: u64) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║           Maker Hedger v{} - Paper Trading               ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let params = RandomWalkParams {
        tick_size: config.market.tick_size,
        seed,
        ..Default::default()
    };
    let half_spread = params.tick_size * rust_decimal::Decimal::from(params.half_spread_ticks);
    let book = BookTop {
        best_bid: params.start_price - half_spread,
        best_ask: params.start_price + half_spread,
    };

    let maker = Arc::new(SimulatedVenue::new(Venue::Maker, book));
    let hedge = Arc::new(SimulatedVenue::new(Venue::Hedge, book));
    let feed = Arc::new(SimulatedMarketData::random_walk(params).attach_venues(maker.clone(), hedge.clone()));

    let mut engine = StrategyEngine::new(config, feed, maker.clone(), hedge.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        stop_tx.send(true).ok();
    });

    info!("🚀 Starting strategy loop...");
    let metrics = engine.run(stop_rx, cycles).await;

    let positions = engine.positions().await;
    info!(
        maker_position = %positions.net_maker_position,
        hedge_position = %positions.net_hedge_position,
        net_delta = %positions.net_delta(),
        unhedged = %positions.unhedged_exposure,
        "📊 Final positions"
    );
    if !positions.unhedged_exposure.is_zero() {
        warn!("⚠️  Unhedged exposure remains, manual reconciliation required");
    }
    info!(
        "📈 {} cycles, {} fills, {} hedges ok, {} failed, {:.1}% success",
        metrics.cycles,
        metrics.fills,
        metrics.hedge_successes,
        metrics.hedge_failures,
        metrics.hedge_success_rate() * 100.0
    );
    info!("👋 Maker Hedger shutdown complete");

    Ok(())
}

/// Human-readable logs on stdout; JSON lines in an hourly rolling file so
/// `risk_alert` records can be picked out by a log shipper.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::hourly(log_dir, "maker-hedger.log"));

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,maker_hedger=debug"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .with(
            fmt::layer()
                .json()
                .with_current_span(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()?;

    Ok(guard)
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Symbol: {}", config.market.symbol);
    info!("   Tick Size: {}", config.market.tick_size);
    info!(
        "   Offset: {} ticks base, {} max",
        config.quoting.base_offset_ticks, config.quoting.max_offset_ticks
    );
    info!("   Position Size: {}", config.quoting.position_size);
    info!(
        "   Re-quote Threshold: {}%",
        config.quoting.requote_threshold * rust_decimal::Decimal::ONE_HUNDRED
    );
    info!(
        "   Breaker: vol ratio > {}, correlation < {}, cooldown {}s",
        config.circuit_breaker.max_volatility_ratio,
        config.circuit_breaker.min_correlation,
        config.circuit_breaker.cooldown_secs
    );
    info!(
        "   Cycle: {}ms interval, {}ms budget, hedge timeout {}ms",
        config.execution.cycle_interval_ms,
        config.execution.cycle_budget_ms,
        config.execution.hedge_timeout_ms
    );
    info!("   Max Net Delta: {}", config.execution.max_net_delta);
}
