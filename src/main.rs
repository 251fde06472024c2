//! Two-venue arbitrage engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cross_arb::api::{create_router, AppState};
use cross_arb::arbitrage::{ExecutionCoordinator, OpportunityDetector};
use cross_arb::config::Config;
use cross_arb::engine::TradingEngine;
use cross_arb::error::EngineError;
use cross_arb::metrics;
use cross_arb::orderbook::{DepthAnalyzer, OrderBook};
use cross_arb::risk::RiskGovernor;
use cross_arb::session::{JournalSink, JsonlJournal, NullJournal, SessionController, SessionSummary};
use cross_arb::utils::{now_ms, shutdown_signal};
use cross_arb::venue::{BookBuilder, PaperConfig, PaperVenue, VenueAdapter, VenueRegistry};

/// Two-venue hedged arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "cross-arb")]
#[command(about = "Hedged two-venue arbitrage engine")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine against paper venues (default).
    Run {
        /// HTTP server port for health/status/metrics (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start the HTTP server.
        #[arg(long)]
        no_http: bool,

        /// Stop after this many hours (overrides SESSION_DURATION_HOURS).
        #[arg(long)]
        hours: Option<f64>,

        /// Stop after this many trades (overrides SESSION_MAX_TRADES).
        #[arg(long)]
        max_trades: Option<u64>,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("cross_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let fmt_layer = if args.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    // Initialize metrics
    metrics::install_prometheus();
    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Run {
            port,
            no_http,
            hours,
            max_trades,
        }) => cmd_run(RunOptions {
            port,
            http: !no_http,
            hours,
            max_trades,
        })
        .await,
        None => {
            cmd_run(RunOptions {
                port: None,
                http: true,
                hours: None,
                max_trades: None,
            })
            .await
        }
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CROSS-ARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    let fees = config.fee_table();
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Venues: {} / {}", config.left_venue, config.right_venue);
    println!("  Symbols: {}", config.symbol_list().join(", "));
    println!(
        "  Taker fees: {} bps ({}) / {} bps ({})",
        config.left_taker_bps, config.left_leg_kind, config.right_taker_bps, config.right_leg_kind
    );
    println!(
        "  Round-trip taker: {} bps",
        fees.round_trip_taker_bps(&config.left_id(), &config.right_id())
    );
    println!(
        "  Funding: {} ({} bps per 8h over {} min)",
        config.funding_model().name(),
        config.funding_rate_bps_per_8h,
        config.funding_holding_minutes
    );
    println!("  Min edge: {} bps gross, {} bps net", config.min_edge_bps, config.min_net_edge_after_slippage);
    println!("  Max notional: ${} (per order cap ${})", config.max_notional, config.per_order_cap);
    println!("  Leg latency budget: {}ms", config.max_leg_latency_ms);
    println!(
        "  Hedging: cancel_on_partial={} atomic_hedge={}",
        config.cancel_on_partial, config.atomic_hedge
    );
    println!(
        "  Risk: {} losses, ${} daily loss, {}% drawdown",
        config.max_consecutive_losses, config.max_daily_loss, config.max_drawdown_pct
    );
    println!(
        "  Session: {}h / {} trades (0 = unbounded)",
        config.session_duration_hours, config.session_max_trades
    );
    println!(
        "  Journal: {}",
        config.journal_path.as_deref().unwrap_or("disabled")
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

struct RunOptions {
    port: Option<u16>,
    http: bool,
    hours: Option<f64>,
    max_trades: Option<u64>,
}

/// Run the engine against paper venues until a stop condition.
async fn cmd_run(opts: RunOptions) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(hours) = opts.hours {
        config.session_duration_hours = hours;
    }
    if let Some(max_trades) = opts.max_trades {
        config.session_max_trades = max_trades;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }
    info!(
        left = %config.left_venue,
        right = %config.right_venue,
        symbols = ?config.symbol_list(),
        "Configuration loaded successfully"
    );

    // Paper venues
    let left = Arc::new(PaperVenue::with_config(
        config.left_id(),
        PaperConfig {
            latency_ms: 15,
            fee_bps: config.left_taker_bps,
            ..Default::default()
        },
    ));
    let right = Arc::new(PaperVenue::with_config(
        config.right_id(),
        PaperConfig {
            latency_ms: 25,
            fee_bps: config.right_taker_bps,
            ..Default::default()
        },
    ));
    for symbol in config.symbol_list() {
        let mid = seed_price(&symbol);
        left.set_book(paper_book(left.as_ref(), &symbol, mid));
        right.set_book(paper_book(right.as_ref(), &symbol, mid));
    }
    let registry = Arc::new(
        VenueRegistry::new()
            .with(left.clone(), config.left_rules())
            .with(right.clone(), config.right_rules()),
    );

    // Engine components
    let depth = DepthAnalyzer::new(config.depth_config());
    let detector = OpportunityDetector::new(config.detector_config(), config.fee_table(), depth.clone())
        .with_funding(config.funding_model());
    let executor = ExecutionCoordinator::new(
        registry.clone(),
        depth,
        config.fee_table(),
        config.execution_config(),
    );
    let now = now_ms();
    let risk = RiskGovernor::new(config.risk_config(), now);
    let session = SessionController::new(config.session_config(), now);
    let journal: Arc<dyn JournalSink> = match &config.journal_path {
        Some(path) => {
            info!(path = %path, "Journaling to file");
            Arc::new(JsonlJournal::open(path).await?)
        }
        None => Arc::new(NullJournal),
    };

    let engine = TradingEngine::new(
        config.engine_config(),
        registry,
        detector,
        executor,
        risk,
        session,
        journal,
    );

    // HTTP server
    let app_state = AppState::new(&engine.handles());
    if opts.http {
        let port = opts.port.unwrap_or(config.port);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!("HTTP server listening on {}", addr);

        let router = create_router(app_state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });
    }

    // Shutdown on Ctrl+C / SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Move the right venue's prices around so edges open and close
    let drift = tokio::spawn(drift_prices(right.clone(), config.symbol_list()));

    info!("========================================");
    info!("CROSS-VENUE ARBITRAGE ENGINE STARTED");
    info!("========================================");

    app_state.set_ready(true);
    let outcome = engine.run(shutdown_rx).await;
    app_state.set_ready(false);
    drift.abort();

    match outcome {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(EngineError::RiskLimitExceeded(reason)) => {
            warn!(reason = %reason, "Stopped by risk limits; resume required");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Engine stopped");
            Err(e.into())
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    info!("========================================");
    info!("SESSION SUMMARY");
    info!("========================================");
    info!("Duration: {:.1}s", summary.duration_secs);
    info!("Opportunities: {}", summary.opportunities);
    info!(
        "Trades: {} ({} successful, {:.1}%)",
        summary.trades,
        summary.successful_trades,
        summary.success_rate * 100.0
    );
    info!("Total PnL: ${}", summary.total_pnl.round_dp(4));
    info!("Average PnL: ${}", summary.average_pnl.round_dp(4));
    info!("Fees: ${}", summary.total_fees.round_dp(4));
    info!("========================================");
}

/// Starting mid for a paper symbol.
fn seed_price(symbol: &str) -> Decimal {
    match symbol.split('/').next().unwrap_or_default() {
        "BTC" => dec!(60000),
        "ETH" => dec!(3000),
        "SOL" => dec!(150),
        _ => dec!(100),
    }
}

/// Ten levels a side, one bp apart, around `mid`.
fn paper_book(venue: &PaperVenue, symbol: &str, mid: Decimal) -> OrderBook {
    let step = (mid / dec!(10000)).round_dp(2).max(dec!(0.01));
    let size = (dec!(20000) / mid).round_dp(4);
    BookBuilder::new(venue.id().clone(), symbol)
        .ladder(mid - step, mid + step, size, 10, step)
        .build()
}

/// Cycle the venue's mid through a fixed pattern of offsets (in bps).
async fn drift_prices(venue: Arc<PaperVenue>, symbols: Vec<String>) {
    const OFFSETS_BPS: [i64; 8] = [0, 8, 35, 60, 20, -15, -45, -5];
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    for step in (0..OFFSETS_BPS.len()).cycle() {
        ticker.tick().await;
        let offset = Decimal::from(OFFSETS_BPS[step]) / dec!(10000);
        for symbol in &symbols {
            let mid = seed_price(symbol) * (Decimal::ONE + offset);
            venue.set_book(paper_book(&venue, symbol, mid));
        }
    }
}
