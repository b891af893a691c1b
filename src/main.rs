//! Cross-venue arbitrage scanner entry point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use venue_arb::arbitrage::{FeeSchedule, Opportunity, OpportunityScanner};
use venue_arb::config::Config;
use venue_arb::feed::{venues, ExchangeFeed, FeedRegistry};
use venue_arb::metrics;
use venue_arb::utils::shutdown_signal;

/// Cross-venue crypto arbitrage scanner.
#[derive(Parser, Debug)]
#[command(name = "venue-arb")]
#[command(about = "Scans exchanges for fee-adjusted cross-venue arbitrage")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan continuously until interrupted (default).
    Scan {
        /// Base-asset amount to price opportunities for.
        #[arg(long)]
        amount: Option<Decimal>,

        /// Minimum fee-adjusted profit in percent.
        #[arg(long)]
        min_profit_pct: Option<Decimal>,
    },

    /// Run a single scan and print the ranked opportunities.
    ScanOnce {
        /// Base-asset amount to price opportunities for.
        #[arg(long)]
        amount: Option<Decimal>,

        /// Seconds to let streaming feeds fill their caches first.
        #[arg(long, default_value = "3")]
        warmup: u64,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("venue_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::ScanOnce { amount, warmup }) => cmd_scan_once(amount, warmup).await,
        Some(Command::Scan {
            amount,
            min_profit_pct,
        }) => cmd_scan(amount, min_profit_pct).await,
        None => cmd_scan(None, None).await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Install the Prometheus exporter when enabled.
fn init_exporter(config: &Config) -> anyhow::Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    metrics::init_metrics();
    info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Live feeds owned by the binary.
struct Feeds {
    registry: Arc<FeedRegistry>,
    streaming: HashMap<String, Arc<dyn ExchangeFeed>>,
    scan: Vec<Arc<dyn ExchangeFeed>>,
}

impl Feeds {
    /// Start streaming feeds and wrap REST venues.
    ///
    /// A venue configured for both is scanned through its REST wrapper, which
    /// prefers the stream when `USE_WEBSOCKET_FEED` is set.
    async fn start(config: &Config) -> anyhow::Result<Self> {
        let registry = Arc::new(FeedRegistry::new());
        let streaming = registry.start_all(config).await?;

        let mut scan = Vec::new();
        let mut polled_venues = Vec::new();
        for venue in &config.rest_venues {
            let feed = match venues::polled_feed(venue, config, Some(registry.clone())) {
                Ok(feed) => feed,
                Err(e) => {
                    registry.stop_all(&streaming).await;
                    return Err(e.into());
                }
            };
            polled_venues.push(feed.venue().to_string());
            scan.push(feed);
        }

        let mut stream_only: Vec<_> = streaming
            .iter()
            .filter(|(venue, _)| !polled_venues.contains(venue))
            .collect();
        stream_only.sort_by(|a, b| a.0.cmp(b.0));
        scan.extend(stream_only.into_iter().map(|(_, feed)| feed.clone()));

        info!(
            streaming = ?registry.venues(),
            polled = ?polled_venues,
            "Feeds ready"
        );

        Ok(Self {
            registry,
            streaming,
            scan,
        })
    }

    async fn stop(self) {
        self.registry.stop_all(&self.streaming).await;
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("VENUE ARB - CONFIGURATION CHECK");
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

    print!("Checking fee schedule... ");
    match FeeSchedule::from_config(&config) {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Fee schedule invalid"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Streaming venues: {}", config.stream_venues.join(", "));
    println!("  Stream symbols: {}", config.stream_symbols.join(", "));
    println!("  REST venues: {}", config.rest_venues.join(", "));
    println!("  Scan amount: {}", config.scan_amount);
    println!("  Min profit: {}%", config.min_profit_pct);
    println!("  Default taker fee: {}", config.default_taker_fee);
    println!(
        "  Unknown capability: {}",
        if config.fail_open_on_unknown_capability { "allow" } else { "reject" }
    );
    println!("  Paper mode: {}", config.paper_mode);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Scan once after a short warmup.
async fn cmd_scan_once(amount: Option<Decimal>, warmup: u64) -> anyhow::Result<()> {
    let config = load_config()?;
    init_exporter(&config)?;

    let scanner = OpportunityScanner::from_config(&config).map_err(|e| anyhow::anyhow!(e))?;
    let feeds = Feeds::start(&config).await?;

    if !feeds.streaming.is_empty() {
        info!(seconds = warmup, "Warming up streaming feeds");
        tokio::time::sleep(Duration::from_secs(warmup)).await;
    }

    let (opportunities, report) = scanner
        .scan_with_report(
            &feeds.scan,
            amount.unwrap_or(config.scan_amount),
            config.min_profit_pct,
            config.min_price_diff_pct,
        )
        .await;

    feeds.stop().await;

    info!(report = ?report, "Scan report");
    println!("{}", serde_json::to_string_pretty(&opportunities)?);
    Ok(())
}

/// Scan on an interval until Ctrl-C.
async fn cmd_scan(amount: Option<Decimal>, min_profit_pct: Option<Decimal>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    init_exporter(&config)?;

    let amount = amount.unwrap_or(config.scan_amount);
    let min_profit_pct = min_profit_pct.unwrap_or(config.min_profit_pct);
    let scanner = OpportunityScanner::from_config(&config).map_err(|e| anyhow::anyhow!(e))?;
    let feeds = Feeds::start(&config).await?;

    info!("========================================");
    info!("CROSS-VENUE SCANNER STARTED");
    info!("========================================");
    info!("Feeds: {}", feeds.scan.len());
    info!("Amount: {}", amount);
    info!("Min profit: {}%", min_profit_pct);
    info!("========================================");

    let mut interval = tokio::time::interval(Duration::from_millis(config.scan_interval_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut scan_count = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }
        scan_count += 1;

        let (opportunities, report) = scanner
            .scan_with_report(&feeds.scan, amount, min_profit_pct, config.min_price_diff_pct)
            .await;

        if report.feed_errors == report.feeds && report.feeds > 0 {
            warn!(scan = scan_count, "No feed returned tickers");
        }
        log_opportunities(scan_count, &opportunities);
    }

    info!(scans = scan_count, "Shutting down");
    feeds.stop().await;
    Ok(())
}

fn log_opportunities(scan: u64, opportunities: &[Opportunity]) {
    for (rank, opp) in opportunities.iter().take(10).enumerate() {
        info!(
            scan,
            rank = rank + 1,
            symbol = %opp.symbol,
            buy = %opp.buy_venue,
            sell = %opp.sell_venue,
            buy_price = %opp.buy_price,
            sell_price = %opp.sell_price,
            spread_pct = %opp.raw_spread_pct().round_dp(4),
            profit_pct = %opp.profit_pct.round_dp(4),
            net_profit = %opp.net_profit.round_dp(6),
            ticker_fallback = opp.used_ticker_fallback(),
            "Opportunity"
        );
    }
}
