use anyhow::{Context, Result};
use candlebot::api::filter_cache::run_filter_refresh;
use candlebot::api::{BinanceRestClient, ExchangeGateway, PaperGateway, SymbolFilterCache};
use candlebot::config::BotConfig;
use candlebot::execution::{
    report_lines, run_reporter, BookSnapshot, IngestDispatcher, OrderBook, OrderExecutor,
};
use candlebot::feed::{
    batch, kline_streams, run_feed_reader, BinanceWsConnector, MARK_PRICE_STREAM,
};
use candlebot::market::SymbolRegistry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// Used when no symbols are configured and discovery fails
const FALLBACK_SYMBOLS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "XRPUSDT", "DOGEUSDT", "SOLUSDT",
];

#[derive(Parser, Debug)]
#[command(name = "candlebot")]
#[command(about = "Candlestick pattern trading bot for Binance USDT perpetuals")]
struct Cli {
    /// Config file (TOML/YAML/JSON); defaults to config/candlebot.* if present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated symbols, overrides the configured list
    #[arg(short, long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Log filter directive, e.g. "candlebot=debug"
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = BotConfig::load(cli.config.as_deref())?;
    if let Some(symbols) = cli.symbols {
        config.symbols = symbols;
    }
    setup_logging(cli.log_filter.as_deref(), &config.log_filter);

    tracing::info!("🚀 Candlebot starting");

    let rest = BinanceRestClient::new(config.feed.rest_base_url.clone())?;
    let symbols = resolve_symbols(&config, &rest).await?;

    let filters = SymbolFilterCache::new();
    match filters.refresh(&rest).await {
        Ok(count) => tracing::info!("✅ Loaded filters for {} symbols", count),
        Err(e) => tracing::warn!(
            "⚠️  Could not load symbol filters ({}), quantities fall back to 3 decimals",
            e
        ),
    }

    let gateway = Arc::new(PaperGateway::with_filters(filters.entries()));
    let mut book = config.order_book();
    // A fresh paper account holds nothing; with a live gateway this picks up leftovers
    reconcile_positions(gateway.as_ref(), &mut book).await;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Balance: ${:.2}", config.account_balance);
    tracing::info!(
        "  Leverage: {}x | Notional: ${:.2} | SL {}% / TP {}% ROI",
        config.trading.leverage,
        config.trading.position_size_usdt,
        config.trading.stop_loss_percentage,
        config.trading.take_profit_percentage
    );
    tracing::info!("  Max open orders: {}", config.trading.max_open_orders);
    tracing::info!(
        "  Timeframe: {} (context {})",
        config.timeframe,
        config.higher_timeframe
    );
    tracing::info!("  Symbols: {}", symbols.join(", "));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (feed_tx, feed_rx) = mpsc::channel(config.feed.queue_capacity);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let (snap_tx, snap_rx) = watch::channel(BookSnapshot::default());

    let registry = SymbolRegistry::with_symbols(
        symbols.iter().cloned(),
        config.timeframe,
        config.higher_timeframe,
    );
    let dispatcher = IngestDispatcher::new(
        registry,
        book,
        config.engine(),
        config.validator(),
        config.sizer(),
        filters.clone(),
        cmd_tx,
        snap_tx,
    );
    let executor = OrderExecutor::new(gateway.clone(), config.trading.order_type);

    tracing::info!("\n🔄 Spawning tasks...");

    let executor_task = tokio::spawn(executor.run(cmd_rx, report_tx));
    let mut dispatcher_task = tokio::spawn(dispatcher.run(feed_rx, report_rx));

    let connector = Arc::new(BinanceWsConnector::new(config.feed.ws_base_url.clone()));
    let policy = config.reconnect_policy();
    let mut groups = batch(
        &kline_streams(&symbols, config.timeframe),
        config.feed.max_symbols_per_connection,
    );
    if config.feed.subscribe_mark_price {
        groups.push(vec![MARK_PRICE_STREAM.to_string()]);
    }

    let readers: Vec<JoinHandle<_>> = groups
        .into_iter()
        .enumerate()
        .map(|(i, streams)| {
            tokio::spawn(run_feed_reader(
                format!("reader-{i}"),
                connector.clone(),
                streams,
                feed_tx.clone(),
                policy.clone(),
                shutdown_rx.clone(),
            ))
        })
        .collect();
    // Readers hold the only senders; the dispatcher drains once they stop
    drop(feed_tx);

    let reporter_task = tokio::spawn(run_reporter(
        snap_rx,
        Duration::from_secs(config.report_interval_secs),
        shutdown_rx.clone(),
    ));
    let refresh_task = tokio::spawn(run_filter_refresh(
        filters,
        rest,
        Duration::from_secs(config.feed.filter_refresh_secs),
        shutdown_rx,
    ));

    tracing::info!("✅ {} feed readers running", readers.len());
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let early_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, draining...");
            None
        }
        result = &mut dispatcher_task => {
            tracing::error!("Dispatcher exited early");
            Some(result)
        }
    };

    shutdown_tx.send_replace(true);

    for reader in readers {
        match reader.await {
            Ok(stats) => tracing::debug!(?stats, "Reader finished"),
            Err(e) => tracing::warn!("Reader task failed: {}", e),
        }
    }

    let dispatcher = match early_exit {
        Some(result) => result,
        None => dispatcher_task.await,
    }
    .context("Dispatcher task failed")?;
    let executor_stats = executor_task.await.context("Executor task failed")?;
    for (name, task) in [("Reporter", reporter_task), ("Filter refresh", refresh_task)] {
        if let Err(e) = task.await {
            tracing::warn!("{} task failed: {}", name, e);
        }
    }

    let snapshot = dispatcher.book().snapshot(
        dispatcher.registry().prices(),
        chrono::Utc::now().timestamp_millis(),
    );
    tracing::info!("\n📋 Final summary:");
    for line in report_lines(&snapshot) {
        tracing::info!("{}", line);
    }
    tracing::info!(
        stats = ?dispatcher.stats(),
        executor = ?executor_stats,
        "👋 Candlebot stopped"
    );
    Ok(())
}

fn setup_logging(cli_filter: Option<&str>, config_filter: &str) {
    let filter = match cli_filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_filter)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn resolve_symbols(config: &BotConfig, rest: &BinanceRestClient) -> Result<Vec<String>> {
    let mut symbols = config.normalized_symbols();
    if symbols.is_empty() {
        if !config.scan_all_pairs {
            anyhow::bail!("No symbols configured and scan_all_pairs is disabled");
        }
        tracing::info!("🔍 Discovering USDT perpetuals...");
        symbols = match rest.usdt_symbols(config.feed.max_symbols).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => {
                tracing::warn!("⚠️  Discovery returned no symbols, using fallback list");
                fallback_symbols()
            }
            Err(e) => {
                tracing::warn!("⚠️  Discovery failed ({}), using fallback list", e);
                fallback_symbols()
            }
        };
    }
    symbols.truncate(config.feed.max_symbols);
    Ok(symbols)
}

fn fallback_symbols() -> Vec<String> {
    FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// Positions already open on the exchange block new orders for that symbol
async fn reconcile_positions(gateway: &dyn ExchangeGateway, book: &mut OrderBook) {
    match gateway.get_open_positions().await {
        Ok(positions) => {
            for symbol in book.reconcile(&positions) {
                tracing::warn!("⚠️  {} has an existing exchange position, skipping it", symbol);
            }
        }
        Err(e) => tracing::warn!("Could not read exchange positions: {}", e),
    }
}
