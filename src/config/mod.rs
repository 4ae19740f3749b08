// Bot configuration: file + CANDLEBOT_* environment overrides
use anyhow::{ensure, Context, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::api::OrderType;
use crate::execution::OrderBook;
use crate::feed::ReconnectPolicy;
use crate::models::{Pattern, Timeframe};
use crate::risk::OrderSizer;
use crate::strategy::{shapes::DEFAULT_PRIORITY, PatternSets, SignalEngine, SignalValidator};

pub const DEFAULT_CONFIG_FILE: &str = "config/candlebot";
pub const ENV_PREFIX: &str = "CANDLEBOT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Explicit symbol list; empty means discover when `scan_all_pairs` is set
    pub symbols: Vec<String>,
    pub scan_all_pairs: bool,
    pub timeframe: Timeframe,
    pub higher_timeframe: Timeframe,
    pub account_balance: f64,
    pub report_interval_secs: u64,
    pub log_filter: String,
    pub trading: TradingConfig,
    pub patterns: PatternConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub leverage: u32,
    pub position_size_usdt: f64,
    pub stop_loss_percentage: f64,   // ROI %
    pub take_profit_percentage: f64, // ROI %
    pub entry_price_offset_percent: f64,
    pub max_open_orders: usize,
    pub min_volume: f64,
    pub volume_spike_threshold: f64,
    pub order_type: OrderType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub enabled_bullish: Vec<Pattern>,
    pub enabled_bearish: Vec<Pattern>,
    /// Shape evaluation order, first match wins
    pub priority: Vec<Pattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub ws_base_url: String,
    pub rest_base_url: String,
    pub max_symbols: usize,
    pub max_symbols_per_connection: usize,
    pub subscribe_mark_price: bool,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub queue_capacity: usize,
    pub filter_refresh_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            scan_all_pairs: true,
            timeframe: Timeframe::M5,
            higher_timeframe: Timeframe::H1,
            account_balance: 1000.0,
            report_interval_secs: 30,
            log_filter: "candlebot=info".to_string(),
            trading: TradingConfig::default(),
            patterns: PatternConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: 10,
            position_size_usdt: 100.0,
            stop_loss_percentage: 1.0,
            take_profit_percentage: 1.5,
            entry_price_offset_percent: 0.1,
            max_open_orders: 4,
            min_volume: 50_000.0,
            volume_spike_threshold: 1.5,
            order_type: OrderType::Limit,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled_bullish: vec![
                Pattern::Hammer,
                Pattern::InvertedHammer,
                Pattern::BullishEngulfing,
            ],
            enabled_bearish: vec![
                Pattern::ShootingStar,
                Pattern::BearishEngulfing,
                Pattern::HangingMan,
                Pattern::ReversalDown1,
                Pattern::ReversalDown2,
            ],
            priority: DEFAULT_PRIORITY.to_vec(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "wss://fstream.binance.com".to_string(),
            rest_base_url: "https://fapi.binance.com".to_string(),
            max_symbols: 200,
            max_symbols_per_connection: 50,
            subscribe_mark_price: true,
            reconnect_delay_secs: 5,
            max_reconnect_delay_secs: 60,
            queue_capacity: 10_000,
            filter_refresh_secs: 60,
        }
    }
}

impl BotConfig {
    /// Load from `path` (or the default file if present) plus environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("symbols")
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to build configuration")?;

        let bot_config: BotConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        bot_config.validate()?;
        Ok(bot_config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;
        ensure!(t.leverage > 0, "trading.leverage must be at least 1");
        ensure!(
            t.position_size_usdt > 0.0,
            "trading.position_size_usdt must be positive"
        );
        ensure!(
            t.stop_loss_percentage > 0.0 && t.take_profit_percentage > 0.0,
            "stop loss and take profit percentages must be positive"
        );
        ensure!(
            t.entry_price_offset_percent >= 0.0,
            "trading.entry_price_offset_percent must not be negative"
        );
        ensure!(
            t.min_volume >= 0.0 && t.volume_spike_threshold >= 0.0,
            "volume thresholds must not be negative"
        );
        ensure!(self.account_balance > 0.0, "account_balance must be positive");
        ensure!(
            self.report_interval_secs > 0,
            "report_interval_secs must be positive"
        );

        let bullish: HashSet<Pattern> = self.patterns.enabled_bullish.iter().copied().collect();
        if let Some(both) = self
            .patterns
            .enabled_bearish
            .iter()
            .find(|p| bullish.contains(*p))
        {
            anyhow::bail!("{} is enabled as both bullish and bearish", both);
        }

        let f = &self.feed;
        ensure!(f.queue_capacity > 0, "feed.queue_capacity must be positive");
        ensure!(f.max_symbols > 0, "feed.max_symbols must be positive");
        ensure!(
            f.max_symbols_per_connection > 0,
            "feed.max_symbols_per_connection must be positive"
        );
        ensure!(f.filter_refresh_secs > 0, "feed.filter_refresh_secs must be positive");
        ensure!(
            f.max_reconnect_delay_secs >= f.reconnect_delay_secs,
            "feed.max_reconnect_delay_secs is below feed.reconnect_delay_secs"
        );
        Ok(())
    }

    /// Configured symbols, uppercased and deduplicated in order
    pub fn normalized_symbols(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }

    pub fn sizer(&self) -> OrderSizer {
        OrderSizer {
            leverage: self.trading.leverage,
            position_size_usdt: self.trading.position_size_usdt,
            stop_loss_percentage: self.trading.stop_loss_percentage,
            take_profit_percentage: self.trading.take_profit_percentage,
            entry_price_offset_percent: self.trading.entry_price_offset_percent,
        }
    }

    pub fn validator(&self) -> SignalValidator {
        SignalValidator::new(self.trading.min_volume, self.trading.volume_spike_threshold)
    }

    pub fn engine(&self) -> SignalEngine {
        SignalEngine::new(
            PatternSets::new(
                self.patterns.enabled_bullish.iter().copied(),
                self.patterns.enabled_bearish.iter().copied(),
            ),
            self.patterns.priority.clone(),
        )
    }

    pub fn order_book(&self) -> OrderBook {
        OrderBook::new(self.account_balance, self.trading.max_open_orders)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(self.feed.reconnect_delay_secs),
            max_delay: Duration::from_secs(self.feed.max_reconnect_delay_secs),
            ..ReconnectPolicy::default()
        }
    }
}
