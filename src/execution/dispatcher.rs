use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

use super::executor::{ExecutionCommand, ExecutionReport};
use super::order_book::{BookSnapshot, Order, OrderBook};
use crate::api::SymbolFilterCache;
use crate::error::SizingError;
use crate::feed::FeedEvent;
use crate::market::{CandleUpdate, SymbolRegistry};
use crate::models::{Candle, OrderStatus};
use crate::risk::OrderSizer;
use crate::strategy::{SignalEngine, SignalValidator};

/// Target for structured domain events
pub const EVENTS_TARGET: &str = "candlebot::events";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchStats {
    pub ticks: u64,
    pub candles: u64,
    pub duplicate_candles: u64,
    pub unknown_symbols: u64,
    pub signals: u64,
    pub rejected_signals: u64,
    pub sizing_failures: u64,
    pub orders_blocked: u64,
    pub orders_opened: u64,
    pub orders_confirmed: u64,
    pub orders_rejected: u64,
    pub orders_closed: u64,
}

/// Single owner of all trading state
///
/// Feed events arrive in queue order; per-symbol FIFO is whatever the reader
/// delivered. Nothing here awaits network I/O: gateway work is handed to the
/// executor through `commands` and comes back as [`ExecutionReport`]s.
pub struct IngestDispatcher {
    registry: SymbolRegistry,
    book: OrderBook,
    engine: SignalEngine,
    validator: SignalValidator,
    sizer: OrderSizer,
    filters: SymbolFilterCache,
    commands: Option<mpsc::UnboundedSender<ExecutionCommand>>,
    snapshots: watch::Sender<BookSnapshot>,
    stats: DispatchStats,
}

impl IngestDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: SymbolRegistry,
        book: OrderBook,
        engine: SignalEngine,
        validator: SignalValidator,
        sizer: OrderSizer,
        filters: SymbolFilterCache,
        commands: mpsc::UnboundedSender<ExecutionCommand>,
        snapshots: watch::Sender<BookSnapshot>,
    ) -> Self {
        Self {
            registry,
            book,
            engine,
            validator,
            sizer,
            filters,
            commands: Some(commands),
            snapshots,
            stats: DispatchStats::default(),
        }
    }

    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Tick {
                symbol,
                price,
                event_time,
            } => self.on_tick(&symbol, price, event_time),
            FeedEvent::CandleClose { symbol, candle } => self.on_candle_close(&symbol, &candle),
        }
    }

    fn on_tick(&mut self, symbol: &str, price: f64, event_time: i64) {
        let Some(state) = self.registry.get_mut(symbol) else {
            self.stats.unknown_symbols += 1;
            return;
        };
        self.stats.ticks += 1;
        state.set_price(price);

        if self.book.has_live_order(symbol) {
            self.check_exit(symbol, price, event_time);
            self.publish();
        }
    }

    fn on_candle_close(&mut self, symbol: &str, candle: &Candle) {
        let Some(state) = self.registry.get_mut(symbol) else {
            self.stats.unknown_symbols += 1;
            tracing::debug!("Ignoring candle for untracked symbol {}", symbol);
            return;
        };

        let reversal = match state.apply_candle(candle) {
            CandleUpdate::Duplicate {
                start_time,
                last_start,
            } => {
                self.stats.duplicate_candles += 1;
                tracing::debug!(
                    "Skipping duplicate candle for {} (start {} <= last {})",
                    symbol,
                    start_time,
                    last_start
                );
                return;
            }
            CandleUpdate::Accepted { reversal } => reversal,
        };
        self.stats.candles += 1;

        let prev_candle = state.prev_candle();
        let average_volume = state.average_volume();
        let current_price = state.current_price().unwrap_or(candle.close);
        let signal = self.engine.select(reversal, candle, prev_candle);
        state.finish_candle(candle);

        // The close is also a price update
        if self.book.has_live_order(symbol) {
            self.check_exit(symbol, candle.close, candle.end_time);
            self.publish();
        }

        let Some(pattern) = signal else {
            return;
        };
        self.stats.signals += 1;
        tracing::info!(
            target: EVENTS_TARGET,
            event = "signal_detected",
            symbol,
            pattern = %pattern,
            close = candle.close,
            volume = candle.volume,
            average_volume,
            "🎯 {} on {}",
            pattern,
            symbol
        );

        if let Err(reason) = self.validator.validate(candle.volume, average_volume, pattern) {
            self.stats.rejected_signals += 1;
            tracing::info!("❌ {} {} rejected: {}", symbol, pattern, reason);
            return;
        }

        if let Err(reason) = self.book.can_open(symbol) {
            self.stats.orders_blocked += 1;
            tracing::info!("⏭️  {} {} skipped: {}", symbol, pattern, reason);
            return;
        }

        let plan = self
            .engine
            .sets()
            .side_for(pattern)
            .ok_or(SizingError::NoDirection { pattern })
            .and_then(|side| {
                let filters = self.filters.get(symbol);
                self.sizer
                    .plan(symbol, pattern, side, current_price, filters.as_ref())
            });
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                self.stats.sizing_failures += 1;
                tracing::warn!("⚠️  Sizing failed for {} {}: {}", symbol, pattern, e);
                return;
            }
        };

        match self.book.open_order_at(plan, candle.end_time) {
            Ok(order) => {
                self.stats.orders_opened += 1;
                tracing::info!(
                    target: EVENTS_TARGET,
                    event = "order_opened",
                    symbol,
                    order_id = %order.order_id,
                    side = %order.side,
                    pattern = %order.pattern,
                    entry = order.entry_price,
                    stop_loss = order.stop_loss,
                    take_profit = order.take_profit,
                    quantity = order.quantity,
                    "📈 Opening {} {} @ {:.6} (SL {:.6}, TP {:.6})",
                    order.side,
                    symbol,
                    order.entry_price,
                    order.stop_loss,
                    order.take_profit
                );
                self.submit(order);
            }
            Err(e) => {
                self.stats.orders_blocked += 1;
                tracing::info!("⏭️  {} {} skipped: {}", symbol, pattern, e);
            }
        }
        self.publish();
    }

    /// Hand a pending order to the executor; without one it can never open
    fn submit(&mut self, order: Order) {
        let (symbol, order_id) = (order.symbol.clone(), order.order_id);
        let sent = match &self.commands {
            Some(tx) => tx.send(ExecutionCommand::Place { order }).is_ok(),
            None => false,
        };

        if !sent {
            tracing::error!("❌ Executor unavailable, dropping pending order for {}", symbol);
            if self.book.reject_order(&symbol, order_id).is_ok() {
                self.stats.orders_rejected += 1;
            }
        }
    }

    fn check_exit(&mut self, symbol: &str, price: f64, time: i64) {
        let Some(order) = self.book.on_price_at(symbol, price, time) else {
            return;
        };
        self.stats.orders_closed += 1;

        let result = order.result.map(|r| r.to_string()).unwrap_or_default();
        tracing::info!(
            target: EVENTS_TARGET,
            event = "order_closed",
            symbol,
            order_id = %order.order_id,
            result = %result,
            close_price = order.close_price.unwrap_or(price),
            pnl_percent = order.pnl_percent,
            pnl_usdt = order.pnl_usdt,
            balance = self.book.balance(),
            "💰 Closed {} {}: {:+.2}% (${:+.2})",
            symbol,
            result,
            order.pnl_percent,
            order.pnl_usdt
        );

        let command = ExecutionCommand::Close {
            symbol: order.symbol.clone(),
            side: order.side.opposite(),
            quantity: order.quantity,
        };
        let sent = self
            .commands
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !sent {
            tracing::error!("❌ Executor unavailable, exchange position for {} left open", symbol);
        }
    }

    pub fn handle_report(&mut self, report: ExecutionReport) {
        match report {
            ExecutionReport::Accepted {
                symbol,
                order_id,
                exchange_order_id,
            } => match self.book.confirm_order(&symbol, order_id, exchange_order_id) {
                Ok(order) => {
                    self.stats.orders_confirmed += 1;
                    tracing::info!("✅ {} order {} is open", symbol, order.order_id);
                }
                Err(e) => tracing::warn!("Stale acceptance for {}: {}", symbol, e),
            },
            ExecutionReport::Rejected {
                symbol,
                order_id,
                reason,
            } => match self.book.reject_order(&symbol, order_id) {
                Ok(_) => {
                    self.stats.orders_rejected += 1;
                    tracing::warn!("❌ {} order rejected by exchange: {}", symbol, reason);
                }
                Err(e) => tracing::warn!("Stale rejection for {}: {}", symbol, e),
            },
            ExecutionReport::CloseFailed { symbol, reason } => {
                // The position may still be open; blocked until reconciled at startup
                tracing::error!(
                    "❌ Failed to flatten {} on exchange, blocking new orders: {}",
                    symbol,
                    reason
                );
                self.book.mark_external(symbol);
            }
        }
        self.publish();
    }

    /// Publish a fresh snapshot for readers; never blocks
    fn publish(&self) {
        let prices: HashMap<String, f64> = self
            .book
            .live_orders()
            .filter_map(|o| {
                let price = self.registry.get(&o.symbol)?.current_price()?;
                Some((o.symbol.clone(), price))
            })
            .collect();

        self.snapshots
            .send_replace(self.book.snapshot(prices, Utc::now().timestamp_millis()));
    }

    /// Consume events and reports until every feed sender is gone
    ///
    /// Shutdown drains: queued events are processed, then the command
    /// channel is closed and the remaining execution reports are applied.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<FeedEvent>,
        mut reports: mpsc::UnboundedReceiver<ExecutionReport>,
    ) -> Self {
        tracing::info!("🚀 Dispatcher started ({} symbols)", self.registry.len());

        loop {
            tokio::select! {
                biased;
                Some(report) = reports.recv() => self.handle_report(report),
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        tracing::info!("Feed closed, waiting for in-flight orders");
        self.commands = None;
        while let Some(report) = reports.recv().await {
            self.handle_report(report);
        }

        let pending: Vec<&str> = self
            .book
            .live_orders()
            .filter(|o| o.status == OrderStatus::Pending)
            .map(|o| o.symbol.as_str())
            .collect();
        if !pending.is_empty() {
            tracing::warn!("⚠️  Unacknowledged orders at shutdown: {:?}", pending);
        }

        self.publish();
        tracing::info!(
            candles = self.stats.candles,
            signals = self.stats.signals,
            opened = self.stats.orders_opened,
            closed = self.stats.orders_closed,
            "🛑 Dispatcher stopped"
        );
        self
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pattern, Side, SymbolFilters, Timeframe, TradeResult};
    use crate::strategy::{shapes::DEFAULT_PRIORITY, PatternSets};

    const MIN: i64 = 60_000;

    struct Harness {
        dispatcher: IngestDispatcher,
        commands: mpsc::UnboundedReceiver<ExecutionCommand>,
        snapshots: watch::Receiver<BookSnapshot>,
    }

    fn harness() -> Harness {
        let (cmd_tx, commands) = mpsc::unbounded_channel();
        let (snap_tx, snapshots) = watch::channel(BookSnapshot::default());
        let mut filters = HashMap::new();
        filters.insert(
            "BTCUSDT".to_string(),
            SymbolFilters {
                tick_size: 0.01,
                step_size: 0.001,
            },
        );

        let dispatcher = IngestDispatcher::new(
            SymbolRegistry::with_symbols(["BTCUSDT", "ETHUSDT"], Timeframe::M5, Timeframe::H1),
            OrderBook::new(1000.0, 4),
            SignalEngine::new(
                PatternSets::new(
                    [Pattern::Hammer, Pattern::InvertedHammer, Pattern::BullishEngulfing],
                    [Pattern::ShootingStar, Pattern::ReversalDown1, Pattern::ReversalDown2],
                ),
                DEFAULT_PRIORITY.to_vec(),
            ),
            SignalValidator::new(50_000.0, 1.5),
            OrderSizer {
                entry_price_offset_percent: 0.0,
                ..OrderSizer::default()
            },
            SymbolFilterCache::with_filters(filters),
            cmd_tx,
            snap_tx,
        );

        Harness {
            dispatcher,
            commands,
            snapshots,
        }
    }

    fn candle_close(symbol: &str, i: i64, ohlc: (f64, f64, f64, f64), volume: f64) -> FeedEvent {
        FeedEvent::CandleClose {
            symbol: symbol.to_string(),
            candle: Candle::new(ohlc.0, ohlc.1, ohlc.2, ohlc.3, volume, i * 5 * MIN, (i + 1) * 5 * MIN - 1)
                .unwrap(),
        }
    }

    fn tick(symbol: &str, price: f64) -> FeedEvent {
        FeedEvent::Tick {
            symbol: symbol.to_string(),
            price,
            event_time: 0,
        }
    }

    const SEED_CANDLES: i64 = 5;

    /// Quiet candles that build a 60k volume average and match nothing
    fn seed(h: &mut Harness, symbol: &str) {
        for i in 0..SEED_CANDLES {
            h.dispatcher
                .handle_event(candle_close(symbol, i, (100.0, 100.6, 99.9, 100.5), 60_000.0));
        }
    }

    // Red hammer closing at 100 with a strong volume spike
    fn hammer(i: i64) -> FeedEvent {
        candle_close("BTCUSDT", i, (100.5, 100.5, 98.0, 100.0), 500_000.0)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutionCommand>) -> Vec<ExecutionCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[test]
    fn test_signal_opens_pending_order_and_submits() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));

        let commands = drain(&mut h.commands);
        assert_eq!(commands.len(), 1);
        let ExecutionCommand::Place { order } = &commands[0] else {
            panic!("expected place, got {:?}", commands[0]);
        };
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.pattern, Pattern::Hammer);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.entry_price, 100.0);
        assert!((order.take_profit - 100.15).abs() < 1e-9);
        assert!((order.stop_loss - 99.9).abs() < 1e-9);
        assert_eq!(h.dispatcher.stats().orders_opened, 1);
        assert_eq!(h.snapshots.borrow().open_orders.len(), 1);
    }

    #[test]
    fn test_duplicate_candle_evaluated_once() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));
        h.dispatcher.handle_event(hammer(SEED_CANDLES));

        assert_eq!(drain(&mut h.commands).len(), 1);
        let stats = h.dispatcher.stats();
        assert_eq!(stats.candles, SEED_CANDLES as u64 + 1);
        assert_eq!(stats.signals, 1);
        assert_eq!(stats.duplicate_candles, 1);
        assert_eq!(
            h.dispatcher.registry().get("BTCUSDT").unwrap().volume_history().count(),
            SEED_CANDLES as usize + 1
        );
    }

    #[test]
    fn test_out_of_order_candle_ignored() {
        let mut h = harness();
        h.dispatcher
            .handle_event(candle_close("ETHUSDT", 5, (10.0, 10.5, 9.9, 10.2), 1.0));
        h.dispatcher
            .handle_event(candle_close("ETHUSDT", 4, (10.0, 10.5, 9.9, 10.2), 1.0));
        assert_eq!(h.dispatcher.stats().duplicate_candles, 1);
    }

    #[test]
    fn test_low_volume_signal_rejected() {
        let mut h = harness();
        h.dispatcher
            .handle_event(candle_close("BTCUSDT", 0, (100.5, 100.5, 98.0, 100.0), 40_000.0));

        assert!(drain(&mut h.commands).is_empty());
        assert_eq!(h.dispatcher.stats().rejected_signals, 1);
        assert!(!h.dispatcher.book().has_live_order("BTCUSDT"));
    }

    #[test]
    fn test_unknown_symbol_ignored() {
        let mut h = harness();
        h.dispatcher
            .handle_event(candle_close("DOGEUSDT", 0, (100.5, 100.5, 98.0, 100.0), 1e6));
        h.dispatcher.handle_event(tick("DOGEUSDT", 1.0));

        assert_eq!(h.dispatcher.stats().unknown_symbols, 2);
        assert!(drain(&mut h.commands).is_empty());
    }

    #[test]
    fn test_accept_then_take_profit_closes() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));
        let ExecutionCommand::Place { order } = drain(&mut h.commands).remove(0) else {
            panic!("expected place");
        };

        // Pending orders ignore price
        h.dispatcher.handle_event(tick("BTCUSDT", 200.0));
        assert!(h.dispatcher.book().has_live_order("BTCUSDT"));

        h.dispatcher.handle_report(ExecutionReport::Accepted {
            symbol: "BTCUSDT".to_string(),
            order_id: order.order_id,
            exchange_order_id: "EX-1".to_string(),
        });
        assert!(h.dispatcher.book().get("BTCUSDT").unwrap().is_open());

        h.dispatcher.handle_event(tick("BTCUSDT", order.take_profit));
        let closed = &h.dispatcher.book().closed_orders()[0];
        assert_eq!(closed.result, Some(TradeResult::Win));
        assert!((closed.pnl_percent - 1.5).abs() < 1e-6);

        let commands = drain(&mut h.commands);
        assert_eq!(
            commands,
            vec![ExecutionCommand::Close {
                symbol: "BTCUSDT".to_string(),
                side: Side::Sell,
                quantity: order.quantity,
            }]
        );
        assert_eq!(h.snapshots.borrow().summary.wins, 1);
    }

    #[test]
    fn test_failed_close_keeps_symbol_blocked() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));
        let ExecutionCommand::Place { order } = drain(&mut h.commands).remove(0) else {
            panic!("expected place");
        };
        h.dispatcher.handle_report(ExecutionReport::Accepted {
            symbol: "BTCUSDT".to_string(),
            order_id: order.order_id,
            exchange_order_id: "EX-1".to_string(),
        });
        h.dispatcher.handle_event(tick("BTCUSDT", order.take_profit));
        assert_eq!(drain(&mut h.commands).len(), 1);

        h.dispatcher.handle_report(ExecutionReport::CloseFailed {
            symbol: "BTCUSDT".to_string(),
            reason: "timeout".to_string(),
        });

        // Another hammer must not stack a second position on the unclosed one
        h.dispatcher.handle_event(hammer(SEED_CANDLES + 1));
        assert!(drain(&mut h.commands).is_empty());
        assert!(!h.dispatcher.book().has_live_order("BTCUSDT"));
        assert_eq!(h.dispatcher.stats().orders_blocked, 1);
    }

    #[test]
    fn test_rejection_frees_symbol() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));
        let ExecutionCommand::Place { order } = drain(&mut h.commands).remove(0) else {
            panic!("expected place");
        };

        h.dispatcher.handle_report(ExecutionReport::Rejected {
            symbol: "BTCUSDT".to_string(),
            order_id: order.order_id,
            reason: "insufficient margin".to_string(),
        });

        assert!(!h.dispatcher.book().has_live_order("BTCUSDT"));
        assert_eq!(h.dispatcher.book().balance(), 1000.0);
        assert_eq!(h.dispatcher.stats().orders_rejected, 1);

        // Next signal can open again
        h.dispatcher.handle_event(hammer(SEED_CANDLES + 1));
        assert_eq!(drain(&mut h.commands).len(), 1);
    }

    #[test]
    fn test_second_signal_blocked_while_live() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        h.dispatcher.handle_event(hammer(SEED_CANDLES));
        h.dispatcher.handle_event(hammer(SEED_CANDLES + 1));

        assert_eq!(drain(&mut h.commands).len(), 1);
        assert_eq!(h.dispatcher.stats().orders_blocked, 1);
    }

    #[test]
    fn test_executor_gone_rejects_pending() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        drop(h.commands);
        h.dispatcher.handle_event(hammer(SEED_CANDLES));

        assert!(!h.dispatcher.book().has_live_order("BTCUSDT"));
        assert_eq!(h.dispatcher.stats().orders_rejected, 1);
    }

    #[test]
    fn test_reversal_pattern_opens_sell() {
        let mut h = harness();
        let volume = 60_000.0;
        // Red, green with long wick, close under its low; flat volume keeps the spike ratio at 1.0
        h.dispatcher
            .handle_event(candle_close("ETHUSDT", 0, (11.0, 11.2, 9.8, 10.0), volume));
        h.dispatcher
            .handle_event(candle_close("ETHUSDT", 1, (10.0, 12.0, 9.5, 11.0), volume));
        h.dispatcher
            .handle_event(candle_close("ETHUSDT", 2, (10.5, 10.6, 9.0, 9.2), volume * 3.0));

        let commands = drain(&mut h.commands);
        assert_eq!(commands.len(), 1);
        let ExecutionCommand::Place { order } = &commands[0] else {
            panic!("expected place");
        };
        assert_eq!(order.pattern, Pattern::ReversalDown1);
        assert_eq!(order.side, Side::Sell);
        assert!(order.stop_loss > order.entry_price);
        assert!(order.take_profit < order.entry_price);
    }

    #[tokio::test]
    async fn test_run_drains_queue_on_close() {
        let mut h = harness();
        seed(&mut h, "BTCUSDT");
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (report_tx, report_rx) = mpsc::unbounded_channel::<ExecutionReport>();
        drop(report_tx);

        feed_tx.send(hammer(SEED_CANDLES)).await.unwrap();
        feed_tx.send(tick("BTCUSDT", 102.1)).await.unwrap();
        drop(feed_tx);

        let dispatcher = h.dispatcher.run(feed_rx, report_rx).await;
        assert_eq!(dispatcher.stats().candles, SEED_CANDLES as u64 + 1);
        assert_eq!(dispatcher.stats().ticks, 1);
        // Never acknowledged, still pending
        assert_eq!(dispatcher.book().pending_orders().len(), 1);
    }
}
