use std::time::Duration;
use tokio::sync::watch;

use super::dispatcher::EVENTS_TARGET;
use super::order_book::BookSnapshot;
use crate::feed::reader::stopped;
use crate::models::OrderStatus;

/// Human-readable lines for one report
pub fn report_lines(snapshot: &BookSnapshot) -> Vec<String> {
    let summary = &snapshot.summary;
    let mut lines = vec![format!(
        "📊 Balance ${:.2} ({:+.2}%) | Closed {} (W {} / L {}, win rate {:.1}%) | PnL ${:+.2} | Live {}",
        summary.balance,
        summary.total_percent,
        summary.total_orders,
        summary.wins,
        summary.losses,
        summary.win_rate,
        summary.total_pnl_usdt,
        snapshot.open_orders.len()
    )];

    for order in &snapshot.open_orders {
        let line = match (order.status, snapshot.prices.get(&order.symbol)) {
            (OrderStatus::Open, Some(&price)) => format!(
                "   {} {} | ROI: {:+.2}% | PnL: ${:+.2}",
                order.symbol,
                order.side,
                order.roi_percent(price),
                order.pnl_at(price)
            ),
            (OrderStatus::Pending, _) => {
                format!("   {} {} | pending @ {:.6}", order.symbol, order.side, order.entry_price)
            }
            _ => format!("   {} {} | no price yet", order.symbol, order.side),
        };
        lines.push(line);
    }
    lines
}

/// Log a summary every `period` until shutdown
///
/// Reads the latest published snapshot; never waits on the dispatcher.
pub async fn run_reporter(
    snapshots: watch::Receiver<BookSnapshot>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }

        let snapshot = snapshots.borrow().clone();
        let summary = &snapshot.summary;
        tracing::info!(
            target: EVENTS_TARGET,
            event = "periodic_summary",
            balance = summary.balance,
            total_orders = summary.total_orders,
            wins = summary.wins,
            losses = summary.losses,
            win_rate = summary.win_rate,
            total_pnl_usdt = summary.total_pnl_usdt,
            open_orders = snapshot.open_orders.len(),
            "Periodic summary"
        );
        for line in report_lines(&snapshot) {
            tracing::info!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::OrderBook;
    use crate::models::{Pattern, Side};
    use crate::risk::OrderPlan;
    use std::collections::HashMap;

    fn plan(symbol: &str) -> OrderPlan {
        OrderPlan {
            symbol: symbol.to_string(),
            side: Side::Sell,
            pattern: Pattern::ShootingStar,
            entry_price: 100.0,
            stop_loss: 100.1,
            take_profit: 99.85,
            quantity: 10.0,
            leverage: 10,
            position_notional_usdt: 100.0,
        }
    }

    #[test]
    fn test_report_lines() {
        let mut book = OrderBook::new(1000.0, 4);
        let order = book.open_order_at(plan("BTCUSDT"), 0).unwrap();
        book.confirm_order("BTCUSDT", order.order_id, "EX".into())
            .unwrap();
        book.open_order_at(plan("ETHUSDT"), 0).unwrap();

        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), 99.0);
        let lines = report_lines(&book.snapshot(prices, 0));

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Balance $1000.00"));
        assert!(lines[0].contains("Live 2"));
        assert_eq!(lines[1], "   BTCUSDT SELL | ROI: +10.00% | PnL: $+10.00");
        assert!(lines[2].contains("pending"));
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let (_snap_tx, snap_rx) = watch::channel(BookSnapshot::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_reporter(snap_rx, Duration::from_millis(5), stop_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
