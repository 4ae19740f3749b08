use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::order_book::Order;
use crate::api::{ExchangeGateway, OrderRequest, OrderType};
use crate::models::Side;

/// Work for the executor task, produced by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionCommand {
    /// Open the pending order on the exchange
    Place { order: Order },
    /// Flatten the position left by a closed order
    Close {
        symbol: String,
        side: Side, // Side of the closing trade
        quantity: f64,
    },
}

/// Outcome of a command, fed back to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionReport {
    Accepted {
        symbol: String,
        order_id: Uuid,
        exchange_order_id: String,
    },
    Rejected {
        symbol: String,
        order_id: Uuid,
        reason: String,
    },
    CloseFailed {
        symbol: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorStats {
    pub placed: u64,
    pub rejected: u64,
    pub closed: u64,
    pub close_failures: u64,
}

/// Sends orders to the exchange gateway
///
/// Placement is attempted once; a failure is reported back and never retried here.
pub struct OrderExecutor<G: ExchangeGateway + ?Sized> {
    gateway: Arc<G>,
    order_type: OrderType,
    stats: ExecutorStats,
}

impl<G: ExchangeGateway + ?Sized> OrderExecutor<G> {
    pub fn new(gateway: Arc<G>, order_type: OrderType) -> Self {
        Self {
            gateway,
            order_type,
            stats: ExecutorStats::default(),
        }
    }

    /// Run one command to completion
    pub async fn execute(&mut self, command: ExecutionCommand) -> Option<ExecutionReport> {
        match command {
            ExecutionCommand::Place { order } => Some(self.place(order).await),
            ExecutionCommand::Close {
                symbol,
                side,
                quantity,
            } => self.close(symbol, side, quantity).await,
        }
    }

    async fn place(&mut self, order: Order) -> ExecutionReport {
        let rejected = |reason: String| ExecutionReport::Rejected {
            symbol: order.symbol.clone(),
            order_id: order.order_id,
            reason,
        };

        if let Err(e) = self.gateway.set_leverage(&order.symbol, order.leverage).await {
            self.stats.rejected += 1;
            return rejected(format!("set leverage failed: {}", e));
        }

        let request = match self.order_type {
            OrderType::Limit => {
                OrderRequest::limit(&order.symbol, order.side, order.entry_price, order.quantity)
            }
            OrderType::Market => OrderRequest::market(&order.symbol, order.side, order.quantity),
        };

        match self.gateway.place_order(request).await {
            Ok(exchange_order_id) => {
                self.stats.placed += 1;
                tracing::info!(
                    "✅ Placed {:?} {} {} x{} @ {:.6} ({})",
                    self.order_type,
                    order.side,
                    order.symbol,
                    order.quantity,
                    order.entry_price,
                    exchange_order_id
                );
                ExecutionReport::Accepted {
                    symbol: order.symbol.clone(),
                    order_id: order.order_id,
                    exchange_order_id,
                }
            }
            Err(e) => {
                self.stats.rejected += 1;
                rejected(e.to_string())
            }
        }
    }

    async fn close(&mut self, symbol: String, side: Side, quantity: f64) -> Option<ExecutionReport> {
        let request = OrderRequest::market(&symbol, side, quantity);
        if let Err(e) = self.gateway.place_reduce_only_order(request).await {
            self.stats.close_failures += 1;
            return Some(ExecutionReport::CloseFailed {
                symbol,
                reason: e.to_string(),
            });
        }

        // Leftover resting orders (unfilled entry limits) go too
        if let Err(e) = self.gateway.cancel_all_open_orders(&symbol).await {
            tracing::warn!("⚠️  Cancel open orders failed for {}: {}", symbol, e);
        }

        self.stats.closed += 1;
        None
    }

    /// Process commands until the channel closes, then return
    ///
    /// Every command received is finished before the next one starts, so
    /// closing the command channel drains cleanly.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ExecutionCommand>,
        reports: mpsc::UnboundedSender<ExecutionReport>,
    ) -> ExecutorStats {
        while let Some(command) = commands.recv().await {
            if let Some(report) = self.execute(command).await {
                if reports.send(report).is_err() {
                    tracing::warn!("Report channel closed, execution result dropped");
                }
            }
        }

        tracing::info!(
            placed = self.stats.placed,
            rejected = self.stats.rejected,
            closed = self.stats.closed,
            "🛑 Executor stopped"
        );
        self.stats
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PaperGateway;
    use crate::execution::OrderBook;
    use crate::models::Pattern;
    use crate::risk::OrderPlan;

    fn pending_order(symbol: &str, quantity: f64) -> Order {
        let mut book = OrderBook::new(1000.0, 4);
        book.open_order_at(
            OrderPlan {
                symbol: symbol.to_string(),
                side: Side::Buy,
                pattern: Pattern::Hammer,
                entry_price: 100.0,
                stop_loss: 99.9,
                take_profit: 100.15,
                quantity,
                leverage: 10,
                position_notional_usdt: 100.0,
            },
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_place_sets_leverage_and_limit_price() {
        let gateway = Arc::new(PaperGateway::new());
        let mut executor = OrderExecutor::new(gateway.clone(), OrderType::Limit);
        let order = pending_order("BTCUSDT", 10.0);

        let report = executor
            .execute(ExecutionCommand::Place {
                order: order.clone(),
            })
            .await;

        assert_eq!(
            report,
            Some(ExecutionReport::Accepted {
                symbol: "BTCUSDT".to_string(),
                order_id: order.order_id,
                exchange_order_id: "PAPER-1".to_string(),
            })
        );
        assert_eq!(gateway.leverage("BTCUSDT").await, Some(10));
        let orders = gateway.orders().await;
        assert_eq!(orders[0].1.price, Some(100.0));
        assert_eq!(orders[0].1.order_type, OrderType::Limit);
    }

    #[tokio::test]
    async fn test_gateway_rejection_reported() {
        let gateway = Arc::new(PaperGateway::new());
        let mut executor = OrderExecutor::new(gateway, OrderType::Market);
        let order = pending_order("BTCUSDT", 0.0);

        let report = executor
            .execute(ExecutionCommand::Place { order })
            .await
            .unwrap();

        assert!(matches!(report, ExecutionReport::Rejected { ref reason, .. } if reason.contains("quantity")));
        assert_eq!(executor.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_close_without_position_reports_failure() {
        let gateway = Arc::new(PaperGateway::new());
        let mut executor = OrderExecutor::new(gateway, OrderType::Market);

        let report = executor
            .execute(ExecutionCommand::Close {
                symbol: "BTCUSDT".to_string(),
                side: Side::Sell,
                quantity: 1.0,
            })
            .await;
        assert!(matches!(report, Some(ExecutionReport::CloseFailed { .. })));
    }

    #[tokio::test]
    async fn test_run_drains_commands_then_exits() {
        let gateway = Arc::new(PaperGateway::new());
        let executor = OrderExecutor::new(gateway.clone(), OrderType::Limit);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();

        cmd_tx
            .send(ExecutionCommand::Place {
                order: pending_order("BTCUSDT", 2.0),
            })
            .unwrap();
        cmd_tx
            .send(ExecutionCommand::Close {
                symbol: "BTCUSDT".to_string(),
                side: Side::Sell,
                quantity: 2.0,
            })
            .unwrap();
        drop(cmd_tx);

        let stats = executor.run(cmd_rx, report_tx).await;
        assert_eq!(stats.placed, 1);
        assert_eq!(stats.closed, 1);

        assert!(matches!(
            report_rx.recv().await,
            Some(ExecutionReport::Accepted { .. })
        ));
        // Sender dropped with the executor
        assert_eq!(report_rx.recv().await, None);
        assert!(gateway.get_open_positions().await.unwrap().is_empty());
    }
}
