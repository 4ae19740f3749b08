use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::api::ExchangePosition;
use crate::error::OrderError;
use crate::models::{OrderStatus, Pattern, Side, TradeResult};
use crate::risk::OrderPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub position_notional_usdt: f64, // Margin, before leverage
    pub position_value: f64,         // entry * quantity * leverage
    pub pattern: Pattern,
    pub status: OrderStatus,
    pub open_time: i64, // ms
    pub close_time: Option<i64>,
    pub close_price: Option<f64>,
    pub result: Option<TradeResult>,
    pub pnl_percent: f64,
    pub pnl_usdt: f64,
}

impl Order {
    /// Leverage-adjusted ROI % at `price`
    pub fn roi_percent(&self, price: f64) -> f64 {
        let price_diff_percent = match self.side {
            Side::Sell => (self.entry_price - price) / self.entry_price * 100.0,
            Side::Buy => (price - self.entry_price) / self.entry_price * 100.0,
        };
        price_diff_percent * self.leverage as f64
    }

    /// PnL in USDT if closed at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.position_notional_usdt * self.roi_percent(price) / 100.0
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Aggregate statistics over closed orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub total_orders: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl_usdt: f64,
    pub total_percent: f64,
    pub balance: f64,
    pub initial_balance: f64,
    pub open_orders: usize,
}

/// Point-in-time copy of the book for readers outside the dispatcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub open_orders: Vec<Order>,
    pub prices: HashMap<String, f64>,
    pub summary: AccountSummary,
    pub taken_at: i64,
}

/// Order lifecycle manager
///
/// At most one live (pending or open) order per symbol. Orders move
/// PENDING -> OPEN -> CLOSED and never back; closed orders are kept in a log.
pub struct OrderBook {
    live: HashMap<String, Order>,
    closed: Vec<Order>,
    external: HashSet<String>,
    max_open_orders: usize,
    balance: f64,
    initial_balance: f64,
}

impl OrderBook {
    pub fn new(initial_balance: f64, max_open_orders: usize) -> Self {
        Self {
            live: HashMap::new(),
            closed: Vec::new(),
            external: HashSet::new(),
            max_open_orders,
            balance: initial_balance,
            initial_balance,
        }
    }

    /// Check whether a new order could be opened for `symbol`
    pub fn can_open(&self, symbol: &str) -> Result<(), OrderError> {
        if self.live.contains_key(symbol) {
            return Err(OrderError::AlreadyOpen {
                symbol: symbol.to_string(),
            });
        }
        if self.external.contains(symbol) {
            return Err(OrderError::ExternalPosition {
                symbol: symbol.to_string(),
            });
        }
        if self.live_count() >= self.max_open_orders {
            return Err(OrderError::MaxOpenOrders {
                limit: self.max_open_orders,
            });
        }
        Ok(())
    }

    /// Register a new order as pending (live trading - uses current time)
    pub fn open_order(&mut self, plan: OrderPlan) -> Result<Order, OrderError> {
        self.open_order_at(plan, Utc::now().timestamp_millis())
    }

    /// Register a new order as pending with an explicit open time
    pub fn open_order_at(&mut self, plan: OrderPlan, open_time: i64) -> Result<Order, OrderError> {
        self.can_open(&plan.symbol)?;

        let order = Order {
            order_id: Uuid::new_v4(),
            exchange_order_id: None,
            position_value: plan.entry_price * plan.quantity * plan.leverage as f64,
            symbol: plan.symbol,
            side: plan.side,
            entry_price: plan.entry_price,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            quantity: plan.quantity,
            leverage: plan.leverage,
            position_notional_usdt: plan.position_notional_usdt,
            pattern: plan.pattern,
            status: OrderStatus::Pending,
            open_time,
            close_time: None,
            close_price: None,
            result: None,
            pnl_percent: 0.0,
            pnl_usdt: 0.0,
        };

        self.live.insert(order.symbol.clone(), order.clone());
        Ok(order)
    }

    /// Gateway accepted the order: PENDING -> OPEN
    pub fn confirm_order(
        &mut self,
        symbol: &str,
        order_id: Uuid,
        exchange_order_id: String,
    ) -> Result<&Order, OrderError> {
        let order = self.pending_mut(symbol, order_id)?;
        order.status = OrderStatus::Open;
        order.exchange_order_id = Some(exchange_order_id);
        Ok(order)
    }

    /// Gateway refused the order: drop it without touching the balance
    pub fn reject_order(&mut self, symbol: &str, order_id: Uuid) -> Result<Order, OrderError> {
        self.pending_mut(symbol, order_id)?;
        self.live
            .remove(symbol)
            .ok_or_else(|| OrderError::NoPendingOrder {
                symbol: symbol.to_string(),
                order_id: order_id.to_string(),
            })
    }

    fn pending_mut(&mut self, symbol: &str, order_id: Uuid) -> Result<&mut Order, OrderError> {
        self.live
            .get_mut(symbol)
            .filter(|o| o.order_id == order_id && o.status == OrderStatus::Pending)
            .ok_or_else(|| OrderError::NoPendingOrder {
                symbol: symbol.to_string(),
                order_id: order_id.to_string(),
            })
    }

    /// Check take profit then stop loss for the open order on `symbol`
    ///
    /// Returns the outcome and the level that was crossed.
    pub fn check_close_conditions(
        &self,
        symbol: &str,
        current_price: f64,
    ) -> Option<(TradeResult, f64)> {
        let order = self.live.get(symbol).filter(|o| o.is_open())?;

        let take_profit_hit = match order.side {
            Side::Sell => current_price <= order.take_profit,
            Side::Buy => current_price >= order.take_profit,
        };
        if take_profit_hit {
            return Some((TradeResult::Win, order.take_profit));
        }

        let stop_loss_hit = match order.side {
            Side::Sell => current_price >= order.stop_loss,
            Side::Buy => current_price <= order.stop_loss,
        };
        if stop_loss_hit {
            return Some((TradeResult::Loss, order.stop_loss));
        }

        None
    }

    /// Close the open order for `symbol` (live trading - uses current time)
    pub fn close_order(
        &mut self,
        symbol: &str,
        close_price: f64,
        result: TradeResult,
    ) -> Result<Order, OrderError> {
        self.close_order_at(symbol, close_price, result, Utc::now().timestamp_millis())
    }

    /// Close the open order for `symbol` with an explicit close time
    pub fn close_order_at(
        &mut self,
        symbol: &str,
        close_price: f64,
        result: TradeResult,
        close_time: i64,
    ) -> Result<Order, OrderError> {
        if !self.live.get(symbol).is_some_and(Order::is_open) {
            return Err(OrderError::NoOpenOrder {
                symbol: symbol.to_string(),
            });
        }
        let mut order = self
            .live
            .remove(symbol)
            .ok_or_else(|| OrderError::NoOpenOrder {
                symbol: symbol.to_string(),
            })?;

        order.pnl_percent = order.roi_percent(close_price);
        order.pnl_usdt = order.position_notional_usdt * order.pnl_percent / 100.0;
        order.close_price = Some(close_price);
        order.close_time = Some(close_time);
        order.result = Some(result);
        order.status = OrderStatus::Closed;

        self.balance += order.pnl_usdt;
        self.closed.push(order.clone());

        Ok(order)
    }

    /// Run the close check and close on a hit
    pub fn on_price_at(&mut self, symbol: &str, price: f64, time: i64) -> Option<Order> {
        let (result, trigger_price) = self.check_close_conditions(symbol, price)?;
        self.close_order_at(symbol, trigger_price, result, time).ok()
    }

    /// Block new orders on a symbol the exchange already holds a position in
    pub fn mark_external(&mut self, symbol: impl Into<String>) {
        self.external.insert(symbol.into());
    }

    /// Mark every non-flat exchange position as external; returns the blocked symbols
    pub fn reconcile(&mut self, positions: &[ExchangePosition]) -> Vec<String> {
        let blocked: Vec<String> = positions
            .iter()
            .filter(|p| p.amount != 0.0 && !self.live.contains_key(&p.symbol))
            .map(|p| p.symbol.clone())
            .collect();
        for symbol in &blocked {
            self.mark_external(symbol.as_str());
        }
        blocked
    }

    pub fn summary(&self) -> AccountSummary {
        let total_orders = self.closed.len();
        let wins = self
            .closed
            .iter()
            .filter(|o| o.result == Some(TradeResult::Win))
            .count();
        let losses = self
            .closed
            .iter()
            .filter(|o| o.result == Some(TradeResult::Loss))
            .count();
        let win_rate = if total_orders > 0 {
            wins as f64 / total_orders as f64 * 100.0
        } else {
            0.0
        };
        let total_pnl_usdt = self.closed.iter().map(|o| o.pnl_usdt).sum();
        let total_percent = if self.initial_balance != 0.0 {
            (self.balance - self.initial_balance) / self.initial_balance * 100.0
        } else {
            0.0
        };

        AccountSummary {
            total_orders,
            wins,
            losses,
            win_rate,
            total_pnl_usdt,
            total_percent,
            balance: self.balance,
            initial_balance: self.initial_balance,
            open_orders: self.live_count(),
        }
    }

    pub fn snapshot(&self, prices: HashMap<String, f64>, taken_at: i64) -> BookSnapshot {
        let mut open_orders: Vec<Order> = self.live.values().cloned().collect();
        open_orders.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        BookSnapshot {
            open_orders,
            prices,
            summary: self.summary(),
            taken_at,
        }
    }

    /// Pending or open order for `symbol`
    pub fn get(&self, symbol: &str) -> Option<&Order> {
        self.live.get(symbol)
    }

    pub fn has_live_order(&self, symbol: &str) -> bool {
        self.live.contains_key(symbol)
    }

    pub fn live_orders(&self) -> impl Iterator<Item = &Order> {
        self.live.values()
    }

    pub fn pending_orders(&self) -> Vec<&Order> {
        self.live
            .values()
            .filter(|o| o.status == OrderStatus::Pending)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.len() + self.external.len()
    }

    pub fn closed_orders(&self) -> &[Order] {
        &self.closed
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }
}
