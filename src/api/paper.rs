use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::gateway::{ExchangeGateway, ExchangePosition, OrderRequest, OrderType};
use crate::error::GatewayError;
use crate::models::{Side, SymbolFilters};

#[derive(Debug, Default)]
struct PaperState {
    next_id: u64,
    positions: HashMap<String, ExchangePosition>,
    leverage: HashMap<String, u32>,
    orders: Vec<(String, OrderRequest)>,
}

/// Simulated exchange: every valid order fills immediately at its price
///
/// Positions are netted per symbol. Market orders without a price fill at
/// the last recorded mark price (zero if none is known).
#[derive(Debug, Default)]
pub struct PaperGateway {
    filters: HashMap<String, SymbolFilters>,
    state: RwLock<PaperState>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: HashMap<String, SymbolFilters>) -> Self {
        Self {
            filters,
            state: RwLock::new(PaperState::default()),
        }
    }

    /// Seed a position, e.g. to simulate one opened outside the bot
    pub async fn insert_position(&self, position: ExchangePosition) {
        let mut state = self.state.write().await;
        state.positions.insert(position.symbol.clone(), position);
    }

    pub async fn leverage(&self, symbol: &str) -> Option<u32> {
        self.state.read().await.leverage.get(symbol).copied()
    }

    /// Every accepted order as (exchange id, request)
    pub async fn orders(&self) -> Vec<(String, OrderRequest)> {
        self.state.read().await.orders.clone()
    }

    fn check_request(&self, request: &OrderRequest) -> Result<f64, GatewayError> {
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(GatewayError::Rejected(format!(
                "invalid quantity {} for {}",
                request.quantity, request.symbol
            )));
        }
        match (request.order_type, request.price) {
            (OrderType::Limit, None) => Err(GatewayError::Rejected(format!(
                "LIMIT order for {} without price",
                request.symbol
            ))),
            (_, Some(price)) if !price.is_finite() || price <= 0.0 => Err(
                GatewayError::Rejected(format!("invalid price {} for {}", price, request.symbol)),
            ),
            (_, price) => Ok(price.unwrap_or(0.0)),
        }
    }

    fn signed(side: Side, quantity: f64) -> f64 {
        match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, GatewayError> {
        self.filters
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::UnknownSymbol(symbol.to_string()))
    }

    async fn place_order(&self, request: OrderRequest) -> Result<String, GatewayError> {
        let price = self.check_request(&request)?;
        let mut state = self.state.write().await;

        state.next_id += 1;
        let id = format!("PAPER-{}", state.next_id);
        let delta = Self::signed(request.side, request.quantity);

        let position = state
            .positions
            .entry(request.symbol.clone())
            .or_insert_with(|| ExchangePosition {
                symbol: request.symbol.clone(),
                amount: 0.0,
                entry_price: price,
                mark_price: price,
            });
        let fill_price = if price > 0.0 { price } else { position.mark_price };

        // Average in when adding to the same direction
        let new_amount = position.amount + delta;
        if position.amount == 0.0 || position.amount.signum() == delta.signum() {
            let total = position.amount.abs() + delta.abs();
            position.entry_price =
                (position.entry_price * position.amount.abs() + fill_price * delta.abs()) / total;
        }
        position.amount = new_amount;
        position.mark_price = fill_price;
        if position.amount.abs() < f64::EPSILON {
            state.positions.remove(&request.symbol);
        }

        state.orders.push((id.clone(), request));
        Ok(id)
    }

    async fn place_reduce_only_order(
        &self,
        request: OrderRequest,
    ) -> Result<String, GatewayError> {
        self.check_request(&request)?;
        let held = {
            let state = self.state.read().await;
            state.positions.get(&request.symbol).map(|p| p.amount)
        };

        let held = match held {
            Some(amount) if amount != 0.0 => amount,
            _ => {
                return Err(GatewayError::Rejected(format!(
                    "reduce-only order for {} with no position",
                    request.symbol
                )))
            }
        };
        if Self::signed(request.side, 1.0).signum() == held.signum() {
            return Err(GatewayError::Rejected(format!(
                "reduce-only {} order would increase {} position",
                request.side, request.symbol
            )));
        }

        // Never flip the position
        let quantity = request.quantity.min(held.abs());
        self.place_order(OrderRequest {
            quantity,
            ..request
        })
        .await
    }

    async fn cancel_all_open_orders(&self, _symbol: &str) -> Result<(), GatewayError> {
        // Paper fills are immediate, nothing is ever resting
        Ok(())
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, GatewayError> {
        let state = self.state.read().await;
        let mut positions: Vec<ExchangePosition> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        if leverage == 0 {
            return Err(GatewayError::Rejected(format!(
                "leverage must be positive for {}",
                symbol
            )));
        }
        self.state
            .write()
            .await
            .leverage
            .insert(symbol.to_string(), leverage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PaperGateway {
        let mut filters = HashMap::new();
        filters.insert(
            "BTCUSDT".to_string(),
            SymbolFilters {
                tick_size: 0.1,
                step_size: 0.001,
            },
        );
        PaperGateway::with_filters(filters)
    }

    #[test]
    fn test_filters_lookup() {
        let gw = gateway();
        let filters = tokio_test::block_on(gw.get_symbol_filters("BTCUSDT"));
        assert_eq!(filters.unwrap().tick_size, 0.1);
        assert_eq!(
            tokio_test::block_on(gw.get_symbol_filters("DOGEUSDT")),
            Err(GatewayError::UnknownSymbol("DOGEUSDT".to_string()))
        );
    }

    #[tokio::test]
    async fn test_limit_order_opens_position() {
        let gw = gateway();
        let id = gw
            .place_order(OrderRequest::limit("BTCUSDT", Side::Buy, 100.0, 2.0))
            .await
            .unwrap();
        assert_eq!(id, "PAPER-1");

        let positions = gw.get_open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].amount, 2.0);
        assert_eq!(positions[0].entry_price, 100.0);
    }

    #[tokio::test]
    async fn test_invalid_orders_rejected() {
        let gw = gateway();

        let no_price = OrderRequest {
            price: None,
            ..OrderRequest::limit("BTCUSDT", Side::Buy, 100.0, 1.0)
        };
        assert!(matches!(
            gw.place_order(no_price).await,
            Err(GatewayError::Rejected(_))
        ));
        assert!(matches!(
            gw.place_order(OrderRequest::market("BTCUSDT", Side::Buy, 0.0))
                .await,
            Err(GatewayError::Rejected(_))
        ));
        assert!(gw.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_reduce_only_flattens() {
        let gw = gateway();
        gw.place_order(OrderRequest::limit("BTCUSDT", Side::Sell, 100.0, 1.5))
            .await
            .unwrap();

        // Larger than the position: clipped, not flipped
        gw.place_reduce_only_order(OrderRequest::market("BTCUSDT", Side::Buy, 5.0))
            .await
            .unwrap();

        assert!(gw.get_open_positions().await.unwrap().is_empty());
        let orders = gw.orders().await;
        assert_eq!(orders[1].1.quantity, 1.5);
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_rejected() {
        let gw = gateway();
        assert!(gw
            .place_reduce_only_order(OrderRequest::market("BTCUSDT", Side::Sell, 1.0))
            .await
            .is_err());

        gw.place_order(OrderRequest::limit("BTCUSDT", Side::Buy, 100.0, 1.0))
            .await
            .unwrap();
        // Same direction as the position
        assert!(gw
            .place_reduce_only_order(OrderRequest::market("BTCUSDT", Side::Buy, 1.0))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_leverage() {
        let gw = gateway();
        gw.set_leverage("BTCUSDT", 10).await.unwrap();
        assert_eq!(gw.leverage("BTCUSDT").await, Some(10));
        assert!(gw.set_leverage("BTCUSDT", 0).await.is_err());
    }
}
