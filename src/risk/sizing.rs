use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SizingError;
use crate::models::{Pattern, Side, SymbolFilters};

/// Decimal places used for quantities when no lot-size metadata is known
pub const FALLBACK_QUANTITY_DP: u32 = 3;

/// Converts a validated signal into concrete order levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSizer {
    pub leverage: u32,
    pub position_size_usdt: f64,     // Margin committed per order
    pub stop_loss_percentage: f64,   // ROI %, leverage-adjusted
    pub take_profit_percentage: f64, // ROI %, leverage-adjusted
    pub entry_price_offset_percent: f64,
}

impl Default for OrderSizer {
    fn default() -> Self {
        Self {
            leverage: 10,
            position_size_usdt: 100.0,
            stop_loss_percentage: 1.0,
            take_profit_percentage: 1.5,
            entry_price_offset_percent: 0.1,
        }
    }
}

/// Everything needed to open an order, before it has an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub symbol: String,
    pub side: Side,
    pub pattern: Pattern,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub position_notional_usdt: f64,
}

impl OrderSizer {
    /// Shift the entry against the expected move: buy a little lower, sell a little higher
    pub fn entry_price(&self, current_price: f64, side: Option<Side>) -> f64 {
        let offset = self.entry_price_offset_percent / 100.0;
        match side {
            Some(Side::Buy) => current_price * (1.0 - offset),
            Some(Side::Sell) => current_price * (1.0 + offset),
            None => current_price,
        }
    }

    /// Stop loss and take profit as (sl, tp)
    ///
    /// The stop always sits on the losing side of the entry, the target on the
    /// winning side. ROI percentages are divided by leverage to get the price move.
    pub fn stop_and_target(&self, entry_price: f64, side: Side) -> (f64, f64) {
        let leverage = self.leverage.max(1) as f64;
        let delta_sl = self.stop_loss_percentage / 100.0 / leverage;
        let delta_tp = self.take_profit_percentage / 100.0 / leverage;

        match side {
            Side::Buy => (entry_price * (1.0 - delta_sl), entry_price * (1.0 + delta_tp)),
            Side::Sell => (entry_price * (1.0 + delta_sl), entry_price * (1.0 - delta_tp)),
        }
    }

    /// Contracts for the configured notional at the configured leverage
    pub fn quantity(
        &self,
        symbol: &str,
        entry_price: f64,
        filters: Option<&SymbolFilters>,
    ) -> Result<f64, SizingError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(SizingError::InvalidPrice {
                symbol: symbol.to_string(),
                price: entry_price,
            });
        }

        let raw = self.position_size_usdt * self.leverage as f64 / entry_price;
        let (quantity, step) = match filters.filter(|f| f.step_size > 0.0) {
            Some(f) => (round_to_increment(raw, f.step_size), f.step_size),
            None => (round_dp(raw, FALLBACK_QUANTITY_DP), 0.001),
        };

        match quantity {
            Some(q) if q > 0.0 => Ok(q),
            _ => Err(SizingError::QuantityTooSmall {
                symbol: symbol.to_string(),
                raw,
                step,
            }),
        }
    }

    /// Build a full order plan from the latest price
    pub fn plan(
        &self,
        symbol: &str,
        pattern: Pattern,
        side: Side,
        current_price: f64,
        filters: Option<&SymbolFilters>,
    ) -> Result<OrderPlan, SizingError> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(SizingError::InvalidPrice {
                symbol: symbol.to_string(),
                price: current_price,
            });
        }

        let tick = filters.map(|f| f.tick_size).filter(|t| *t > 0.0);
        let round_price = |price: f64| match tick {
            Some(t) => round_to_increment(price, t).unwrap_or(price),
            None => price,
        };

        let entry_price = round_price(self.entry_price(current_price, Some(side)));
        let (stop_loss, take_profit) = self.stop_and_target(entry_price, side);
        let (mut stop_loss, mut take_profit) = (round_price(stop_loss), round_price(take_profit));
        let quantity = self.quantity(symbol, entry_price, filters)?;

        // Rounding must never pull a level onto the entry
        if let Some(t) = tick {
            let (sl_below, tp_below) = match side {
                Side::Buy => (true, false),
                Side::Sell => (false, true),
            };
            stop_loss = keep_off_entry(stop_loss, entry_price, t, sl_below);
            take_profit = keep_off_entry(take_profit, entry_price, t, tp_below);
        }
        for level in [stop_loss, take_profit] {
            if !level.is_finite() || level <= 0.0 {
                return Err(SizingError::InvalidPrice {
                    symbol: symbol.to_string(),
                    price: level,
                });
            }
        }

        Ok(OrderPlan {
            symbol: symbol.to_string(),
            side,
            pattern,
            entry_price,
            stop_loss,
            take_profit,
            quantity,
            leverage: self.leverage,
            position_notional_usdt: self.position_size_usdt,
        })
    }
}

/// Round to the nearest multiple of `increment` using exact decimal arithmetic
pub fn round_to_increment(value: f64, increment: f64) -> Option<f64> {
    let value = Decimal::from_f64(value)?;
    let increment = Decimal::from_f64(increment)?;
    if increment <= Decimal::ZERO {
        return value.to_f64();
    }
    ((value / increment).round() * increment).normalize().to_f64()
}

/// Move `level` one tick past `entry` if it is not strictly on its side
fn keep_off_entry(level: f64, entry: f64, tick: f64, below: bool) -> f64 {
    let on_side = if below { level < entry } else { level > entry };
    if on_side {
        return level;
    }
    let (Some(entry_d), Some(tick_d)) = (Decimal::from_f64(entry), Decimal::from_f64(tick)) else {
        return level;
    };
    let moved = if below { entry_d - tick_d } else { entry_d + tick_d };
    moved.normalize().to_f64().unwrap_or(level)
}

fn round_dp(value: f64, dp: u32) -> Option<f64> {
    Decimal::from_f64(value)?.round_dp(dp).to_f64()
}
