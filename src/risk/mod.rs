// Order sizing and price levels
pub mod sizing;

pub use sizing::{OrderPlan, OrderSizer};
