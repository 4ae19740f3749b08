// Per-symbol market state
pub mod candle_window;
pub mod symbol_state;

pub use candle_window::CandleWindow;
pub use symbol_state::{CandleUpdate, SymbolState};

use crate::models::Timeframe;
use std::collections::HashMap;

/// Owns the state of every tracked symbol
///
/// Symbols are registered once at startup and never removed.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    states: HashMap<String, SymbolState>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<I, S>(symbols: I, timeframe: Timeframe, higher_timeframe: Timeframe) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for symbol in symbols {
            registry.register(symbol, timeframe, higher_timeframe);
        }
        registry
    }

    /// Add a symbol; a symbol that is already tracked keeps its state
    pub fn register(
        &mut self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        higher_timeframe: Timeframe,
    ) -> &mut SymbolState {
        let symbol = symbol.into();
        self.states
            .entry(symbol.clone())
            .or_insert_with(|| SymbolState::new(symbol, timeframe, higher_timeframe))
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut SymbolState> {
        self.states.get_mut(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.states.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.states.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Last known price for each symbol that has one
    pub fn prices(&self) -> HashMap<String, f64> {
        self.states
            .iter()
            .filter_map(|(symbol, state)| state.current_price().map(|p| (symbol.clone(), p)))
            .collect()
    }
}
