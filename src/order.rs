//! Order types shared by the book, the manager and the wire layer.

use serde::{Deserialize, Serialize};

use crate::price::Price;
use crate::symbol::Symbol;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

/// A resting or in-flight order. `price` is normalised to `Price::ZERO`
/// for Market orders; the sentinel prices used to cross the book during
/// matching never live here.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Price,
    pub quantity: u32,
    pub timestamp: u64,
}

impl Order {
    /// The price used to decide whether this order crosses a resting
    /// level. Market orders get a sentinel that crosses everything on
    /// the opposite side; Limit orders use their own price.
    pub(crate) fn effective_price(&self) -> Price {
        match (self.kind, self.side) {
            (OrderKind::Market, Side::Buy) => Price::MAX_BUY,
            (OrderKind::Market, Side::Sell) => Price::MIN_SELL,
            (OrderKind::Limit, _) => self.price,
        }
    }
}
