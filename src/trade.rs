use serde::{Deserialize, Serialize};

use crate::order::OrderId;
use crate::price::Price;
use crate::symbol::Symbol;

/// A fill produced by the book, before the manager has stamped it with
/// a global trade id. Never leaves the matching layer.
#[derive(Debug, Clone)]
pub struct TradeDraft {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub timestamp: u64,
}

/// A trade stamped with a globally monotonic id by the manager.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: Symbol,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub timestamp: u64,
}
