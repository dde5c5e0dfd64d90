//! Marked-order position and realized P&L tracking.
//!
//! Only orders explicitly marked via [`PositionLedger::mark_user_order`]
//! affect a position; trades on unmarked orders are ignored. The pipeline
//! marks every order that passes through it, so a fill between two of the
//! engine's own orders updates both legs of the same symbol's position and
//! nets back to flat — expected for a single-tenant book, not a bug.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;

use crate::order::OrderId;
use crate::price::Price;
use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub qty: i64,
    pub avg_price: f64,
    pub realized_pnl: f64,
}

#[derive(Default)]
struct Inner {
    marked: HashSet<OrderId>,
    positions: HashMap<Symbol, Position>,
}

#[derive(Default)]
pub struct PositionLedger {
    inner: Mutex<Inner>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_user_order(&self, order_id: OrderId) {
        self.inner.lock().unwrap().marked.insert(order_id);
    }

    /// Applies a fill to the position for `symbol` if `order_id` was
    /// marked; a no-op otherwise.
    pub fn record_trade(&self, order_id: OrderId, symbol: &Symbol, is_buy: bool, quantity: u32, price: Price) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.marked.contains(&order_id) {
            return;
        }
        let position = inner.positions.entry(symbol.clone()).or_default();
        if is_buy {
            apply_buy(position, quantity, price.to_f64());
        } else {
            apply_sell(position, quantity, price.to_f64());
        }
    }

    pub fn position(&self, symbol: &Symbol) -> Position {
        self.inner
            .lock()
            .unwrap()
            .positions
            .get(symbol)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<Symbol, Position> {
        self.inner.lock().unwrap().positions.clone()
    }
}

fn apply_buy(pos: &mut Position, qty: u32, price: f64) {
    let qty = qty as i64;
    if pos.qty >= 0 {
        let total_value = pos.avg_price * pos.qty as f64 + price * qty as f64;
        pos.qty += qty;
        pos.avg_price = if pos.qty == 0 { 0.0 } else { total_value / pos.qty as f64 };
    } else {
        let covered = qty.min(-pos.qty);
        pos.realized_pnl += (pos.avg_price - price) * covered as f64;
        pos.qty += covered;
        let remaining = qty - covered;
        if remaining > 0 {
            pos.avg_price = price;
            pos.qty += remaining;
        }
        if pos.qty == 0 {
            pos.avg_price = 0.0;
        }
    }
}

fn apply_sell(pos: &mut Position, qty: u32, price: f64) {
    let qty = qty as i64;
    if pos.qty <= 0 {
        if pos.qty == 0 {
            pos.avg_price = price;
            pos.qty = -qty;
        } else {
            let prev_notional = pos.avg_price * (-pos.qty) as f64;
            let new_notional = prev_notional + price * qty as f64;
            let total_short_qty = -pos.qty + qty;
            pos.avg_price = new_notional / total_short_qty as f64;
            pos.qty = -total_short_qty;
        }
    } else {
        let closed = qty.min(pos.qty);
        pos.realized_pnl += (price - pos.avg_price) * closed as f64;
        pos.qty -= closed;
        let remaining = qty - closed;
        if remaining > 0 {
            pos.avg_price = price;
            pos.qty -= remaining;
        }
        if pos.qty == 0 {
            pos.avg_price = 0.0;
        }
    }
}
