//! Multi-symbol coordination: owns one [`Book`] per symbol, stamps
//! trades with a global id and detects top-of-book changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::book::{Book, CancelOutcome};
use crate::order::{Order, OrderId};
use crate::price::Price;
use crate::symbol::Symbol;
use crate::trade::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TopOfBook {
    best_bid: Option<Price>,
    best_ask: Option<Price>,
}

#[derive(Debug, Clone)]
pub struct TopChangedEvent {
    pub symbol: Symbol,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub enum MarketDataEvent {
    Trade(Trade),
    TopChanged(TopChangedEvent),
}

/// Routes submissions to the book for the right symbol and stamps
/// resulting fills with a global, monotonically increasing trade id.
/// Books never carry a trade id field; only the manager does.
pub struct Manager {
    books: HashMap<Symbol, Book>,
    next_trade_id: AtomicU64,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
            next_trade_id: AtomicU64::new(1),
        }
    }

    pub fn book(&self, symbol: &Symbol) -> Option<&Book> {
        self.books.get(symbol)
    }

    fn snapshot_top(&self, symbol: &Symbol) -> TopOfBook {
        self.books
            .get(symbol)
            .map(|b| TopOfBook {
                best_bid: b.best_bid(),
                best_ask: b.best_ask(),
            })
            .unwrap_or_default()
    }

    /// Submits an order and returns every event this submission produced,
    /// in order: all `Trade`s first, then at most one `TopChanged` if the
    /// best bid/ask actually moved.
    pub fn submit(&mut self, order: Order, now: u64) -> Vec<MarketDataEvent> {
        let symbol = order.symbol.clone();
        let before = self.snapshot_top(&symbol);
        let book = self.books.entry(symbol.clone()).or_default();
        let drafts = book.submit(order);

        let mut events = Vec::with_capacity(drafts.len() + 1);
        for draft in drafts {
            let trade_id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
            events.push(MarketDataEvent::Trade(Trade {
                trade_id,
                symbol: symbol.clone(),
                buy_order_id: draft.buy_order_id,
                sell_order_id: draft.sell_order_id,
                price: draft.price,
                quantity: draft.quantity,
                timestamp: draft.timestamp,
            }));
        }

        let after = self.snapshot_top(&symbol);
        if after != before {
            events.push(MarketDataEvent::TopChanged(TopChangedEvent {
                symbol,
                best_bid: after.best_bid,
                best_ask: after.best_ask,
                timestamp: now,
            }));
        }
        events
    }

    pub fn cancel(&mut self, symbol: &Symbol, order_id: OrderId, now: u64) -> (CancelOutcome, Vec<MarketDataEvent>) {
        let before = self.snapshot_top(symbol);
        let outcome = match self.books.get_mut(symbol) {
            Some(book) => book.cancel(order_id),
            None => CancelOutcome::NotFound,
        };
        let after = self.snapshot_top(symbol);
        let mut events = Vec::new();
        if after != before {
            events.push(MarketDataEvent::TopChanged(TopChangedEvent {
                symbol: symbol.clone(),
                best_bid: after.best_bid,
                best_ask: after.best_ask,
                timestamp: now,
            }));
        }
        (outcome, events)
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderKind, Side};

    fn limit(id: OrderId, symbol: &str, side: Side, price: f64, qty: u32) -> Order {
        Order {
            id,
            symbol: Symbol::new(symbol).unwrap(),
            side,
            kind: OrderKind::Limit,
            price: Price::from_f64(price),
            quantity: qty,
            timestamp: 1,
        }
    }

    #[test]
    fn resting_order_emits_only_top_changed() {
        let mut mgr = Manager::new();
        let events = mgr.submit(limit(1, "BTC-USD", Side::Buy, 100.0, 5), 10);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MarketDataEvent::TopChanged(_)));
    }

    #[test]
    fn trades_precede_top_changed_and_carry_global_ids() {
        let mut mgr = Manager::new();
        mgr.submit(limit(1, "BTC-USD", Side::Sell, 100.0, 5), 10);
        mgr.submit(limit(2, "BTC-USD", Side::Sell, 101.0, 5), 11);

        let events = mgr.submit(limit(3, "BTC-USD", Side::Buy, 101.0, 8), 12);

        assert_eq!(events.len(), 3);
        let ids: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                MarketDataEvent::Trade(t) => Some(t.trade_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(matches!(events[2], MarketDataEvent::TopChanged(_)));
    }

    #[test]
    fn symbols_are_fully_independent() {
        let mut mgr = Manager::new();
        mgr.submit(limit(1, "BTC-USD", Side::Buy, 100.0, 5), 1);
        mgr.submit(limit(2, "ETH-USD", Side::Buy, 200.0, 5), 2);

        assert_eq!(mgr.book(&Symbol::new("BTC-USD").unwrap()).unwrap().best_bid(), Some(Price::from_f64(100.0)));
        assert_eq!(mgr.book(&Symbol::new("ETH-USD").unwrap()).unwrap().best_bid(), Some(Price::from_f64(200.0)));
    }

    #[test]
    fn unchanged_top_emits_no_event_on_non_crossing_fill() {
        let mut mgr = Manager::new();
        mgr.submit(limit(1, "BTC-USD", Side::Sell, 100.0, 10), 1);
        mgr.submit(limit(2, "BTC-USD", Side::Sell, 101.0, 10), 2);

        // Partial fill against the non-top level shouldn't move best_ask.
        let events = mgr.submit(limit(3, "BTC-USD", Side::Buy, 100.0, 5), 3);
        assert!(events.iter().any(|e| matches!(e, MarketDataEvent::Trade(_))));
        assert!(!events.iter().any(|e| matches!(e, MarketDataEvent::TopChanged(_))));
    }
}
