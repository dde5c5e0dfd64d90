//! Per-symbol limit order book and matching logic.

use std::collections::{btree_map, BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::order::{Order, OrderId, OrderKind, Side};
use crate::price::Price;
use crate::symbol::Symbol;
use crate::trade::TradeDraft;

pub const DEFAULT_DEPTH_LEVELS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
}

/// Unifies forward and reverse iteration over a price-level map so the
/// matching loop can be written once and reused for both book sides.
enum EitherIter<'a> {
    Fwd(btree_map::IterMut<'a, Price, VecDeque<Order>>),
    Rev(std::iter::Rev<btree_map::IterMut<'a, Price, VecDeque<Order>>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = (&'a Price, &'a mut VecDeque<Order>);
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(iter) => iter.next(),
            EitherIter::Rev(iter) => iter.next(),
        }
    }
}

/// Matches `incoming` against `resting`, stopping as soon as the next
/// best level no longer crosses. `reversed` selects descending iteration
/// (used when `resting` is the bid side).
fn match_resting_side(
    incoming: &mut Order,
    resting: &mut BTreeMap<Price, VecDeque<Order>>,
    order_index: &mut HashMap<OrderId, Price>,
    reversed: bool,
) -> Vec<TradeDraft> {
    let effective_price = incoming.effective_price();
    let mut trades = Vec::new();
    let mut levels_to_remove = Vec::new();

    let iter = if reversed {
        EitherIter::Rev(resting.iter_mut().rev())
    } else {
        EitherIter::Fwd(resting.iter_mut())
    };

    'outer: for (&level_price, queue) in iter {
        let crosses = match incoming.side {
            Side::Buy => effective_price >= level_price,
            Side::Sell => effective_price <= level_price,
        };
        if !crosses {
            break;
        }

        while let Some(resting_order) = queue.front_mut() {
            let fill = incoming.quantity.min(resting_order.quantity);
            trades.push(match incoming.side {
                Side::Buy => TradeDraft {
                    buy_order_id: incoming.id,
                    sell_order_id: resting_order.id,
                    price: level_price,
                    quantity: fill,
                    timestamp: incoming.timestamp,
                },
                Side::Sell => TradeDraft {
                    buy_order_id: resting_order.id,
                    sell_order_id: incoming.id,
                    price: level_price,
                    quantity: fill,
                    timestamp: incoming.timestamp,
                },
            });

            incoming.quantity -= fill;
            resting_order.quantity -= fill;

            if resting_order.quantity == 0 {
                order_index.remove(&resting_order.id);
                queue.pop_front();
            }
            if incoming.quantity == 0 {
                break;
            }
        }

        if queue.is_empty() {
            levels_to_remove.push(level_price);
        }
        if incoming.quantity == 0 {
            break 'outer;
        }
    }

    for price in levels_to_remove {
        resting.remove(&price);
    }
    trades
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<(Price, u64)>,
    pub asks: Vec<(Price, u64)>,
}

impl BookSnapshot {
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn of(symbol: Symbol, book: &Book, max_levels: usize) -> Self {
        Self {
            bids: book.depth(Side::Buy, max_levels),
            asks: book.depth(Side::Sell, max_levels),
            symbol,
        }
    }
}

/// Holds the resting buy/sell queues for a single symbol and applies
/// price-time priority matching to incoming orders.
#[derive(Default)]
pub struct Book {
    bids: BTreeMap<Price, VecDeque<Order>>,
    asks: BTreeMap<Price, VecDeque<Order>>,
    order_index: HashMap<OrderId, Price>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches `order` against the opposite side, then rests any
    /// unfilled Limit residual. Market orders never rest.
    pub fn submit(&mut self, mut order: Order) -> Vec<TradeDraft> {
        let trades = match order.side {
            Side::Buy => match_resting_side(&mut order, &mut self.asks, &mut self.order_index, false),
            Side::Sell => match_resting_side(&mut order, &mut self.bids, &mut self.order_index, true),
        };

        if order.kind == OrderKind::Limit && order.quantity > 0 {
            trace!(order_id = order.id, qty = order.quantity, "resting residual");
            self.rest(order);
        }
        trades
    }

    fn rest(&mut self, order: Order) {
        let price = order.price;
        let side = order.side;
        self.order_index.insert(order.id, price);
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        book_side.entry(price).or_default().push_back(order);
    }

    /// Removes a resting order. A stale or already-filled id is reported
    /// as `NotFound`, not an error: the order may simply have traded.
    pub fn cancel(&mut self, order_id: OrderId) -> CancelOutcome {
        let Some(price) = self.order_index.remove(&order_id) else {
            return CancelOutcome::NotFound;
        };
        for book_side in [&mut self.bids, &mut self.asks] {
            if let Some(queue) = book_side.get_mut(&price) {
                if let Some(pos) = queue.iter().position(|o| o.id == order_id) {
                    queue.remove(pos);
                    if queue.is_empty() {
                        book_side.remove(&price);
                    }
                    return CancelOutcome::Cancelled;
                }
            }
        }
        CancelOutcome::NotFound
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b >= a)
    }

    pub fn depth(&self, side: Side, max_levels: usize) -> Vec<(Price, u64)> {
        match side {
            Side::Buy => self
                .bids
                .iter()
                .rev()
                .take(max_levels)
                .map(|(p, q)| (*p, q.iter().map(|o| o.quantity as u64).sum()))
                .collect(),
            Side::Sell => self
                .asks
                .iter()
                .take(max_levels)
                .map(|(p, q)| (*p, q.iter().map(|o| o.quantity as u64).sum()))
                .collect(),
        }
    }

    #[cfg(test)]
    fn rests_at(&self, order_id: OrderId) -> bool {
        self.order_index.contains_key(&order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(id: OrderId, side: Side, price: f64, qty: u32) -> Order {
        Order {
            id,
            symbol: Symbol::new("BTC-USD").unwrap(),
            side,
            kind: OrderKind::Limit,
            price: Price::from_f64(price),
            quantity: qty,
            timestamp: 0,
        }
    }

    fn market(id: OrderId, side: Side, qty: u32) -> Order {
        Order {
            id,
            symbol: Symbol::new("BTC-USD").unwrap(),
            side,
            kind: OrderKind::Market,
            price: Price::ZERO,
            quantity: qty,
            timestamp: 0,
        }
    }

    #[test]
    fn partial_fill_market_buy_walks_multiple_levels() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 101.0, 5));
        book.submit(limit(2, Side::Sell, 102.0, 3));

        let trades = book.submit(market(100, Side::Buy, 6));

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].quantity, 5);
        assert_eq!(trades[0].price.to_f64(), 101.0);
        assert_eq!(trades[1].quantity, 1);
        assert_eq!(trades[1].price.to_f64(), 102.0);
        assert_eq!(book.depth(Side::Sell, 10), vec![(Price::from_f64(102.0), 2)]);
    }

    #[test]
    fn partial_fill_market_sell() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Buy, 100.0, 4));

        let trades = book.submit(market(200, Side::Sell, 10));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 4);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn no_match_for_market_order_on_empty_book() {
        let mut book = Book::new();
        let trades = book.submit(market(300, Side::Buy, 10));
        assert!(trades.is_empty());
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn exact_match_market_order_clears_level() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 100.0, 5));

        let trades = book.submit(market(400, Side::Buy, 5));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 5);
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn limit_order_partial_match_rests_remainder() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 100.0, 5));

        let trades = book.submit(limit(2, Side::Buy, 101.0, 10));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 5);
        assert_eq!(trades[0].price.to_f64(), 100.0);
        assert_eq!(book.depth(Side::Buy, 10), vec![(Price::from_f64(101.0), 5)]);
        assert!(book.rests_at(2));
    }

    #[test]
    fn limit_order_no_match_goes_to_book() {
        let mut book = Book::new();
        let trades = book.submit(limit(10, Side::Buy, 90.0, 8));
        assert!(trades.is_empty());
        assert_eq!(book.depth(Side::Buy, 10), vec![(Price::from_f64(90.0), 8)]);
    }

    #[test]
    fn limit_order_below_best_ask_does_not_cross() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 105.0, 5));

        let trades = book.submit(limit(2, Side::Buy, 90.0, 3));

        assert!(trades.is_empty());
        assert_eq!(book.depth(Side::Buy, 10), vec![(Price::from_f64(90.0), 3)]);
        assert_eq!(book.depth(Side::Sell, 10), vec![(Price::from_f64(105.0), 5)]);
    }

    #[test]
    fn queue_fairness_fifo_fill_order() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 100.0, 4));
        book.submit(limit(2, Side::Sell, 100.0, 6));

        let trades = book.submit(market(3, Side::Buy, 9));

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sell_order_id, 1);
        assert_eq!(trades[0].quantity, 4);
        assert_eq!(trades[1].sell_order_id, 2);
        assert_eq!(trades[1].quantity, 5);
        assert_eq!(book.depth(Side::Sell, 10), vec![(Price::from_f64(100.0), 1)]);
    }

    #[test]
    fn crossing_limit_buy_matches_at_resting_price() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 105.0, 5));

        let trades = book.submit(limit(2, Side::Buy, 110.0, 3));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price.to_f64(), 105.0);
        assert_eq!(trades[0].quantity, 3);
        assert!(book.best_bid().is_none());
        assert_eq!(book.depth(Side::Sell, 10), vec![(Price::from_f64(105.0), 2)]);
    }

    #[test]
    fn crossing_limit_sell_matches_at_resting_price() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Buy, 100.0, 5));

        let trades = book.submit(limit(2, Side::Sell, 90.0, 4));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price.to_f64(), 100.0);
        assert_eq!(trades[0].quantity, 4);
        assert!(book.best_ask().is_none());
        assert_eq!(book.depth(Side::Buy, 10), vec![(Price::from_f64(100.0), 1)]);
    }

    #[test]
    fn cancel_existing_order_prunes_empty_level() {
        let mut book = Book::new();
        book.submit(limit(42, Side::Buy, 101.0, 10));

        assert_eq!(book.cancel(42), CancelOutcome::Cancelled);
        assert!(book.best_bid().is_none());
        assert!(!book.rests_at(42));
    }

    #[test]
    fn cancel_nonexistent_order_reports_not_found() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Sell, 99.0, 5));
        assert_eq!(book.cancel(999), CancelOutcome::NotFound);
    }

    #[test]
    fn book_never_ends_up_crossed() {
        let mut book = Book::new();
        book.submit(limit(1, Side::Buy, 100.0, 5));
        book.submit(limit(2, Side::Sell, 102.0, 5));
        assert!(!book.is_crossed());
    }
}
