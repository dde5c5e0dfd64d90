//! JSON shapes for ingress commands and egress market-data events, kept
//! separate from the domain types so the wire format can evolve without
//! disturbing `Order`/`Trade`/`MarketDataEvent`.

use serde::{Deserialize, Serialize};

use crate::order::{OrderId, OrderKind, Side};
use crate::price::Price;
use crate::symbol::Symbol;
use crate::trade::Trade;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireSide {
    Buy,
    Sell,
}

impl From<WireSide> for Side {
    fn from(value: WireSide) -> Self {
        match value {
            WireSide::Buy => Side::Buy,
            WireSide::Sell => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireKind {
    Limit,
    Market,
}

impl From<WireKind> for OrderKind {
    fn from(value: WireKind) -> Self {
        match value {
            WireKind::Limit => OrderKind::Limit,
            WireKind::Market => OrderKind::Market,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireNewOrder {
    pub symbol: Symbol,
    pub side: WireSide,
    #[serde(rename = "type")]
    pub kind: WireKind,
    #[serde(default)]
    pub price: f64,
    pub quantity: u32,
}

/// The command envelope a transport turns into a pipeline call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum IngressCommand {
    #[serde(rename = "NEW")]
    New { order: WireNewOrder },
    #[serde(rename = "CANCEL")]
    Cancel {
        symbol: Symbol,
        #[serde(rename = "orderId")]
        order_id: OrderId,
    },
    #[serde(rename = "REPLAY")]
    Replay { symbol: Symbol, from: u64, to: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct WireLevel {
    pub price: f64,
    pub qty: u64,
}

impl From<(Price, u64)> for WireLevel {
    fn from((price, qty): (Price, u64)) -> Self {
        WireLevel { price: price.to_f64(), qty }
    }
}

/// Flattened egress event: `{"type": "trade", ...}` or `{"type": "top", ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Trade {
        symbol: Symbol,
        #[serde(rename = "tradeId")]
        trade_id: u64,
        price: f64,
        quantity: u32,
        #[serde(rename = "buyOrderId")]
        buy_order_id: OrderId,
        #[serde(rename = "sellOrderId")]
        sell_order_id: OrderId,
        timestamp: u64,
    },
    Top {
        symbol: Symbol,
        #[serde(rename = "bestBid")]
        best_bid: Option<f64>,
        #[serde(rename = "bestAsk")]
        best_ask: Option<f64>,
        bids: Vec<WireLevel>,
        asks: Vec<WireLevel>,
        timestamp: u64,
    },
}

impl From<&Trade> for WireEvent {
    fn from(trade: &Trade) -> Self {
        WireEvent::Trade {
            symbol: trade.symbol.clone(),
            trade_id: trade.trade_id,
            price: trade.price.to_f64(),
            quantity: trade.quantity,
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            timestamp: trade.timestamp,
        }
    }
}

/// Builds the egress representation for a [`MarketDataEvent`]. A
/// `TopChanged` event needs the current book depth, which the event
/// itself doesn't carry, so the caller supplies it.
pub fn trade_event(trade: &Trade) -> WireEvent {
    WireEvent::from(trade)
}

pub fn top_event(event: &crate::manager::TopChangedEvent, bids: Vec<(Price, u64)>, asks: Vec<(Price, u64)>) -> WireEvent {
    WireEvent::Top {
        symbol: event.symbol.clone(),
        best_bid: event.best_bid.map(Price::to_f64),
        best_ask: event.best_ask.map(Price::to_f64),
        bids: bids.into_iter().map(WireLevel::from).collect(),
        asks: asks.into_iter().map(WireLevel::from).collect(),
        timestamp: event.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_order_envelope() {
        let raw = r#"{"cmd":"NEW","order":{"symbol":"BTC-USD","side":"BUY","type":"LIMIT","price":48.5,"quantity":10}}"#;
        let cmd: IngressCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            IngressCommand::New { order } => {
                assert_eq!(order.symbol.as_str(), "BTC-USD");
                assert!(matches!(order.side, WireSide::Buy));
                assert!(matches!(order.kind, WireKind::Limit));
                assert_eq!(order.price, 48.5);
                assert_eq!(order.quantity, 10);
            }
            _ => panic!("expected New"),
        }
    }

    #[test]
    fn parses_cancel_envelope() {
        let raw = r#"{"cmd":"CANCEL","symbol":"BTC-USD","orderId":7}"#;
        let cmd: IngressCommand = serde_json::from_str(raw).unwrap();
        assert!(matches!(cmd, IngressCommand::Cancel { order_id: 7, .. }));
    }

    #[test]
    fn trade_event_serializes_flat_with_type_tag() {
        let trade = Trade {
            trade_id: 1,
            symbol: Symbol::new("BTC-USD").unwrap(),
            buy_order_id: 1,
            sell_order_id: 2,
            price: Price::from_f64(48.0),
            quantity: 3,
            timestamp: 100,
        };
        let value = serde_json::to_value(trade_event(&trade)).unwrap();
        assert_eq!(value["type"], "trade");
        assert_eq!(value["tradeId"], 1);
        assert_eq!(value["buyOrderId"], 1);
    }
}
