//! Single serialization point for all order submissions and cancels.
//!
//! A dedicated worker task owns the [`Manager`] outright; every mutation
//! flows through an MPSC channel so reads and writes never interleave.
//! This also owns the server-assigned order-id counter, persists trades
//! before fanning them out, and drives the position ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::warn;

use crate::book::{BookSnapshot, CancelOutcome, DEFAULT_DEPTH_LEVELS};
use crate::broadcaster::Broadcaster;
use crate::errors::EngineError;
use crate::manager::{Manager, MarketDataEvent};
use crate::order::{Order, OrderId, OrderKind, Side};
use crate::persistence::{Store, StoreError};
use crate::position::PositionLedger;
use crate::price::Price;
use crate::symbol::Symbol;
use crate::trade::Trade;

pub fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
}

pub struct NewOrderRequest {
    pub order_id: Option<OrderId>,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Price,
    pub quantity: u32,
    pub timestamp: Option<u64>,
}

enum Command {
    Submit {
        order: Order,
        respond: oneshot::Sender<Vec<Trade>>,
    },
    Cancel {
        symbol: Symbol,
        order_id: OrderId,
        respond: oneshot::Sender<CancelOutcome>,
    },
    Snapshot {
        symbol: Symbol,
        max_levels: usize,
        respond: oneshot::Sender<BookSnapshot>,
    },
}

struct Worker {
    manager: Manager,
    ledger: Arc<PositionLedger>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<AsyncMutex<Store>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Submit { order, respond } => {
                    let now = now_nanos();
                    let events = self.manager.submit(order, now);
                    let trades = self.finish(events).await;
                    let _ = respond.send(trades);
                }
                Command::Cancel { symbol, order_id, respond } => {
                    let now = now_nanos();
                    let (outcome, events) = self.manager.cancel(&symbol, order_id, now);
                    self.finish(events).await;
                    let _ = respond.send(outcome);
                }
                Command::Snapshot { symbol, max_levels, respond } => {
                    let snapshot = match self.manager.book(&symbol) {
                        Some(book) => BookSnapshot::of(symbol, book, max_levels),
                        None => BookSnapshot::empty(symbol),
                    };
                    let _ = respond.send(snapshot);
                }
            }
        }
    }

    /// Persists every trade, applies it to the position ledger, then
    /// fans all events out to market-data sinks. Persistence failures
    /// are logged, not fatal: the in-memory book remains authoritative.
    async fn finish(&mut self, events: Vec<MarketDataEvent>) -> Vec<Trade> {
        let mut trades = Vec::new();
        for event in &events {
            if let MarketDataEvent::Trade(trade) = event {
                if let Err(e) = self.store.lock().await.insert_trade(trade) {
                    warn!(error = %e, trade_id = trade.trade_id, "failed to persist trade");
                }
                self.ledger.record_trade(trade.buy_order_id, &trade.symbol, true, trade.quantity, trade.price);
                self.ledger.record_trade(trade.sell_order_id, &trade.symbol, false, trade.quantity, trade.price);
                trades.push(trade.clone());
            }
        }
        for event in &events {
            self.broadcaster.publish(event);
        }
        trades
    }
}

#[derive(Clone)]
pub struct SubmissionPipeline {
    tx: mpsc::UnboundedSender<Command>,
    next_order_id: Arc<AtomicU64>,
    pub ledger: Arc<PositionLedger>,
    pub broadcaster: Arc<Broadcaster>,
    pub store: Arc<AsyncMutex<Store>>,
}

impl SubmissionPipeline {
    pub fn spawn(store: Store) -> Self {
        let ledger = Arc::new(PositionLedger::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let store = Arc::new(AsyncMutex::new(store));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            manager: Manager::new(),
            ledger: ledger.clone(),
            broadcaster: broadcaster.clone(),
            store: store.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            next_order_id: Arc::new(AtomicU64::new(1)),
            ledger,
            broadcaster,
            store,
        }
    }

    pub async fn submit(&self, request: NewOrderRequest) -> Result<(OrderId, Vec<Trade>), EngineError> {
        if request.quantity == 0 {
            return Err(EngineError::InvalidQuantity);
        }
        if request.kind == OrderKind::Limit && request.price.is_negative() {
            return Err(EngineError::InvalidPrice);
        }

        let order_id = request.order_id.unwrap_or_else(|| self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let order = Order {
            id: order_id,
            symbol: request.symbol,
            side: request.side,
            kind: request.kind,
            price: if request.kind == OrderKind::Market { Price::ZERO } else { request.price },
            quantity: request.quantity,
            timestamp: request.timestamp.unwrap_or_else(now_nanos),
        };

        // Every order that reaches this pipeline belongs to this engine
        // instance's own book-keeping; mark it so fills feed the ledger.
        self.ledger.mark_user_order(order_id);

        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Command::Submit { order, respond })
            .map_err(|_| EngineError::EngineShutDown)?;
        let trades = rx.await.map_err(|_| EngineError::EngineShutDown)?;
        Ok((order_id, trades))
    }

    pub async fn cancel(&self, symbol: Symbol, order_id: OrderId) -> Result<CancelOutcome, EngineError> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel { symbol, order_id, respond })
            .map_err(|_| EngineError::EngineShutDown)?;
        rx.await.map_err(|_| EngineError::EngineShutDown)
    }

    pub async fn book_snapshot(&self, symbol: Symbol) -> Result<BookSnapshot, EngineError> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot {
                symbol,
                max_levels: DEFAULT_DEPTH_LEVELS,
                respond,
            })
            .map_err(|_| EngineError::EngineShutDown)?;
        rx.await.map_err(|_| EngineError::EngineShutDown)
    }

    /// Replays persisted trades for `symbol` in `[from_ts, to_ts]`,
    /// ordered chronologically. Delegates to the store directly: replay
    /// reads history, it doesn't touch the live book.
    pub async fn replay(&self, symbol: &Symbol, from_ts: u64, to_ts: u64) -> Result<Vec<Trade>, StoreError> {
        self.store.lock().await.range_trades(symbol.as_str(), from_ts, to_ts)
    }
}
