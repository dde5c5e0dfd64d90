//! ParityDB-backed trade log and candle aggregation.
//!
//! Key layout for trades (big-endian for lexicographic ordering):
//! `"{symbol}:" + ts_nanos(u128) + trade_id(u64)`
//!
//! This guarantees chronological ordering under each `{symbol}:` prefix,
//! with the globally monotonic trade id as a tie-breaker for same-nanosecond
//! fills.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use bincode::config::{self, standard};
use parity_db::{BTreeIterator, ColId, Db, Options};
use std::path::Path;
use thiserror::Error;

use crate::symbol::Symbol;
use crate::trade::Trade;

const TRADES_COL: ColId = 0;
const CANDLES_COL: ColId = 1;

/// Candle bucket widths tracked for every symbol: 1m, 5m, 1h.
const CANDLE_TIMEFRAMES_SECS: [u64; 3] = [60, 300, 3600];

#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    v: u8,
    ts_nanos: u128,
    trade_id: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("bincode encode error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
    #[error("bincode decode error: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),
    #[error("invalid cursor")]
    BadCursor,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, serde::Serialize, bincode::Encode, bincode::Decode)]
pub struct Candle {
    pub symbol: Symbol,
    pub tf_secs: u64,
    pub start_ts_nanos: u128,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

pub struct Store {
    db: Db,
}

impl Store {
    /// Opens (or creates) a ParityDB at `path` with a trades column and a
    /// candles column, both B-tree indexed for prefix scans.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 2);
        opts.columns[TRADES_COL as usize].btree_index = true;
        opts.columns[CANDLES_COL as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Store { db })
    }

    #[inline]
    fn trade_prefix(symbol: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(symbol.len() + 1);
        k.extend_from_slice(symbol.as_bytes());
        k.push(b':');
        k
    }

    #[inline]
    fn trade_key(symbol: &str, ts_nanos: u128, trade_id: u64) -> Vec<u8> {
        let mut key = Self::trade_prefix(symbol);
        key.extend_from_slice(&ts_nanos.to_be_bytes());
        key.extend_from_slice(&trade_id.to_be_bytes());
        key
    }

    #[inline]
    fn candle_key(symbol: &str, tf_secs: u64, start_ts_nanos: u128) -> Vec<u8> {
        let mut key = Self::trade_prefix(symbol);
        key.extend_from_slice(&tf_secs.to_be_bytes());
        key.extend_from_slice(&start_ts_nanos.to_be_bytes());
        key
    }

    #[inline]
    fn cursor_from_trade(t: &Trade) -> Cursor {
        Cursor {
            v: 1,
            ts_nanos: t.timestamp as u128,
            trade_id: t.trade_id,
        }
    }

    #[inline]
    fn encode_cursor(c: &Cursor) -> String {
        B64.encode(serde_json::to_vec(c).unwrap())
    }

    #[inline]
    fn decode_cursor(s: &str) -> StoreResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| StoreError::BadCursor)?;
        let c: Cursor = serde_json::from_slice(&bytes).map_err(|_| StoreError::BadCursor)?;
        if c.v != 1 {
            return Err(StoreError::BadCursor);
        }
        Ok(c)
    }

    /// Inserts a trade and rolls it into every tracked candle timeframe.
    pub fn insert_trade(&mut self, trade: &Trade) -> StoreResult<()> {
        let key = Self::trade_key(trade.symbol.as_str(), trade.timestamp as u128, trade.trade_id);
        let value = bincode::encode_to_vec(trade, standard())?;
        self.db.commit(vec![(TRADES_COL, key, Some(value))])?;
        self.upsert_candles(trade)?;
        Ok(())
    }

    fn upsert_candles(&mut self, trade: &Trade) -> StoreResult<()> {
        let price = trade.price.to_f64();
        for &tf in &CANDLE_TIMEFRAMES_SECS {
            let tf_ns = tf as u128 * 1_000_000_000;
            let start_ts = (trade.timestamp as u128 / tf_ns) * tf_ns;
            let key = Self::candle_key(trade.symbol.as_str(), tf, start_ts);

            let candle = match self.db.get(CANDLES_COL, &key)? {
                Some(bytes) => {
                    let (mut c, _): (Candle, usize) = bincode::decode_from_slice(&bytes, standard())?;
                    c.high = c.high.max(price);
                    c.low = c.low.min(price);
                    c.close = price;
                    c.volume += trade.quantity as u64;
                    c
                }
                None => Candle {
                    symbol: trade.symbol.clone(),
                    tf_secs: tf,
                    start_ts_nanos: start_ts,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: trade.quantity as u64,
                },
            };
            let value = bincode::encode_to_vec(&candle, standard())?;
            self.db.commit(vec![(CANDLES_COL, key, Some(value))])?;
        }
        Ok(())
    }

    /// Pages forward (ascending time) for a symbol, starting strictly
    /// after `after`. Look-ahead pagination: `next` is only `Some` if
    /// another record exists beyond the returned page.
    pub fn page_trade_asc(&self, symbol: &str, after: Option<&str>, limit: usize) -> StoreResult<(Vec<Trade>, Option<String>)> {
        let mut it: BTreeIterator<'_> = self.db.iter(TRADES_COL)?;
        let prefix = Self::trade_prefix(symbol);

        match after {
            None => {
                it.seek(&prefix)?;
            }
            Some(s) => {
                let cursor = Self::decode_cursor(s)?;
                let full = Self::trade_key(symbol, cursor.ts_nanos, cursor.trade_id);
                it.seek(&full)?;
                match it.next()? {
                    Some((k, _)) if k == full => {}
                    _ => return Err(StoreError::BadCursor),
                }
            }
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;
        let mut read = 0usize;

        while read < limit + 1 {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let (trade, _): (Trade, usize) = bincode::decode_from_slice(&v, standard())?;
                    if items.len() < limit {
                        last_cursor = Some(Self::encode_cursor(&Self::cursor_from_trade(&trade)));
                        items.push(trade);
                    }
                    read += 1;
                }
                _ => break,
            }
        }

        let next = if read > limit && !items.is_empty() { last_cursor } else { None };
        Ok((items, next))
    }

    /// Returns every trade for `symbol` with `from_ts <= timestamp <= to_ts`,
    /// in chronological order. Used by `replay`.
    pub fn range_trades(&self, symbol: &str, from_ts: u64, to_ts: u64) -> StoreResult<Vec<Trade>> {
        let mut it = self.db.iter(TRADES_COL)?;
        let prefix = Self::trade_prefix(symbol);
        it.seek(&prefix)?;

        let mut out = Vec::new();
        while let Some((k, v)) = it.next()? {
            if !k.starts_with(&prefix) {
                break;
            }
            let (trade, _): (Trade, usize) = bincode::decode_from_slice(&v, standard())?;
            if trade.timestamp > to_ts {
                break;
            }
            if trade.timestamp >= from_ts {
                out.push(trade);
            }
        }
        Ok(out)
    }

    pub fn delete_trades(&mut self, symbol: &str) -> StoreResult<()> {
        let mut iter = self.db.iter(TRADES_COL)?;
        let prefix = Self::trade_prefix(symbol);
        iter.seek(&prefix)?;

        let mut batch = Vec::new();
        while let Some((key, _)) = iter.next()? {
            if !key.starts_with(&prefix) {
                break;
            }
            batch.push((TRADES_COL, key.to_vec(), None));
        }
        if !batch.is_empty() {
            self.db.commit(batch)?;
        }
        Ok(())
    }

    /// Iterates every stored trade in key order (grouped by symbol,
    /// chronological within a symbol). Used by the standalone replay tool,
    /// which sorts by trade id to recover a single global ordering.
    pub fn iter_trades(&self) -> StoreResult<impl Iterator<Item = Trade>> {
        let config = config::standard();
        let mut iter = self.db.iter(TRADES_COL)?;
        iter.seek_to_first()?;
        Ok(std::iter::from_fn(move || match iter.next() {
            Ok(Some((_key, raw))) => {
                let (decoded, _): (Trade, usize) = bincode::decode_from_slice(&raw[..], config).unwrap();
                Some(decoded)
            }
            _ => None,
        }))
    }
}
