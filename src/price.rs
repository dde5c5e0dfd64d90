//! Fixed-point price representation.
//!
//! Prices are stored internally as integer ticks so book ordering and
//! equality are exact; the wire format is still a plain JSON number.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ticks per unit. A tick is `1 / TICK_SCALE` of whatever quote-currency
/// unit the caller is using (e.g. 1e-8 of a dollar).
pub const TICK_SCALE: f64 = 100_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, bincode::Encode, bincode::Decode)]
pub struct Price(i64);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Sentinel used only while matching a Market buy: crosses every ask.
    /// Never stored in a resting order and never serialized.
    pub(crate) const MAX_BUY: Price = Price(i64::MAX);

    /// Sentinel used only while matching a Market sell: crosses every bid.
    pub(crate) const MIN_SELL: Price = Price(0);

    pub fn from_f64(value: f64) -> Self {
        Price((value * TICK_SCALE).round() as i64)
    }

    pub fn from_ticks(ticks: i64) -> Self {
        Price(ticks)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / TICK_SCALE
    }

    pub fn ticks(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Price::from_f64(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_f64() {
        let p = Price::from_f64(48.5);
        assert_eq!(p.to_f64(), 48.5);
    }

    #[test]
    fn orders_by_ticks_not_float_noise() {
        let a = Price::from_f64(48.0);
        let b = Price::from_f64(48.00000001);
        assert!(b > a);
    }

    #[test]
    fn sentinels_never_lose_to_real_prices() {
        let highest = Price::from_f64(1_000_000.0);
        assert!(Price::MAX_BUY > highest);
        assert!(Price::MIN_SELL < Price::from_f64(0.01));
    }

    #[test]
    fn serializes_as_plain_number() {
        let p = Price::from_f64(52.0);
        assert_eq!(serde_json::to_string(&p).unwrap(), "52.0");
    }
}
