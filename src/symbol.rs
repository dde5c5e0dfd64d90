//! Trading-pair identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_SYMBOL_LEN: usize = 1;
pub const MAX_SYMBOL_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("symbol must be {MIN_SYMBOL_LEN}-{MAX_SYMBOL_LEN} bytes, got {0} bytes")]
pub struct SymbolError(pub usize);

/// An opaque, validated instrument identifier (e.g. `"BTC-USD"`).
///
/// Unlike the donor's `Pair` type this carries no notion of base/quote
/// assets; the engine treats symbols as opaque keys and leaves asset
/// semantics to whatever sits in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, bincode::Encode, bincode::Decode)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl Into<String>) -> Result<Self, SymbolError> {
        let raw = raw.into();
        if raw.len() < MIN_SYMBOL_LEN || raw.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError(raw.len()));
        }
        Ok(Symbol(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Symbol::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_symbol() {
        assert!(Symbol::new("BTC-USD").is_ok());
    }

    #[test]
    fn rejects_empty_symbol() {
        assert_eq!(Symbol::new("").unwrap_err(), SymbolError(0));
    }

    #[test]
    fn rejects_overlong_symbol() {
        let raw = "X".repeat(MAX_SYMBOL_LEN + 1);
        assert!(Symbol::new(raw).is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let sym = Symbol::new("ETH-USD").unwrap();
        let json = serde_json::to_string(&sym).unwrap();
        assert_eq!(json, "\"ETH-USD\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(sym, back);
    }

    #[test]
    fn rejects_invalid_symbol_from_json() {
        let err = serde_json::from_str::<Symbol>("\"\"").unwrap_err();
        assert!(err.to_string().contains("symbol"));
    }
}
