// 1.0: venue primitives. ids, directions, block clock.
// each id is a newtype so an AmmId can never be passed where an AssetId is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An account on the venue: trader, liquidator, fee pool, the clearing house itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:040x}", self.0)
    }
}

/// Index of an Amm in the clearing house arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AmmId(pub u32);

/// A fungible asset tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

// Long = buy base with quote. Short = sell base for quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Quote direction from the Amm's point of view: longs add quote, shorts remove it.
    pub fn quote_dir(&self) -> Dir {
        match self {
            Side::Long => Dir::AddToAmm,
            Side::Short => Dir::RemoveFromAmm,
        }
    }
}

/// Direction of an asset relative to the Amm's reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dir {
    AddToAmm,
    RemoveFromAmm,
}

impl Dir {
    pub fn opposite(&self) -> Self {
        match self {
            Dir::AddToAmm => Dir::RemoveFromAmm,
            Dir::RemoveFromAmm => Dir::AddToAmm,
        }
    }
}

/// Which price a position is marked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlCalcOption {
    Spot,
    Twap,
    Oracle,
}

/// Pick between spot and TWAP marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlPreference {
    /// the mark that is kinder to the trader
    MaxPnl,
    MinPnl,
}

// 1.2: seconds since epoch. block timestamps are whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn saturating_sub(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    pub fn elapsed_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.0 as i64, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "{}s", self.0),
        }
    }
}

// 1.3: the block every call executes in. transactions in one block share it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: Timestamp,
}

impl BlockInfo {
    pub fn new(number: u64, timestamp: Timestamp) -> Self {
        Self { number, timestamp }
    }

    /// The next block, `seconds` later.
    pub fn next(&self, seconds: u64) -> Self {
        Self {
            number: self.number + 1,
            timestamp: Timestamp(self.timestamp.0 + seconds),
        }
    }
}
