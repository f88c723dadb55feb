// 3.0.2: errors and result types for Amm operations.

use crate::access::AccessError;
use crate::config::ConfigError;
use crate::fixed_point::{FixedPoint, MathError, SignedFixedPoint};
use crate::price_feed::PriceFeedError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSettlement {
    /// premium × funding period / 1 day, per unit of base
    pub premium_fraction: SignedFixedPoint,
    /// premium fraction / oracle TWAP
    pub funding_rate: SignedFixedPoint,
    pub next_funding_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    #[error("amm was closed")]
    Closed,

    #[error("over trading limit")]
    OverTradingLimit,

    #[error("reserve exhausted")]
    ReserveExhausted,

    #[error("Less than minimal base token: {amount} < {limit}")]
    LessThanMinimalBase { amount: FixedPoint, limit: FixedPoint },

    #[error("More than maximal base token: {amount} > {limit}")]
    MoreThanMaximalBase { amount: FixedPoint, limit: FixedPoint },

    #[error("Less than minimal quote token: {amount} < {limit}")]
    LessThanMinimalQuote { amount: FixedPoint, limit: FixedPoint },

    #[error("More than maximal quote token: {amount} > {limit}")]
    MoreThanMaximalQuote { amount: FixedPoint, limit: FixedPoint },

    #[error("price is already over fluctuation limit")]
    FluctuationLimitAlreadyExceeded,

    #[error("price is over fluctuation limit")]
    FluctuationLimitExceeded,

    #[error("settle funding too early: next funding at {next}, now {now}")]
    FundingTooEarly { next: Timestamp, now: Timestamp },

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
