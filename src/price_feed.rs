// 9.0 price_feed.rs: the index price source.
//
// The venue never trusts an oracle answer without its update time. Any caller
// that needs the index price goes through `require_fresh`, which rejects answers
// older than the freshness window. `MockPriceFeed` keeps a per-key history so
// the oracle TWAP used for funding can be computed the same way as the Amm's.

use crate::fixed_point::{FixedPoint, MathError};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAnswer {
    pub value: FixedPoint,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("no price available for {0}")]
    NoPriceAvailable(String),

    #[error("stale price feed: {key} last updated {updated_at}, now {now}")]
    Stale {
        key: String,
        updated_at: Timestamp,
        now: Timestamp,
    },

    #[error("underlying price is 0")]
    ZeroPrice,

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Consumed interface of the external oracle.
pub trait PriceFeed: fmt::Debug {
    /// Latest answer for `key`.
    fn price(&self, key: &str) -> Result<PriceAnswer, PriceFeedError>;

    /// Time weighted price over the trailing `interval` seconds ending at `now`.
    fn twap_price(&self, key: &str, interval: u64, now: Timestamp) -> Result<FixedPoint, PriceFeedError>;
}

/// Returns the answer's value if it was updated within `max_age` seconds of `now`.
pub fn require_fresh(
    key: &str,
    answer: PriceAnswer,
    now: Timestamp,
    max_age: u64,
) -> Result<FixedPoint, PriceFeedError> {
    if now.elapsed_since(answer.updated_at) > max_age {
        return Err(PriceFeedError::Stale {
            key: key.to_string(),
            updated_at: answer.updated_at,
            now,
        });
    }
    if answer.value.is_zero() {
        return Err(PriceFeedError::ZeroPrice);
    }
    Ok(answer.value)
}

/// In-memory oracle for tests and the simulator.
#[derive(Debug, Clone)]
pub struct MockPriceFeed {
    feeds: HashMap<String, VecDeque<PriceAnswer>>,
    max_history: usize,
}

impl Default for MockPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self {
            feeds: HashMap::new(),
            max_history: 1_000,
        }
    }

    pub fn set_price(&mut self, key: &str, value: FixedPoint, updated_at: Timestamp) {
        let history = self.feeds.entry(key.to_string()).or_default();
        // answers arrive in time order; a same-second update replaces the last one
        if history.back().is_some_and(|last| last.updated_at == updated_at) {
            history.pop_back();
        }
        history.push_back(PriceAnswer { value, updated_at });
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    pub fn history(&self, key: &str) -> impl Iterator<Item = &PriceAnswer> {
        self.feeds.get(key).into_iter().flatten()
    }
}

impl PriceFeed for MockPriceFeed {
    fn price(&self, key: &str) -> Result<PriceAnswer, PriceFeedError> {
        self.feeds
            .get(key)
            .and_then(|history| history.back())
            .copied()
            .ok_or_else(|| PriceFeedError::NoPriceAvailable(key.to_string()))
    }

    fn twap_price(&self, key: &str, interval: u64, now: Timestamp) -> Result<FixedPoint, PriceFeedError> {
        let latest = self.price(key)?;
        if interval == 0 {
            return Ok(latest.value);
        }
        let history = self.feeds.get(key).map(|h| h.as_slices()).unwrap_or((&[], &[]));
        let samples: Vec<&PriceAnswer> = history
            .0
            .iter()
            .chain(history.1.iter())
            .filter(|answer| answer.updated_at <= now)
            .collect();

        let window_start = now.saturating_sub(interval);
        let mut weighted = FixedPoint::ZERO;
        let mut total_time: u128 = 0;

        for (i, sample) in samples.iter().enumerate() {
            let segment_end = samples.get(i + 1).map(|next| next.updated_at).unwrap_or(now);
            let segment_start = sample.updated_at.max(window_start);
            if segment_end <= segment_start {
                continue;
            }
            let duration = u128::from(segment_end.elapsed_since(segment_start));
            weighted = weighted.checked_add(sample.value.mul_scalar(duration)?)?;
            total_time += duration;
        }

        if total_time == 0 {
            return Ok(latest.value);
        }
        Ok(weighted.div_scalar(total_time)?)
    }
}
