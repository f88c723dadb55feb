// 6.3 inflation_monitor.rs: protocol token minted to cover fund shortfalls.
// trips the circuit breaker when too much was minted in a trailing window.

use crate::fixed_point::{FixedPoint, MathError};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub timestamp: Timestamp,
    pub amount: FixedPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflationMonitor {
    history: VecDeque<MintRecord>,
    window_secs: u64,
    threshold_ratio: FixedPoint,
}

impl InflationMonitor {
    pub fn new(window_secs: u64, threshold_ratio: FixedPoint) -> Self {
        Self {
            history: VecDeque::new(),
            window_secs,
            threshold_ratio,
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &MintRecord> {
        self.history.iter()
    }

    pub fn record_minted(&mut self, amount: FixedPoint, now: Timestamp) {
        if amount.is_zero() {
            return;
        }
        // records older than the window never count again
        let cutoff = now.saturating_sub(self.window_secs);
        while self.history.front().map_or(false, |r| r.timestamp < cutoff) {
            self.history.pop_front();
        }
        self.history.push_back(MintRecord { timestamp: now, amount });
    }

    /// Sum of mints with `timestamp >= now - window`.
    pub fn minted_in_window(&self, now: Timestamp) -> Result<FixedPoint, MathError> {
        let cutoff = now.saturating_sub(self.window_secs);
        self.history
            .iter()
            .rev()
            .take_while(|r| r.timestamp >= cutoff)
            .try_fold(FixedPoint::ZERO, |acc, r| acc.checked_add(r.amount))
    }

    /// minted / (supply + minted) > threshold
    pub fn is_over_mint_threshold(&self, total_supply: FixedPoint, now: Timestamp) -> Result<bool, MathError> {
        let minted = self.minted_in_window(now)?;
        if minted.is_zero() {
            return Ok(false);
        }
        let ratio = minted.checked_div(total_supply.checked_add(minted)?)?;
        Ok(ratio > self.threshold_ratio)
    }
}
