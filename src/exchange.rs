// 9.3 exchange.rs: asset-to-asset conversion used by the insurance fund waterfall.
// only the fund calls this. quotes are AMM-favorable: sells round down, buys round up.

use crate::fixed_point::{FixedPoint, MathError};
use crate::ledger::{self, LedgerError, TokenLedger};
use crate::types::{Address, AssetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("no exchange rate for {0:?}")]
    NoRate(AssetId),

    #[error("swap output {received} below minimum {minimum}")]
    BelowMinimum { received: FixedPoint, minimum: FixedPoint },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Consumed interface of the exchange collaborator.
pub trait Exchange: fmt::Debug {
    /// Units of `to` per unit of `from`.
    fn spot_price(&self, from: AssetId, to: AssetId) -> Result<FixedPoint, ExchangeError>;

    /// `to` received for selling `amount` of `from`.
    fn input_price(&self, from: AssetId, to: AssetId, amount: FixedPoint) -> Result<FixedPoint, ExchangeError>;

    /// `from` needed to receive `amount` of `to`.
    fn output_price(&self, from: AssetId, to: AssetId, amount: FixedPoint) -> Result<FixedPoint, ExchangeError>;

    /// Sells `amount` of `from` held by `trader` and credits the proceeds to `trader`.
    fn swap_input(
        &self,
        ledger: &mut dyn TokenLedger,
        trader: Address,
        from: AssetId,
        to: AssetId,
        amount: FixedPoint,
        min_out: FixedPoint,
    ) -> Result<FixedPoint, ExchangeError>;
}

/// Fixed-rate exchange. Every asset has a price in a common numeraire; swaps burn
/// the sold asset and mint the bought one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixedRateExchange {
    rates: BTreeMap<AssetId, FixedPoint>,
}

impl FixedRateExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, asset: AssetId, price: FixedPoint) -> Self {
        self.set_rate(asset, price);
        self
    }

    pub fn set_rate(&mut self, asset: AssetId, price: FixedPoint) {
        self.rates.insert(asset, price);
    }

    fn rate(&self, asset: AssetId) -> Result<FixedPoint, ExchangeError> {
        match self.rates.get(&asset) {
            Some(rate) if !rate.is_zero() => Ok(*rate),
            _ => Err(ExchangeError::NoRate(asset)),
        }
    }
}

impl Exchange for FixedRateExchange {
    fn spot_price(&self, from: AssetId, to: AssetId) -> Result<FixedPoint, ExchangeError> {
        Ok(self.rate(from)?.checked_div(self.rate(to)?)?)
    }

    fn input_price(&self, from: AssetId, to: AssetId, amount: FixedPoint) -> Result<FixedPoint, ExchangeError> {
        let value = amount.checked_mul(self.rate(from)?)?;
        Ok(value.checked_div(self.rate(to)?)?)
    }

    fn output_price(&self, from: AssetId, to: AssetId, amount: FixedPoint) -> Result<FixedPoint, ExchangeError> {
        let value = amount.mul_ceil(self.rate(to)?)?;
        Ok(value.div_ceil(self.rate(from)?)?)
    }

    fn swap_input(
        &self,
        ledger: &mut dyn TokenLedger,
        trader: Address,
        from: AssetId,
        to: AssetId,
        amount: FixedPoint,
        min_out: FixedPoint,
    ) -> Result<FixedPoint, ExchangeError> {
        let out = self.input_price(from, to, amount)?;
        if out < min_out {
            return Err(ExchangeError::BelowMinimum {
                received: out,
                minimum: min_out,
            });
        }
        ledger::checked_burn(ledger, from, trader, amount)?;
        ledger::checked_mint(ledger, to, trader, out)?;
        tracing::debug!(%trader, ?from, ?to, %amount, %out, "exchange swap");
        Ok(out)
    }
}
