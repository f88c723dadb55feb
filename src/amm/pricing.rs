//! Curve pricing, oracle reads and fees.
//!
//! Quotes round in the Amm's favor: when k does not divide evenly the trader
//! receives one unit less, or pays one unit more, than the floored quotient.

use super::core::Amm;
use super::results::AmmError;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::price_feed::{require_fresh, PriceFeed};
use crate::types::{Dir, Timestamp};

/// |spot - oracle| / oracle at or above this is over the spread limit. 10%.
pub const MAX_ORACLE_SPREAD_RATIO: FixedPoint = FixedPoint::from_raw(100_000_000_000_000_000);

const ONE_UNIT: FixedPoint = FixedPoint::from_raw(1);

/// Base bought (quote added) or base owed (quote removed) for `quote_amount`.
pub fn input_price_with_reserves(
    dir_of_quote: Dir,
    quote_amount: FixedPoint,
    quote_reserve: FixedPoint,
    base_reserve: FixedPoint,
) -> Result<FixedPoint, AmmError> {
    if quote_amount.is_zero() {
        return Ok(FixedPoint::ZERO);
    }
    let invariant = quote_reserve.checked_mul(base_reserve)?;
    let quote_after = match dir_of_quote {
        Dir::AddToAmm => quote_reserve.checked_add(quote_amount)?,
        Dir::RemoveFromAmm => {
            if quote_amount >= quote_reserve {
                return Err(AmmError::ReserveExhausted);
            }
            quote_reserve.checked_sub(quote_amount)?
        }
    };
    let (base_after, inexact) = invariant.div_rem(quote_after)?;
    let traded = base_after.abs_diff(base_reserve);
    round_in_amm_favor(traded, inexact, dir_of_quote)
}

/// Quote received (base added) or quote owed (base removed) for `base_amount`.
pub fn output_price_with_reserves(
    dir_of_base: Dir,
    base_amount: FixedPoint,
    quote_reserve: FixedPoint,
    base_reserve: FixedPoint,
) -> Result<FixedPoint, AmmError> {
    if base_amount.is_zero() {
        return Ok(FixedPoint::ZERO);
    }
    let invariant = quote_reserve.checked_mul(base_reserve)?;
    let base_after = match dir_of_base {
        Dir::AddToAmm => base_reserve.checked_add(base_amount)?,
        Dir::RemoveFromAmm => {
            if base_amount >= base_reserve {
                return Err(AmmError::ReserveExhausted);
            }
            base_reserve.checked_sub(base_amount)?
        }
    };
    let (quote_after, inexact) = invariant.div_rem(base_after)?;
    let traded = quote_after.abs_diff(quote_reserve);
    round_in_amm_favor(traded, inexact, dir_of_base)
}

// adding to the Amm means the trader receives the other side: round down.
// removing means the trader owes the other side: round up.
fn round_in_amm_favor(traded: FixedPoint, inexact: bool, dir: Dir) -> Result<FixedPoint, AmmError> {
    if !inexact {
        return Ok(traded);
    }
    match dir {
        Dir::AddToAmm if traded.is_zero() => Ok(traded),
        Dir::AddToAmm => Ok(traded.checked_sub(ONE_UNIT)?),
        Dir::RemoveFromAmm => Ok(traded.checked_add(ONE_UNIT)?),
    }
}

impl Amm {
    pub fn input_price(&self, dir_of_quote: Dir, quote_amount: FixedPoint) -> Result<FixedPoint, AmmError> {
        input_price_with_reserves(dir_of_quote, quote_amount, self.quote_asset_reserve, self.base_asset_reserve)
    }

    pub fn output_price(&self, dir_of_base: Dir, base_amount: FixedPoint) -> Result<FixedPoint, AmmError> {
        output_price_with_reserves(dir_of_base, base_amount, self.quote_asset_reserve, self.base_asset_reserve)
    }

    /// quote reserve / base reserve
    pub fn spot_price(&self) -> Result<FixedPoint, AmmError> {
        Ok(self.quote_asset_reserve.checked_div(self.base_asset_reserve)?)
    }

    /// Latest oracle price. Fails when older than the freshness window.
    pub fn underlying_price(&self, feed: &dyn PriceFeed, now: Timestamp) -> Result<FixedPoint, AmmError> {
        let answer = feed.price(&self.price_feed_key)?;
        Ok(require_fresh(&self.price_feed_key, answer, now, self.oracle_max_age)?)
    }

    pub fn underlying_twap_price(
        &self,
        feed: &dyn PriceFeed,
        interval: u64,
        now: Timestamp,
    ) -> Result<FixedPoint, AmmError> {
        // a stale latest answer poisons the average too
        self.underlying_price(feed, now)?;
        Ok(feed.twap_price(&self.price_feed_key, interval, now)?)
    }

    pub fn is_over_spread_limit(&self, feed: &dyn PriceFeed, now: Timestamp) -> Result<bool, AmmError> {
        let oracle = self.underlying_price(feed, now)?;
        let spread = self.spot_price()?.abs_diff(oracle).checked_div(oracle)?;
        Ok(spread >= MAX_ORACLE_SPREAD_RATIO)
    }

    /// (toll, spread) charged on `notional`.
    pub fn calc_fee(&self, notional: FixedPoint) -> Result<(FixedPoint, FixedPoint), AmmError> {
        if notional.is_zero() {
            return Ok((FixedPoint::ZERO, FixedPoint::ZERO));
        }
        Ok((
            notional.checked_mul(self.toll_ratio)?,
            notional.checked_mul(self.spread_ratio)?,
        ))
    }

    /// Spot price minus oracle price, signed.
    pub fn oracle_premium(&self, feed: &dyn PriceFeed, now: Timestamp) -> Result<SignedFixedPoint, AmmError> {
        let oracle = self.underlying_price(feed, now)?.to_signed()?;
        Ok(self.spot_price()?.to_signed()?.checked_sub(oracle)?)
    }
}
