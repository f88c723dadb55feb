//! Reserve-mutating swaps and the per-block fluctuation guard.

use super::core::{Amm, ReserveSnapshot};
use super::results::AmmError;
use crate::access::Role;
use crate::fixed_point::FixedPoint;
use crate::types::{Address, BlockInfo, Dir};

impl Amm {
    /// Trades `quote_amount` of quote against the curve. Returns the base exchanged.
    ///
    /// `base_limit` is a floor on base received when adding quote (long) and a
    /// ceiling on base owed when removing quote (short). Zero disables it.
    pub fn swap_input(
        &mut self,
        caller: Address,
        dir_of_quote: Dir,
        quote_amount: FixedPoint,
        base_limit: FixedPoint,
        can_over_fluctuation_limit: bool,
        block: BlockInfo,
    ) -> Result<FixedPoint, AmmError> {
        self.access.require(Role::CounterParty, caller)?;
        self.require_open()?;
        if quote_amount.is_zero() {
            return Ok(FixedPoint::ZERO);
        }
        if dir_of_quote == Dir::RemoveFromAmm
            && quote_amount > self.quote_asset_reserve.checked_mul(self.trade_limit_ratio)?
        {
            return Err(AmmError::OverTradingLimit);
        }

        let base_amount = self.input_price(dir_of_quote, quote_amount)?;
        if !base_limit.is_zero() {
            match dir_of_quote {
                Dir::AddToAmm if base_amount < base_limit => {
                    return Err(AmmError::LessThanMinimalBase {
                        amount: base_amount,
                        limit: base_limit,
                    });
                }
                Dir::RemoveFromAmm if base_amount > base_limit => {
                    return Err(AmmError::MoreThanMaximalBase {
                        amount: base_amount,
                        limit: base_limit,
                    });
                }
                _ => {}
            }
        }

        self.update_reserve(dir_of_quote, quote_amount, base_amount, can_over_fluctuation_limit, block)?;
        tracing::debug!(
            symbol = %self.symbol,
            dir = ?dir_of_quote,
            quote = %quote_amount,
            base = %base_amount,
            "swap input"
        );
        Ok(base_amount)
    }

    /// Trades `base_amount` of base against the curve. Returns the quote exchanged.
    /// Only closes and liquidations come through here, so the fluctuation override
    /// is always requested.
    ///
    /// `quote_limit` is a floor on quote received when adding base (closing a long)
    /// and a ceiling on quote owed when removing base (closing a short).
    pub fn swap_output(
        &mut self,
        caller: Address,
        dir_of_base: Dir,
        base_amount: FixedPoint,
        quote_limit: FixedPoint,
        block: BlockInfo,
    ) -> Result<FixedPoint, AmmError> {
        self.access.require(Role::CounterParty, caller)?;
        self.require_open()?;
        if base_amount.is_zero() {
            return Ok(FixedPoint::ZERO);
        }
        if dir_of_base == Dir::RemoveFromAmm
            && base_amount > self.base_asset_reserve.checked_mul(self.trade_limit_ratio)?
        {
            return Err(AmmError::OverTradingLimit);
        }

        let quote_amount = self.output_price(dir_of_base, base_amount)?;
        let dir_of_quote = dir_of_base.opposite();
        if !quote_limit.is_zero() {
            match dir_of_quote {
                Dir::RemoveFromAmm if quote_amount < quote_limit => {
                    return Err(AmmError::LessThanMinimalQuote {
                        amount: quote_amount,
                        limit: quote_limit,
                    });
                }
                Dir::AddToAmm if quote_amount > quote_limit => {
                    return Err(AmmError::MoreThanMaximalQuote {
                        amount: quote_amount,
                        limit: quote_limit,
                    });
                }
                _ => {}
            }
        }

        self.update_reserve(dir_of_quote, quote_amount, base_amount, true, block)?;
        tracing::debug!(
            symbol = %self.symbol,
            dir = ?dir_of_base,
            quote = %quote_amount,
            base = %base_amount,
            "swap output"
        );
        Ok(quote_amount)
    }

    /// Would selling (`AddToAmm`) or buying back (`RemoveFromAmm`) `base_amount`
    /// leave the band around the last block's price?
    pub fn is_over_fluctuation_limit(
        &self,
        dir_of_base: Dir,
        base_amount: FixedPoint,
        block: BlockInfo,
    ) -> Result<bool, AmmError> {
        if self.fluctuation_limit_ratio.is_zero() {
            return Ok(false);
        }
        let (upper, lower) = self.price_boundaries_of_last_block(block)?;
        let quote_amount = self.output_price(dir_of_base, base_amount)?;
        let (quote_after, base_after) = self.reserves_after(dir_of_base.opposite(), quote_amount, base_amount)?;
        let price = quote_after.checked_div(base_after)?;
        Ok(price > upper || price < lower)
    }

    /// Price band around the last snapshot taken in an earlier block.
    pub fn price_boundaries_of_last_block(&self, block: BlockInfo) -> Result<(FixedPoint, FixedPoint), AmmError> {
        let len = self.reserve_snapshots.len();
        let mut snapshot = self.reserve_snapshots.last().ok_or(AmmError::ReserveExhausted)?;
        if snapshot.block_number == block.number && len > 1 {
            snapshot = &self.reserve_snapshots[len - 2];
        }
        let last_price = snapshot.quote_asset_reserve.checked_div(snapshot.base_asset_reserve)?;
        let upper = last_price.checked_mul(FixedPoint::ONE.checked_add(self.fluctuation_limit_ratio)?)?;
        let lower = last_price.checked_mul(FixedPoint::ONE.checked_sub(self.fluctuation_limit_ratio)?)?;
        Ok((upper, lower))
    }

    fn reserves_after(
        &self,
        dir_of_quote: Dir,
        quote_amount: FixedPoint,
        base_amount: FixedPoint,
    ) -> Result<(FixedPoint, FixedPoint), AmmError> {
        let after = match dir_of_quote {
            Dir::AddToAmm => (
                self.quote_asset_reserve.checked_add(quote_amount)?,
                self.base_asset_reserve.checked_sub(base_amount)?,
            ),
            Dir::RemoveFromAmm => (
                self.quote_asset_reserve.checked_sub(quote_amount)?,
                self.base_asset_reserve.checked_add(base_amount)?,
            ),
        };
        if after.0.is_zero() || after.1.is_zero() {
            return Err(AmmError::ReserveExhausted);
        }
        Ok(after)
    }

    // runs before the reserves move. a trade that starts at or past a boundary and
    // pushes further out fails outright; one that only ends outside may use the
    // block's single override; one heading back toward the band always passes.
    fn check_fluctuation_limit(
        &mut self,
        dir_of_quote: Dir,
        quote_amount: FixedPoint,
        base_amount: FixedPoint,
        can_over_fluctuation_limit: bool,
        block: BlockInfo,
    ) -> Result<(), AmmError> {
        if self.fluctuation_limit_ratio.is_zero() {
            return Ok(());
        }
        let (upper, lower) = self.price_boundaries_of_last_block(block)?;
        let price_before = self.spot_price()?;
        let (quote_after, base_after) = self.reserves_after(dir_of_quote, quote_amount, base_amount)?;
        let price_after = quote_after.checked_div(base_after)?;
        let rising = dir_of_quote == Dir::AddToAmm;

        if (rising && price_before >= upper) || (!rising && price_before <= lower) {
            return Err(AmmError::FluctuationLimitAlreadyExceeded);
        }
        if price_after <= upper && price_after >= lower {
            return Ok(());
        }
        if (rising && price_after < lower) || (!rising && price_after > upper) {
            return Ok(());
        }
        if can_over_fluctuation_limit && self.override_block != Some(block.number) {
            self.override_block = Some(block.number);
            tracing::debug!(symbol = %self.symbol, block = block.number, "fluctuation override used");
            return Ok(());
        }
        Err(AmmError::FluctuationLimitExceeded)
    }

    fn update_reserve(
        &mut self,
        dir_of_quote: Dir,
        quote_amount: FixedPoint,
        base_amount: FixedPoint,
        can_over_fluctuation_limit: bool,
        block: BlockInfo,
    ) -> Result<(), AmmError> {
        self.check_fluctuation_limit(dir_of_quote, quote_amount, base_amount, can_over_fluctuation_limit, block)?;

        let (quote_after, base_after) = self.reserves_after(dir_of_quote, quote_amount, base_amount)?;
        let (position_size, notional) = match dir_of_quote {
            Dir::AddToAmm => (
                self.total_position_size.add_unsigned(base_amount)?,
                self.cumulative_notional.add_unsigned(quote_amount)?,
            ),
            Dir::RemoveFromAmm => (
                self.total_position_size.sub_unsigned(base_amount)?,
                self.cumulative_notional.sub_unsigned(quote_amount)?,
            ),
        };
        self.quote_asset_reserve = quote_after;
        self.base_asset_reserve = base_after;
        self.total_position_size = position_size;
        self.cumulative_notional = notional;
        self.add_reserve_snapshot(block);
        Ok(())
    }

    pub(super) fn add_reserve_snapshot(&mut self, block: BlockInfo) {
        let snapshot = ReserveSnapshot {
            quote_asset_reserve: self.quote_asset_reserve,
            base_asset_reserve: self.base_asset_reserve,
            cumulative_notional: self.cumulative_notional,
            block_number: block.number,
            timestamp: block.timestamp,
        };
        match self.reserve_snapshots.last_mut() {
            Some(last) if last.block_number == block.number => {
                last.quote_asset_reserve = snapshot.quote_asset_reserve;
                last.base_asset_reserve = snapshot.base_asset_reserve;
                last.cumulative_notional = snapshot.cumulative_notional;
            }
            _ => self.reserve_snapshots.push(snapshot),
        }
    }
}
