//! Opening, growing, reducing, reversing and closing positions.

use super::core::ClearingHouse;
use super::results::{ClearingHouseError, PositionResp};
use crate::events::{EventPayload, PositionChangedEvent};
use crate::exchange::Exchange;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::ledger::TokenLedger;
use crate::position::{calc_remain_margin_with_funding_payment, Position};
use crate::price_feed::PriceFeed;
use crate::types::{Address, AmmId, Dir, PnlCalcOption, Side};

/// Direction of base that closes a position: a long sells its base back.
pub(super) fn dir_to_close(size: SignedFixedPoint) -> Dir {
    if size.is_positive() {
        Dir::AddToAmm
    } else {
        Dir::RemoveFromAmm
    }
}

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    /// Trades `margin × leverage` of quote on `side`.
    ///
    /// Same side (or no position) grows the position. The other side reduces it
    /// when the notional is smaller than the position's, and otherwise closes it
    /// and opens the residual the other way.
    pub fn open_position(
        &mut self,
        trader: Address,
        amm: AmmId,
        side: Side,
        margin: FixedPoint,
        leverage: FixedPoint,
        base_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        self.atomic(|ch| ch.open_position_inner(trader, amm, side, margin, leverage, base_limit))
    }

    fn open_position_inner(
        &mut self,
        trader: Address,
        amm: AmmId,
        side: Side,
        margin: FixedPoint,
        leverage: FixedPoint,
        base_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        self.require_not_paused()?;
        self.require_amm_open(amm)?;
        if margin.is_zero() || leverage.is_zero() {
            return Err(ClearingHouseError::ZeroInput);
        }
        let leverage_ratio = FixedPoint::ONE.checked_div(leverage)?;
        if leverage_ratio < self.params.init_margin_ratio {
            return Err(ClearingHouseError::MarginRatioNotMet {
                ratio: leverage_ratio.to_signed()?,
                required: self.params.init_margin_ratio,
            });
        }
        self.require_not_restricted(amm)?;

        let old = self.position_of(amm, trader);
        let is_new = old.is_empty();
        let increase = is_new || old.side() == Some(side);
        let resp = if increase {
            let open_notional = margin.checked_mul(leverage)?;
            self.internal_increase_position(amm, trader, side, open_notional, base_limit, leverage)?
        } else {
            self.open_reverse_position(amm, trader, side, margin, leverage, base_limit, false)?
        };
        self.set_position(amm, trader, resp.position);

        if !resp.bad_debt.is_zero() {
            return Err(ClearingHouseError::BadDebt(resp.bad_debt));
        }
        // a fresh position sits at 1 / leverage less rounding, so it is not checked
        let flipped = !increase && resp.position.side() == Some(side);
        if !is_new && !flipped && !resp.position.is_empty() {
            self.require_margin_ratio(amm, trader, self.params.init_margin_ratio)?;
        }

        let asset = self.amm(amm)?.quote_asset();
        let margin_to_vault = resp.margin_to_vault;
        if margin_to_vault.is_positive() {
            self.pull_from(asset, trader, margin_to_vault.abs())?;
        } else if margin_to_vault.is_negative() {
            self.withdraw(asset, trader, margin_to_vault.abs())?;
        }
        let fee = self.transfer_fee(trader, amm, resp.exchanged_quote_asset_amount)?;
        self.emit_position_changed(amm, trader, &resp, fee, FixedPoint::ZERO)?;

        tracing::info!(
            ?amm,
            %trader,
            ?side,
            %margin,
            %leverage,
            size = %resp.position.size,
            "position opened"
        );
        Ok(resp)
    }

    /// Closes the whole position. When that would push the price out of the
    /// fluctuation band only the partial liquidation share is closed.
    pub fn close_position(
        &mut self,
        trader: Address,
        amm: AmmId,
        quote_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        self.atomic(|ch| {
            ch.require_not_paused()?;
            ch.require_amm_open(amm)?;
            ch.require_not_restricted(amm)?;
            let old = ch.position_of(amm, trader);
            if old.is_empty() {
                return Err(ClearingHouseError::PositionSizeZero);
            }

            let ratio = ch.params.partial_liquidation_ratio;
            let partial = !ratio.is_zero()
                && ratio < FixedPoint::ONE
                && ch
                    .amm(amm)?
                    .is_over_fluctuation_limit(dir_to_close(old.size), old.size.abs(), ch.block)?;
            let resp = if partial {
                let resp = ch.reduce_position_by_ratio(amm, trader, ratio, quote_limit)?;
                ch.set_position(amm, trader, resp.position);
                resp
            } else {
                ch.internal_close_position(amm, trader, quote_limit)?
            };
            if !resp.bad_debt.is_zero() {
                return Err(ClearingHouseError::BadDebt(resp.bad_debt));
            }

            let asset = ch.amm(amm)?.quote_asset();
            if resp.margin_to_vault.is_negative() {
                ch.withdraw(asset, trader, resp.margin_to_vault.abs())?;
            }
            let fee = ch.transfer_fee(trader, amm, resp.exchanged_quote_asset_amount)?;
            ch.emit_position_changed(amm, trader, &resp, fee, FixedPoint::ZERO)?;
            tracing::info!(
                ?amm,
                %trader,
                partial,
                realized_pnl = %resp.realized_pnl,
                "position closed"
            );
            Ok(resp)
        })
    }

    // 5.2.1: position mutations. callers store the result and move the money

    pub(super) fn internal_increase_position(
        &mut self,
        amm: AmmId,
        trader: Address,
        side: Side,
        open_notional: FixedPoint,
        base_limit: FixedPoint,
        leverage: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        let old = self.position_of(amm, trader);
        let exchanged_position_size = self.swap_input(amm, side.quote_dir(), open_notional, base_limit, false)?;
        let size = old.size.checked_add(exchanged_position_size)?;

        self.update_open_interest(amm, trader, open_notional.to_signed()?)?;
        let max_holding = self.amm(amm)?.max_holding_base_asset();
        if !max_holding.is_zero() && !self.is_whitelisted(trader) && size.abs() > max_holding {
            return Err(ClearingHouseError::PositionSizeUpperBound);
        }

        let margin_requirement = open_notional.checked_div(leverage)?.to_signed()?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(&old, margin_requirement, latest)?;
        let position = Position {
            size,
            margin: remain.remain_margin,
            open_notional: old.open_notional.checked_add(open_notional)?,
            last_updated_cumulative_premium_fraction: latest,
            block_number: self.block.number,
        };
        let (_, unrealized_pnl_after) = self.position_notional_and_pnl(amm, &position, PnlCalcOption::Spot)?;

        Ok(PositionResp {
            position,
            exchanged_quote_asset_amount: open_notional,
            exchanged_position_size,
            bad_debt: remain.bad_debt,
            funding_payment: remain.funding_payment,
            realized_pnl: SignedFixedPoint::ZERO,
            unrealized_pnl_after,
            margin_to_vault: margin_requirement,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn open_reverse_position(
        &mut self,
        amm: AmmId,
        trader: Address,
        side: Side,
        margin: FixedPoint,
        leverage: FixedPoint,
        base_limit: FixedPoint,
        can_over_fluctuation_limit: bool,
    ) -> Result<PositionResp, ClearingHouseError> {
        let open_notional = margin.checked_mul(leverage)?;
        let old = self.position_of(amm, trader);
        let (old_notional, unrealized_pnl) = self.position_notional_and_pnl(amm, &old, PnlCalcOption::Spot)?;

        if old_notional <= open_notional {
            return self.close_and_open_reverse_position(amm, trader, side, margin, leverage, base_limit);
        }

        // reduce: realize pnl pro rata to the base traded away
        self.update_open_interest(amm, trader, open_notional.to_signed()?.checked_neg()?)?;
        let exchanged_position_size = self.swap_input(
            amm,
            side.quote_dir(),
            open_notional,
            base_limit,
            can_over_fluctuation_limit,
        )?;
        let realized_pnl = unrealized_pnl
            .mul_unsigned(exchanged_position_size.abs())?
            .div_unsigned(old.size.abs())?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(&old, realized_pnl, latest)?;

        let unrealized_pnl_after = unrealized_pnl.checked_sub(realized_pnl)?;
        let old_notional = old_notional.to_signed()?;
        let traded = open_notional.to_signed()?;
        let remain_open_notional = if old.size.is_positive() {
            old_notional.checked_sub(traded)?.checked_sub(unrealized_pnl_after)?
        } else {
            unrealized_pnl_after.checked_add(old_notional)?.checked_sub(traded)?
        };
        if !remain_open_notional.is_positive() {
            return Err(ClearingHouseError::NonPositiveOpenNotional);
        }

        let position = Position {
            size: old.size.checked_add(exchanged_position_size)?,
            margin: remain.remain_margin,
            open_notional: remain_open_notional.to_unsigned()?,
            last_updated_cumulative_premium_fraction: latest,
            block_number: self.block.number,
        };
        Ok(PositionResp {
            position,
            exchanged_quote_asset_amount: open_notional,
            exchanged_position_size,
            bad_debt: remain.bad_debt,
            funding_payment: remain.funding_payment,
            realized_pnl,
            unrealized_pnl_after,
            margin_to_vault: SignedFixedPoint::ZERO,
        })
    }

    fn close_and_open_reverse_position(
        &mut self,
        amm: AmmId,
        trader: Address,
        side: Side,
        margin: FixedPoint,
        leverage: FixedPoint,
        base_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        let close = self.internal_close_position(amm, trader, FixedPoint::ZERO)?;
        if !close.bad_debt.is_zero() {
            return Err(ClearingHouseError::ReduceUnderwaterPosition);
        }

        let open_notional = margin.checked_mul(leverage)?;
        let residual = if open_notional > close.exchanged_quote_asset_amount {
            open_notional.checked_sub(close.exchanged_quote_asset_amount)?
        } else {
            FixedPoint::ZERO
        };
        // too little left to carry any margin
        if residual.checked_div(leverage)?.is_zero() {
            return Ok(close);
        }

        let closed_size = close.exchanged_position_size.abs();
        let remaining_limit = if base_limit > closed_size {
            base_limit.checked_sub(closed_size)?
        } else {
            FixedPoint::ZERO
        };
        let increase = self.internal_increase_position(amm, trader, side, residual, remaining_limit, leverage)?;
        Ok(PositionResp::merge(close, increase)?)
    }

    pub(super) fn internal_close_position(
        &mut self,
        amm: AmmId,
        trader: Address,
        quote_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        let old = self.position_of(amm, trader);
        if old.is_empty() {
            return Err(ClearingHouseError::PositionSizeZero);
        }
        let (_, unrealized_pnl) = self.position_notional_and_pnl(amm, &old, PnlCalcOption::Spot)?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(&old, unrealized_pnl, latest)?;

        let exchanged_quote_asset_amount =
            self.swap_output(amm, dir_to_close(old.size), old.size.abs(), quote_limit)?;
        let released = unrealized_pnl
            .add_unsigned(remain.bad_debt)?
            .add_unsigned(old.open_notional)?;
        self.update_open_interest(amm, trader, released.checked_neg()?)?;
        self.clear_position(amm, trader);

        Ok(PositionResp {
            position: Position::cleared(self.block.number),
            exchanged_quote_asset_amount,
            exchanged_position_size: old.size.checked_neg()?,
            bad_debt: remain.bad_debt,
            funding_payment: remain.funding_payment,
            realized_pnl: unrealized_pnl,
            unrealized_pnl_after: SignedFixedPoint::ZERO,
            margin_to_vault: remain.remain_margin.to_signed()?.checked_neg()?,
        })
    }

    /// Closes exactly `size × ratio` base and the same share of pnl and open
    /// notional. Used by partial closes and partial liquidations.
    pub(super) fn reduce_position_by_ratio(
        &mut self,
        amm: AmmId,
        trader: Address,
        ratio: FixedPoint,
        quote_limit: FixedPoint,
    ) -> Result<PositionResp, ClearingHouseError> {
        let old = self.position_of(amm, trader);
        if old.is_empty() {
            return Err(ClearingHouseError::PositionSizeZero);
        }
        let (_, unrealized_pnl) = self.position_notional_and_pnl(amm, &old, PnlCalcOption::Spot)?;
        let base = old.size.abs().checked_mul(ratio)?;
        let exchanged_quote_asset_amount = self.swap_output(amm, dir_to_close(old.size), base, quote_limit)?;

        let realized_pnl = unrealized_pnl.mul_unsigned(ratio)?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(&old, realized_pnl, latest)?;
        let exchanged_position_size = if old.size.is_positive() {
            base.to_signed()?.checked_neg()?
        } else {
            base.to_signed()?
        };
        self.update_open_interest(amm, trader, exchanged_quote_asset_amount.to_signed()?.checked_neg()?)?;

        let position = Position {
            size: old.size.checked_add(exchanged_position_size)?,
            margin: remain.remain_margin,
            open_notional: old.open_notional.checked_sub(old.open_notional.checked_mul(ratio)?)?,
            last_updated_cumulative_premium_fraction: latest,
            block_number: self.block.number,
        };
        Ok(PositionResp {
            position,
            exchanged_quote_asset_amount,
            exchanged_position_size,
            bad_debt: remain.bad_debt,
            funding_payment: remain.funding_payment,
            realized_pnl,
            unrealized_pnl_after: unrealized_pnl.checked_sub(realized_pnl)?,
            margin_to_vault: SignedFixedPoint::ZERO,
        })
    }

    /// Gross notional per amm, floored at zero. Only growth is capped, and
    /// whitelisted traders are exempt.
    pub(super) fn update_open_interest(
        &mut self,
        amm: AmmId,
        trader: Address,
        amount: SignedFixedPoint,
    ) -> Result<(), ClearingHouseError> {
        let cap = self.amm(amm)?.open_interest_notional_cap();
        let exempt = self.is_whitelisted(trader);
        let market = self.market_mut(amm)?;
        let updated = market.open_interest_notional.to_signed()?.checked_add(amount)?;
        market.open_interest_notional = if updated.is_negative() {
            FixedPoint::ZERO
        } else {
            updated.to_unsigned()?
        };
        let open_interest = market.open_interest_notional;
        if amount.is_positive() && !cap.is_zero() && !exempt && open_interest > cap {
            return Err(ClearingHouseError::OverOpenInterestLimit { open_interest, cap });
        }
        Ok(())
    }

    pub(super) fn emit_position_changed(
        &mut self,
        amm: AmmId,
        trader: Address,
        resp: &PositionResp,
        fee: FixedPoint,
        liquidation_penalty: FixedPoint,
    ) -> Result<(), ClearingHouseError> {
        let spot_price = self.amm(amm)?.spot_price()?;
        self.emit(EventPayload::PositionChanged(PositionChangedEvent {
            amm,
            trader,
            margin: resp.position.margin,
            exchanged_quote: resp.exchanged_quote_asset_amount,
            exchanged_position_size: resp.exchanged_position_size,
            fee,
            position_size_after: resp.position.size,
            realized_pnl: resp.realized_pnl,
            unrealized_pnl_after: resp.unrealized_pnl_after,
            bad_debt: resp.bad_debt,
            liquidation_penalty,
            spot_price,
            funding_payment: resp.funding_payment,
        }));
        Ok(())
    }
}
