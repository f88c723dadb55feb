//! Liquidation of positions under the maintenance margin.

use super::core::ClearingHouse;
use super::positions::dir_to_close;
use super::results::{ClearingHouseError, LiquidationResult, PositionResp};
use crate::access::Role;
use crate::events::{EventPayload, PositionLiquidatedEvent};
use crate::exchange::Exchange;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::ledger::TokenLedger;
use crate::position::{calc_remain_margin_with_funding_payment, Position};
use crate::price_feed::PriceFeed;
use crate::types::{Address, AmmId, PnlCalcOption, PnlPreference};

// what one liquidation path hands back before fees move
struct Liquidated {
    resp: PositionResp,
    partial: bool,
    fee_to_liquidator: FixedPoint,
    fee_to_insurance_fund: FixedPoint,
    bad_debt: FixedPoint,
    penalty: FixedPoint,
}

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    pub fn liquidate(
        &mut self,
        liquidator: Address,
        amm: AmmId,
        trader: Address,
    ) -> Result<LiquidationResult, ClearingHouseError> {
        self.liquidate_with_slippage(liquidator, amm, trader, FixedPoint::ZERO)
    }

    /// Liquidates `trader` if their margin ratio is under maintenance. Runs
    /// while paused.
    ///
    /// Partial when the ratio is configured below one, the margin still covers
    /// the fee at spot, and closing everything would stay inside the
    /// fluctuation band.
    /// Otherwise the whole position goes, and any bad debt it leaves needs a
    /// backstop liquidity provider as the liquidator.
    pub fn liquidate_with_slippage(
        &mut self,
        liquidator: Address,
        amm: AmmId,
        trader: Address,
        quote_limit: FixedPoint,
    ) -> Result<LiquidationResult, ClearingHouseError> {
        self.atomic(|ch| {
            ch.require_amm_open(amm)?;
            ch.require_not_restricted(amm)?;
            let position = ch.position_of(amm, trader);
            if position.is_empty() {
                return Err(ClearingHouseError::PositionSizeZero);
            }

            let margin_ratio = ch.liquidation_margin_ratio(amm, &position)?;
            let maintenance = ch.params.maintenance_margin_ratio;
            if margin_ratio >= maintenance.to_signed()? {
                return Err(ClearingHouseError::MarginRatioNotMet {
                    ratio: margin_ratio,
                    required: maintenance,
                });
            }

            let ratio = ch.params.partial_liquidation_ratio;
            let partial = !ratio.is_zero()
                && ratio < FixedPoint::ONE
                && margin_ratio > ch.params.liquidation_fee_ratio.to_signed()?
                && !ch
                    .amm(amm)?
                    .is_over_fluctuation_limit(dir_to_close(position.size), position.size.abs(), ch.block)?
                && ch.partial_covers_penalty(amm, &position, ratio)?;
            let outcome = if partial {
                ch.partial_liquidation(amm, trader, ratio, quote_limit)?
            } else {
                ch.full_liquidation(liquidator, amm, trader, quote_limit)?
            };

            let asset = ch.amm(amm)?.quote_asset();
            ch.withdraw(asset, liquidator, outcome.fee_to_liquidator)?;
            ch.transfer_to_insurance_fund(asset, outcome.fee_to_insurance_fund)?;
            ch.enter_restriction_mode(amm)?;

            let resp = outcome.resp;
            ch.emit(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                amm,
                trader,
                position_notional: resp.exchanged_quote_asset_amount,
                position_size: resp.exchanged_position_size.abs(),
                fee_to_liquidator: outcome.fee_to_liquidator,
                fee_to_insurance_fund: outcome.fee_to_insurance_fund,
                liquidator,
                bad_debt: outcome.bad_debt,
                partial: outcome.partial,
            }));
            ch.emit_position_changed(amm, trader, &resp, FixedPoint::ZERO, outcome.penalty)?;
            tracing::warn!(
                ?amm,
                %trader,
                %liquidator,
                partial = outcome.partial,
                %margin_ratio,
                bad_debt = %outcome.bad_debt,
                "position liquidated"
            );

            Ok(LiquidationResult {
                amm,
                trader,
                partial: outcome.partial,
                liquidated_size: resp.exchanged_position_size,
                position_notional: resp.exchanged_quote_asset_amount,
                fee_to_liquidator: outcome.fee_to_liquidator,
                fee_to_insurance_fund: outcome.fee_to_insurance_fund,
                bad_debt: outcome.bad_debt,
                realized_pnl: resp.realized_pnl,
                margin_ratio,
            })
        })
    }

    /// Margin ratio that decides eligibility. Takes the better of spot and
    /// TWAP, and also the oracle reading when spot has drifted past the
    /// spread limit.
    pub(super) fn liquidation_margin_ratio(
        &self,
        amm: AmmId,
        position: &Position,
    ) -> Result<SignedFixedPoint, ClearingHouseError> {
        let (notional, pnl) = self.preferred_notional_and_pnl(amm, position, PnlPreference::MaxPnl)?;
        let ratio = self.margin_ratio_for(amm, position, notional, pnl)?;
        if !self.amm(amm)?.is_over_spread_limit(&self.feed, self.block.timestamp)? {
            return Ok(ratio);
        }
        let (oracle_notional, oracle_pnl) = self.position_notional_and_pnl(amm, position, PnlCalcOption::Oracle)?;
        Ok(ratio.max(self.margin_ratio_for(amm, position, oracle_notional, oracle_pnl)?))
    }

    /// Whether the margin left after closing `ratio` of the position at spot
    /// still pays the penalty. Eligibility may read a lagging TWAP, so this can
    /// fail while the ratio looks healthy.
    fn partial_covers_penalty(
        &self,
        amm: AmmId,
        position: &Position,
        ratio: FixedPoint,
    ) -> Result<bool, ClearingHouseError> {
        let (_, unrealized_pnl) = self.position_notional_and_pnl(amm, position, PnlCalcOption::Spot)?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(position, unrealized_pnl.mul_unsigned(ratio)?, latest)?;
        if !remain.bad_debt.is_zero() {
            return Ok(false);
        }
        let base = position.size.abs().checked_mul(ratio)?;
        let notional = self.amm(amm)?.output_price(dir_to_close(position.size), base)?;
        let penalty = notional.checked_mul(self.params.liquidation_fee_ratio)?;
        Ok(remain.remain_margin >= penalty)
    }

    fn partial_liquidation(
        &mut self,
        amm: AmmId,
        trader: Address,
        ratio: FixedPoint,
        quote_limit: FixedPoint,
    ) -> Result<Liquidated, ClearingHouseError> {
        let mut resp = self.reduce_position_by_ratio(amm, trader, ratio, quote_limit)?;
        let penalty = resp
            .exchanged_quote_asset_amount
            .checked_mul(self.params.liquidation_fee_ratio)?;
        let fee_to_liquidator = penalty.div_scalar(2)?;
        let fee_to_insurance_fund = penalty.checked_sub(fee_to_liquidator)?;

        resp.position.margin = resp.position.margin.checked_sub(penalty)?;
        self.set_position(amm, trader, resp.position);
        Ok(Liquidated {
            resp,
            partial: true,
            fee_to_liquidator,
            fee_to_insurance_fund,
            bad_debt: FixedPoint::ZERO,
            penalty,
        })
    }

    fn full_liquidation(
        &mut self,
        liquidator: Address,
        amm: AmmId,
        trader: Address,
        quote_limit: FixedPoint,
    ) -> Result<Liquidated, ClearingHouseError> {
        let resp = self.internal_close_position(amm, trader, quote_limit)?;
        let remain_margin = resp.margin_to_vault.abs();
        let fee_to_liquidator = resp
            .exchanged_quote_asset_amount
            .checked_mul(self.params.liquidation_fee_ratio)?
            .div_scalar(2)?;

        // the liquidator is paid even when the margin cannot cover it
        let (liquidation_bad_debt, fee_to_insurance_fund) = if fee_to_liquidator > remain_margin {
            (fee_to_liquidator.checked_sub(remain_margin)?, FixedPoint::ZERO)
        } else {
            (FixedPoint::ZERO, remain_margin.checked_sub(fee_to_liquidator)?)
        };
        let bad_debt = resp.bad_debt.checked_add(liquidation_bad_debt)?;
        if !bad_debt.is_zero() {
            if !self.state.access.has_role(Role::BackstopLiquidityProvider, liquidator) {
                return Err(ClearingHouseError::NotBackstopLiquidityProvider);
            }
            let asset = self.amm(amm)?.quote_asset();
            self.realize_bad_debt(amm, asset, bad_debt)?;
        }

        Ok(Liquidated {
            resp,
            partial: false,
            fee_to_liquidator,
            fee_to_insurance_fund,
            bad_debt,
            penalty: fee_to_liquidator,
        })
    }
}
