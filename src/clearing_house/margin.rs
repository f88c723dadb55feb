//! Margin top-ups and withdrawals, plus the position views the margin
//! checks read from.

use super::core::ClearingHouse;
use super::results::ClearingHouseError;
use crate::events::{EventPayload, MarginChangedEvent};
use crate::exchange::Exchange;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::ledger::TokenLedger;
use crate::position::{calc_remain_margin_with_funding_payment, unrealized_pnl, Position};
use crate::price_feed::PriceFeed;
use crate::types::{Address, AmmId, Dir, PnlCalcOption, PnlPreference};

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    pub fn add_margin(&mut self, trader: Address, amm: AmmId, amount: FixedPoint) -> Result<(), ClearingHouseError> {
        self.atomic(|ch| {
            ch.require_not_paused()?;
            ch.require_amm_open(amm)?;
            if amount.is_zero() {
                return Err(ClearingHouseError::ZeroInput);
            }
            ch.require_not_restricted(amm)?;
            let mut position = ch.position_of(amm, trader);
            if position.is_empty() {
                return Err(ClearingHouseError::PositionSizeZero);
            }

            position.margin = position.margin.checked_add(amount)?;
            ch.set_position(amm, trader, position);
            let asset = ch.amm(amm)?.quote_asset();
            ch.pull_from(asset, trader, amount)?;
            ch.emit(EventPayload::MarginChanged(MarginChangedEvent {
                amm,
                trader,
                amount: amount.to_signed()?,
                funding_payment: SignedFixedPoint::ZERO,
            }));
            tracing::info!(?amm, %trader, %amount, "margin added");
            Ok(())
        })
    }

    /// Settles pending funding into the margin, then pays `amount` out. The
    /// position must keep non-negative free collateral.
    pub fn remove_margin(&mut self, trader: Address, amm: AmmId, amount: FixedPoint) -> Result<(), ClearingHouseError> {
        self.atomic(|ch| {
            ch.require_not_paused()?;
            ch.require_amm_open(amm)?;
            if amount.is_zero() {
                return Err(ClearingHouseError::ZeroInput);
            }
            ch.require_not_restricted(amm)?;
            let mut position = ch.position_of(amm, trader);
            if position.is_empty() {
                return Err(ClearingHouseError::PositionSizeZero);
            }

            let latest = ch.latest_cumulative_premium_fraction(amm)?;
            let remain = calc_remain_margin_with_funding_payment(&position, amount.to_signed()?.checked_neg()?, latest)?;
            if !remain.bad_debt.is_zero() {
                return Err(ClearingHouseError::MarginNotEnough);
            }
            position.margin = remain.remain_margin;
            position.last_updated_cumulative_premium_fraction = latest;
            ch.set_position(amm, trader, position);

            if ch.free_collateral(amm, trader)?.is_negative() {
                return Err(ClearingHouseError::FreeCollateralNotEnough);
            }
            let asset = ch.amm(amm)?.quote_asset();
            ch.withdraw(asset, trader, amount)?;
            ch.emit(EventPayload::MarginChanged(MarginChangedEvent {
                amm,
                trader,
                amount: amount.to_signed()?.checked_neg()?,
                funding_payment: remain.funding_payment,
            }));
            tracing::info!(?amm, %trader, %amount, "margin removed");
            Ok(())
        })
    }

    /// min(margin after funding, margin after funding + pnl) - notional × init ratio
    pub fn free_collateral(&self, amm: AmmId, trader: Address) -> Result<SignedFixedPoint, ClearingHouseError> {
        let position = self.unadjusted_position(amm, trader)?;
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let margin_with_funding = calc_remain_margin_with_funding_payment(&position, SignedFixedPoint::ZERO, latest)?
            .signed()?;
        let (notional, pnl) = self.preferred_notional_and_pnl(amm, &position, PnlPreference::MaxPnl)?;
        let with_pnl = margin_with_funding.checked_add(pnl)?;
        let floor = margin_with_funding.min(with_pnl);
        Ok(floor.checked_sub(notional.checked_mul(self.params.init_margin_ratio)?.to_signed()?)?)
    }

    // 5.3.1: views

    /// Stored position without pending funding applied.
    pub fn unadjusted_position(&self, amm: AmmId, trader: Address) -> Result<Position, ClearingHouseError> {
        self.amm(amm)?;
        Ok(self.position_of(amm, trader))
    }

    /// Position with pending funding folded into its margin.
    pub fn position(&self, amm: AmmId, trader: Address) -> Result<Position, ClearingHouseError> {
        let mut position = self.unadjusted_position(amm, trader)?;
        if position.is_empty() {
            return Ok(position);
        }
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(&position, SignedFixedPoint::ZERO, latest)?;
        position.margin = remain.remain_margin;
        position.last_updated_cumulative_premium_fraction = latest;
        Ok(position)
    }

    pub fn position_notional_and_unrealized_pnl(
        &self,
        amm: AmmId,
        trader: Address,
        option: PnlCalcOption,
    ) -> Result<(FixedPoint, SignedFixedPoint), ClearingHouseError> {
        let position = self.unadjusted_position(amm, trader)?;
        self.position_notional_and_pnl(amm, &position, option)
    }

    pub fn unrealized_pnl(&self, amm: AmmId, trader: Address, option: PnlCalcOption) -> Result<SignedFixedPoint, ClearingHouseError> {
        Ok(self.position_notional_and_unrealized_pnl(amm, trader, option)?.1)
    }

    /// (remain margin - bad debt) / notional, reading the notional that
    /// favours the trader.
    pub fn margin_ratio(&self, amm: AmmId, trader: Address) -> Result<SignedFixedPoint, ClearingHouseError> {
        let position = self.unadjusted_position(amm, trader)?;
        if position.is_empty() {
            return Err(ClearingHouseError::PositionSizeZero);
        }
        let (notional, pnl) = self.preferred_notional_and_pnl(amm, &position, PnlPreference::MaxPnl)?;
        self.margin_ratio_for(amm, &position, notional, pnl)
    }

    // 5.3.2: pricing

    /// Exit value of the position and its pnl. Spot and TWAP read the amm
    /// curve for closing the whole size; oracle is |size| × oracle price.
    pub(super) fn position_notional_and_pnl(
        &self,
        amm: AmmId,
        position: &Position,
        option: PnlCalcOption,
    ) -> Result<(FixedPoint, SignedFixedPoint), ClearingHouseError> {
        if position.is_empty() {
            return Ok((FixedPoint::ZERO, SignedFixedPoint::ZERO));
        }
        let target = self.amm(amm)?;
        let size = position.size.abs();
        let dir = if position.size.is_positive() {
            Dir::AddToAmm
        } else {
            Dir::RemoveFromAmm
        };
        let now = self.block.timestamp;
        let notional = match option {
            PnlCalcOption::Spot => target.output_price(dir, size)?,
            PnlCalcOption::Twap => target.output_twap(dir, size, now)?,
            PnlCalcOption::Oracle => size.checked_mul(target.underlying_price(&self.feed, now)?)?,
        };
        let pnl = unrealized_pnl(position.size, position.open_notional, notional)?;
        Ok((notional, pnl))
    }

    /// Spot or TWAP, whichever gives the larger (or smaller) pnl.
    pub(super) fn preferred_notional_and_pnl(
        &self,
        amm: AmmId,
        position: &Position,
        preference: PnlPreference,
    ) -> Result<(FixedPoint, SignedFixedPoint), ClearingHouseError> {
        let spot = self.position_notional_and_pnl(amm, position, PnlCalcOption::Spot)?;
        let twap = self.position_notional_and_pnl(amm, position, PnlCalcOption::Twap)?;
        let pick_spot = match preference {
            PnlPreference::MaxPnl => spot.1 >= twap.1,
            PnlPreference::MinPnl => spot.1 <= twap.1,
        };
        Ok(if pick_spot { spot } else { twap })
    }

    pub(super) fn margin_ratio_for(
        &self,
        amm: AmmId,
        position: &Position,
        notional: FixedPoint,
        pnl: SignedFixedPoint,
    ) -> Result<SignedFixedPoint, ClearingHouseError> {
        let latest = self.latest_cumulative_premium_fraction(amm)?;
        let remain = calc_remain_margin_with_funding_payment(position, pnl, latest)?;
        Ok(remain.signed()?.div_unsigned(notional)?)
    }

    pub(super) fn require_margin_ratio(
        &self,
        amm: AmmId,
        trader: Address,
        required: FixedPoint,
    ) -> Result<(), ClearingHouseError> {
        let ratio = self.margin_ratio(amm, trader)?;
        if ratio < required.to_signed()? {
            return Err(ClearingHouseError::MarginRatioNotMet { ratio, required });
        }
        Ok(())
    }
}
