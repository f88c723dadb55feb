//! Wind-down: global shutdown and settlement of positions on closed amms.

use super::core::ClearingHouse;
use super::results::ClearingHouseError;
use crate::events::{EventPayload, PositionSettledEvent};
use crate::exchange::Exchange;
use crate::fixed_point::FixedPoint;
use crate::ledger::{self, TokenLedger};
use crate::position::unrealized_pnl;
use crate::price_feed::PriceFeed;
use crate::types::{Address, AmmId};

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    /// Pays out a position on a closed amm and clears it. Returns what was paid.
    ///
    /// With a settlement price the payout is margin plus pnl at that price,
    /// floored at zero. An amm closed without a shutdown returns the margin.
    /// Payouts are truncated to what the vault holds.
    pub fn settle_position(&mut self, trader: Address, amm: AmmId) -> Result<FixedPoint, ClearingHouseError> {
        self.atomic(|ch| {
            let target = ch.amm(amm)?;
            if target.is_open() {
                return Err(ClearingHouseError::AmmStillOpen);
            }
            let (asset, settlement_price) = (target.quote_asset(), target.settlement_price());
            let position = ch.position_of(amm, trader);
            if position.is_empty() {
                return Err(ClearingHouseError::PositionSizeZero);
            }
            ch.clear_position(amm, trader);

            let owed = match settlement_price {
                None => position.margin,
                Some(price) => {
                    let notional = position.size.abs().checked_mul(price)?;
                    let returned = unrealized_pnl(position.size, position.open_notional, notional)?
                        .add_unsigned(position.margin)?;
                    if returned.is_positive() {
                        returned.to_unsigned()?
                    } else {
                        FixedPoint::ZERO
                    }
                }
            };
            let value_transferred = owed.min(ch.vault_balance(asset)?);
            if !value_transferred.is_zero() {
                let vault = ch.address;
                ledger::checked_transfer(&mut ch.state.ledger, asset, vault, trader, value_transferred)?;
            }
            if value_transferred < owed {
                tracing::warn!(?amm, %trader, %owed, paid = %value_transferred, "settlement truncated to vault");
            }

            ch.emit(EventPayload::PositionSettled(PositionSettledEvent {
                amm,
                trader,
                value_transferred,
            }));
            tracing::info!(?amm, %trader, %value_transferred, "position settled");
            Ok(value_transferred)
        })
    }

    /// Shuts every amm registered with the insurance fund down once its mint
    /// breaker has tripped. Anyone may call. Returns the settlement prices.
    pub fn shutdown_all_amm(&mut self) -> Result<Vec<FixedPoint>, ClearingHouseError> {
        self.atomic(|ch| {
            let prices = ch.state.insurance_fund.shutdown_all_amm(
                &ch.state.ledger,
                &mut ch.state.amms,
                &mut ch.events,
                ch.block,
            )?;
            Ok(prices)
        })
    }
}
