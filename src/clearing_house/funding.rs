//! Periodic funding between the clearing house and the insurance fund.

use super::core::ClearingHouse;
use super::results::{ClearingHouseError, FundingResult};
use crate::events::{EventPayload, FundingPaidEvent};
use crate::exchange::Exchange;
use crate::ledger::TokenLedger;
use crate::price_feed::PriceFeed;
use crate::types::AmmId;

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    /// Settles one funding period on `amm` and extends the cumulative premium
    /// fraction. Positions pay or receive lazily on their next touch; the house
    /// settles the net imbalance with the fund now.
    ///
    /// A positive premium fraction means longs pay. With net long size the
    /// house collects more than it owes and pays the surplus into the fund; with
    /// net short size the fund tops the house up.
    pub fn pay_funding(&mut self, amm: AmmId) -> Result<FundingResult, ClearingHouseError> {
        self.atomic(|ch| {
            let (caller, block) = (ch.address, ch.block);
            let target = ch
                .state
                .amms
                .get_mut(amm.0 as usize)
                .ok_or(ClearingHouseError::AmmNotFound(amm))?;
            let settlement = target.settle_funding(caller, &ch.feed, block)?;
            let total_position_size = target.total_position_size();
            let asset = target.quote_asset();

            let market = ch.market_mut(amm)?;
            let cumulative_premium_fraction = market
                .latest_cumulative_premium_fraction()
                .checked_add(settlement.premium_fraction)?;
            market.cumulative_premium_fractions.push(cumulative_premium_fraction);

            let paid_to_insurance_fund = settlement.premium_fraction.checked_mul(total_position_size)?;
            if paid_to_insurance_fund.is_negative() {
                ch.state.insurance_fund.withdraw(
                    caller,
                    asset,
                    paid_to_insurance_fund.abs(),
                    &mut ch.state.ledger,
                    &mut ch.events,
                    block,
                )?;
            } else if paid_to_insurance_fund.is_positive() {
                ch.transfer_to_insurance_fund(asset, paid_to_insurance_fund.abs())?;
            }

            ch.emit(EventPayload::FundingPaid(FundingPaidEvent {
                amm,
                premium_fraction: settlement.premium_fraction,
                funding_rate: settlement.funding_rate,
                cumulative_premium_fraction,
                paid_to_insurance_fund,
            }));
            tracing::info!(
                ?amm,
                premium_fraction = %settlement.premium_fraction,
                %cumulative_premium_fraction,
                %paid_to_insurance_fund,
                "funding paid"
            );
            Ok(FundingResult {
                premium_fraction: settlement.premium_fraction,
                funding_rate: settlement.funding_rate,
                cumulative_premium_fraction,
                paid_to_insurance_fund,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::amm::AmmError;
    use crate::fixed_point::SignedFixedPoint;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn funding_waits_for_next_funding_time() {
        let mut venue = venue();
        assert!(matches!(
            venue.pay_funding(ETH),
            Err(ClearingHouseError::Amm(AmmError::FundingTooEarly { .. }))
        ));
    }

    #[test]
    fn longs_pay_when_spot_trades_rich() {
        let mut venue = venue();
        // spot 25.6 against an oracle of 10 for the whole period
        open(&mut venue, ALICE, Side::Long, dec!(60), dec!(10)).unwrap();
        let fund_before = wallet(&venue, FUND);
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(10));
        let result = venue.pay_funding(ETH).unwrap();

        assert!(result.premium_fraction.is_positive());
        assert_eq!(result.cumulative_premium_fraction, result.premium_fraction);
        // the house received from the long and owes nobody, so the fund gets it all
        assert!(result.paid_to_insurance_fund.is_positive());
        assert_eq!(
            wallet(&venue, FUND),
            fund_before.checked_add(result.paid_to_insurance_fund.abs()).unwrap()
        );

        // the long's margin shrinks by exactly what the fund received
        let adjusted = venue.position(ETH, ALICE).unwrap();
        let paid = fp(dec!(60)).checked_sub(adjusted.margin).unwrap();
        assert_eq!(paid, result.paid_to_insurance_fund.abs());
    }

    #[test]
    fn fund_tops_up_house_when_funding_favours_the_net_side() {
        let mut venue = venue();
        // net short, spot 1.6 against an oracle of 10: shorts pay into the house
        open(&mut venue, ALICE, Side::Short, dec!(60), dec!(10)).unwrap();
        let fund_before = wallet(&venue, FUND);
        let vault_before = venue.vault_balance(USDC).unwrap();
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(10));
        let first = venue.pay_funding(ETH).unwrap();

        assert!(first.premium_fraction.is_negative());
        assert!(first.paid_to_insurance_fund.is_positive());
        assert_eq!(
            wallet(&venue, FUND),
            fund_before.checked_add(first.paid_to_insurance_fund.abs()).unwrap()
        );
        assert_eq!(
            venue.vault_balance(USDC).unwrap(),
            vault_before.checked_sub(first.paid_to_insurance_fund.abs()).unwrap()
        );

        // oracle drops under spot for the next period: shorts receive, the fund pays
        set_oracle(&mut venue, dec!(1));
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(1));
        let fund_mid = wallet(&venue, FUND);
        let second = venue.pay_funding(ETH).unwrap();
        assert!(second.premium_fraction.is_positive());
        assert!(second.paid_to_insurance_fund.is_negative());
        assert_eq!(
            wallet(&venue, FUND),
            fund_mid.checked_sub(second.paid_to_insurance_fund.abs()).unwrap()
        );
        assert_eq!(
            venue.market(ETH).unwrap().latest_cumulative_premium_fraction(),
            first.premium_fraction.checked_add(second.premium_fraction).unwrap()
        );
    }

    #[test]
    fn stale_oracle_blocks_funding() {
        let mut venue = venue();
        venue.advance_block(7_200);
        assert!(matches!(
            venue.pay_funding(ETH),
            Err(ClearingHouseError::Amm(AmmError::PriceFeed(_)))
        ));
        assert!(venue.market(ETH).unwrap().cumulative_premium_fractions.is_empty());
    }

    #[test]
    fn flat_market_pays_nothing() {
        let mut venue = venue();
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(10));
        let result = venue.pay_funding(ETH).unwrap();
        assert_eq!(result.premium_fraction, SignedFixedPoint::ZERO);
        assert_eq!(result.paid_to_insurance_fund, SignedFixedPoint::ZERO);
        assert_eq!(wallet(&venue, FUND), fp(dec!(5_000)));
    }
}
