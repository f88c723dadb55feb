//! Stress tests
//!
//! These tests push the venue through crowded books, liquidation sweeps and
//! repeated funding to verify the books stay consistent under stress.

mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

fn crowd(venue: &mut SimClearingHouse, count: u64) -> Vec<Address> {
    let traders: Vec<Address> = (0..count).map(|i| Address(0x100 + i)).collect();
    for &trader in &traders {
        ledger::checked_mint(venue.ledger_mut(), USDC, trader, fp(dec!(1_000))).unwrap();
    }
    traders
}

fn sum_of_sizes(venue: &SimClearingHouse, traders: &[Address]) -> SignedFixedPoint {
    traders.iter().fold(SignedFixedPoint::ZERO, |acc, &trader| {
        acc.checked_add(venue.unadjusted_position(ETH, trader).unwrap().size).unwrap()
    })
}

/// Tests a crash through a crowd of leveraged longs.
mod cascade_tests {
    use super::*;

    #[test]
    fn liquidation_sweep_settles_every_underwater_long() {
        let mut venue = venue();
        venue.set_backstop_liquidity_provider(OWNER, KEEPER, true).unwrap();
        let traders = crowd(&mut venue, 8);

        // thinner margin for every later trader
        for (i, &trader) in traders.iter().enumerate() {
            let margin = dec!(20) - Decimal::from(i as u64) * dec!(2);
            venue
                .open_position(trader, ETH, Side::Long, fp(margin), fp(dec!(8)), FixedPoint::ZERO)
                .unwrap();
            venue.advance_block(15);
        }
        open(&mut venue, BOB, Side::Short, dec!(100), dec!(5)).unwrap();
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(10));

        let mut everyone = traders.clone();
        everyone.push(BOB);
        let fund_before = wallet(&venue, FUND);
        let mut liquidations = 0;
        let mut bad_debt = FixedPoint::ZERO;
        for _round in 0..100 {
            let mut progressed = false;
            for &trader in &traders {
                match venue.liquidate(KEEPER, ETH, trader) {
                    Ok(result) => {
                        liquidations += 1;
                        bad_debt = bad_debt.checked_add(result.bad_debt).unwrap();
                        progressed = true;
                        // one liquidation per block
                        venue.advance_block(1);
                    }
                    Err(ClearingHouseError::MarginRatioNotMet { .. }) | Err(ClearingHouseError::PositionSizeZero) => {}
                    Err(other) => panic!("unexpected liquidation error: {other}"),
                }
            }
            assert_eq!(venue.amm(ETH).unwrap().total_position_size(), sum_of_sizes(&venue, &everyone));
            if !progressed {
                break;
            }
            venue.advance_block(15);
            set_oracle(&mut venue, dec!(10));
        }

        assert!(liquidations > 0);
        // bob's short is never liquidated
        assert_eq!(venue.unadjusted_position(ETH, BOB).unwrap().side(), Some(Side::Short));
        for &trader in &traders {
            assert!(matches!(
                venue.liquidate(KEEPER, ETH, trader),
                Err(ClearingHouseError::MarginRatioNotMet { .. }) | Err(ClearingHouseError::PositionSizeZero)
            ));
        }
        // the fund lost at most the bad debt it covered
        let fund_after = wallet(&venue, FUND);
        assert!(fund_after.checked_add(bad_debt).unwrap() >= fund_before);
    }

    #[test]
    fn open_interest_returns_to_zero_when_everyone_closes() {
        let mut venue = venue();
        let traders = crowd(&mut venue, 12);
        for (i, &trader) in traders.iter().enumerate() {
            let side = if i % 2 == 0 { Side::Long } else { Side::Short };
            venue
                .open_position(trader, ETH, side, fp(dec!(10)), fp(dec!(3)), FixedPoint::ZERO)
                .unwrap();
            venue.advance_block(15);
        }
        assert!(!venue.market(ETH).unwrap().open_interest_notional.is_zero());

        for &trader in traders.iter().rev() {
            venue.close_position(trader, ETH, FixedPoint::ZERO).unwrap();
            venue.advance_block(15);
        }
        let amm = venue.amm(ETH).unwrap();
        assert!(amm.total_position_size().is_zero());
        // closes return a hair less than was paid in
        assert!(venue.market(ETH).unwrap().open_interest_notional < fp(dec!(0.000001)));
        // rounding leaves the reserves a hair above where they started
        let (quote, base) = amm.reserves();
        assert!(quote.abs_diff(fp(dec!(1000))) < fp(dec!(0.000001)));
        assert!(base.abs_diff(fp(dec!(100))) < fp(dec!(0.000001)));
    }
}

/// Tests position transitions at the edges.
mod position_tests {
    use super::*;

    #[test]
    fn flip_long_to_short() {
        let mut venue = venue();
        open(&mut venue, ALICE, Side::Long, dec!(60), dec!(10)).unwrap();
        venue.advance_block(15);
        let resp = open(&mut venue, ALICE, Side::Short, dec!(100), dec!(10)).unwrap();

        let position = venue.unadjusted_position(ETH, ALICE).unwrap();
        assert_eq!(position.side(), Some(Side::Short));
        assert!(resp.exchanged_position_size.is_negative());
        assert!(resp.exchanged_position_size.abs() > fp(dec!(37.5)));
        assert_eq!(venue.amm(ETH).unwrap().total_position_size(), position.size);
        // the new short is backed by a tenth of its notional
        assert_eq!(position.margin, position.open_notional.checked_div(fp(dec!(10))).unwrap());
    }

    #[test]
    fn close_over_the_band_only_takes_a_slice() {
        let mut venue = venue();
        open(&mut venue, ALICE, Side::Long, dec!(60), dec!(10)).unwrap();
        venue.advance_block(15);
        venue
            .amm_admin(ETH, |amm, _| amm.set_fluctuation_limit_ratio(OWNER, fp(dec!(0.1))))
            .unwrap();

        venue.close_position(ALICE, ETH, FixedPoint::ZERO).unwrap();
        let position = venue.unadjusted_position(ETH, ALICE).unwrap();
        assert_eq!(position.size, sfp(dec!(28.125)));
        assert_eq!(position.open_notional, fp(dec!(450)));
    }

    #[test]
    fn maximum_leverage_position() {
        let mut venue = venue();
        open(&mut venue, ALICE, Side::Long, dec!(50), dec!(10)).unwrap();
        assert!(matches!(
            open(&mut venue, BOB, Side::Long, dec!(50), dec!(10.5)),
            Err(ClearingHouseError::MarginRatioNotMet { .. })
        ));
    }
}

/// Tests funding over several periods.
mod funding_tests {
    use super::*;

    #[test]
    fn funding_multiple_periods() {
        let mut venue = venue();
        open(&mut venue, ALICE, Side::Long, dec!(20), dec!(5)).unwrap();
        let size = venue.unadjusted_position(ETH, ALICE).unwrap().size;
        let fund_before = wallet(&venue, FUND);

        let mut cumulative = SignedFixedPoint::ZERO;
        let mut paid = SignedFixedPoint::ZERO;
        for _ in 0..3 {
            venue.advance_block(3_600);
            set_oracle(&mut venue, dec!(10));
            let result = venue.pay_funding(ETH).unwrap();
            // spot sits above the oracle: longs pay every period
            assert!(result.premium_fraction.is_positive());
            cumulative = cumulative.checked_add(result.premium_fraction).unwrap();
            paid = paid.checked_add(result.paid_to_insurance_fund).unwrap();
            assert_eq!(result.cumulative_premium_fraction, cumulative);
        }

        let fund_after = wallet(&venue, FUND).to_signed().unwrap();
        assert_eq!(fund_after, fund_before.to_signed().unwrap().checked_add(paid).unwrap());
        let owed = cumulative.checked_mul(size).unwrap();
        // per-period products truncate separately
        assert!(paid.checked_sub(owed).unwrap().abs() <= FixedPoint::from_raw(3));
        let margin = venue.position(ETH, ALICE).unwrap().margin;
        assert_eq!(margin.to_signed().unwrap(), sfp(dec!(20)).checked_sub(owed).unwrap());
    }

    #[test]
    fn funding_with_zero_positions() {
        let mut venue = venue();
        venue.advance_block(3_600);
        set_oracle(&mut venue, dec!(12));
        let fund_before = wallet(&venue, FUND);
        let result = venue.pay_funding(ETH).unwrap();
        assert!(result.paid_to_insurance_fund.is_zero());
        assert_eq!(wallet(&venue, FUND), fund_before);
    }
}
