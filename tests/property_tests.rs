//! Property-based tests for the curve and the fixed point math.
//!
//! These verify the pricing invariants the clearing house relies on: k never
//! shrinks, rounding never favors the trader, and fixed point rounding stays
//! within one unit.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

const OWNER: Address = Address(1);
const HOUSE: Address = Address(2);

fn fp(value: Decimal) -> FixedPoint {
    FixedPoint::from_decimal(value).unwrap()
}

fn block(number: u64) -> BlockInfo {
    BlockInfo::new(number, Timestamp::from_secs(1_000 + number * 15))
}

fn amm(quote_reserve: Decimal, base_reserve: Decimal) -> Amm {
    let config = AmmConfig {
        quote_asset_reserve: quote_reserve,
        base_asset_reserve: base_reserve,
        fluctuation_limit_ratio: Decimal::ZERO,
        ..AmmConfig::default()
    };
    let mut amm = Amm::new(&config, OWNER, block(0)).unwrap();
    amm.set_counter_party(OWNER, HOUSE).unwrap();
    amm
}

fn invariant(amm: &Amm) -> FixedPoint {
    let (quote, base) = amm.reserves();
    quote.checked_mul(base).unwrap()
}

fn reserve_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..100_000i64).prop_map(Decimal::from)
}

// up to 40% of a 1000 quote reserve, with fractional cents
fn quote_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..40_000i64).prop_map(|x| Decimal::new(x, 2))
}

fn fraction_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64).prop_map(|x| Decimal::new(x, 9))
}

// 0.01% to 40% of the reserve, off the whole-unit grid
fn share_strategy() -> impl Strategy<Value = (i64, Decimal)> {
    (1i64..4_000i64, fraction_strategy())
}

// ceil(quote / base) in whole units: the raw-unit slack one base unit of
// rounding turns into on the quote side
fn price_units(quote: FixedPoint, base: FixedPoint) -> u128 {
    quote.div_ceil(base).unwrap().raw().div_ceil(FixedPoint::ONE.raw())
}

fn dir_strategy() -> impl Strategy<Value = Dir> {
    prop_oneof![Just(Dir::AddToAmm), Just(Dir::RemoveFromAmm)]
}

proptest! {
    /// Swapping in either direction never shrinks quote * base.
    #[test]
    fn invariant_never_decreases(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        quote_pct in 1i64..40i64,
        dir in dir_strategy(),
    ) {
        let mut amm = amm(quote_reserve, base_reserve);
        let before = invariant(&amm);
        let quote = fp(quote_reserve * Decimal::new(quote_pct, 2));

        amm.swap_input(HOUSE, dir, quote, FixedPoint::ZERO, false, block(1)).unwrap();
        prop_assert!(invariant(&amm) >= before);
    }

    /// Buying base and selling it straight back never returns more quote.
    #[test]
    fn round_trip_never_profits(quote in quote_strategy()) {
        let mut amm = amm(dec!(1000), dec!(100));
        let paid = fp(quote);
        let base = amm.swap_input(HOUSE, Dir::AddToAmm, paid, FixedPoint::ZERO, false, block(1)).unwrap();
        let received = amm.swap_output(HOUSE, Dir::AddToAmm, base, FixedPoint::ZERO, block(1)).unwrap();
        prop_assert!(received <= paid, "received {} for {}", received, paid);
    }

    /// Shorting base and buying it back never costs less quote than it raised.
    #[test]
    fn short_round_trip_never_profits(quote in quote_strategy()) {
        let mut amm = amm(dec!(1000), dec!(100));
        let raised = fp(quote);
        let base = amm.swap_input(HOUSE, Dir::RemoveFromAmm, raised, FixedPoint::ZERO, false, block(1)).unwrap();
        let cost = amm.swap_output(HOUSE, Dir::RemoveFromAmm, base, FixedPoint::ZERO, block(1)).unwrap();
        prop_assert!(cost >= raised, "cost {} for {}", cost, raised);
    }

    /// Pricing is read only and agrees with the swap that follows.
    #[test]
    fn quote_matches_swap(quote in quote_strategy(), dir in dir_strategy()) {
        let mut amm = amm(dec!(1000), dec!(100));
        let reserves = amm.reserves();
        let quoted = amm.input_price(dir, fp(quote)).unwrap();
        prop_assert_eq!(amm.reserves(), reserves);

        let swapped = amm.swap_input(HOUSE, dir, fp(quote), FixedPoint::ZERO, false, block(1)).unwrap();
        prop_assert_eq!(quoted, swapped);
    }

    /// A long pushes spot up and a short pushes it down.
    #[test]
    fn spot_moves_with_the_trade(quote in quote_strategy(), dir in dir_strategy()) {
        let mut amm = amm(dec!(1000), dec!(100));
        let before = amm.spot_price().unwrap();
        amm.swap_input(HOUSE, dir, fp(quote), FixedPoint::ZERO, false, block(1)).unwrap();
        let after = amm.spot_price().unwrap();
        match dir {
            Dir::AddToAmm => prop_assert!(after > before),
            Dir::RemoveFromAmm => prop_assert!(after < before),
        }
    }

    /// Total position size tracks the signed sum of swapped base.
    #[test]
    fn total_position_size_tracks_swaps(
        trades in proptest::collection::vec((dir_strategy(), 1i64..5_000i64), 1..12),
    ) {
        let mut amm = amm(dec!(1000), dec!(100));
        let mut expected = SignedFixedPoint::ZERO;
        for (i, (dir, cents)) in trades.into_iter().enumerate() {
            let quote = fp(Decimal::new(cents, 2));
            let Ok(base) = amm.swap_input(HOUSE, dir, quote, FixedPoint::ZERO, false, block(1 + i as u64)) else {
                continue;
            };
            let signed = base.to_signed().unwrap();
            expected = match dir {
                Dir::AddToAmm => expected.checked_add(signed).unwrap(),
                Dir::RemoveFromAmm => expected.checked_sub(signed).unwrap(),
            };
        }
        prop_assert_eq!(amm.total_position_size(), expected);
    }

    /// Pricing a long's base back costs at most the quote it came from, short
    /// by no more than one raw unit per unit of post-trade price.
    #[test]
    fn long_pricing_round_trip_is_bounded(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        (bp, frac) in share_strategy(),
    ) {
        let amm = amm(quote_reserve, base_reserve);
        let x = fp(quote_reserve * Decimal::new(bp, 4) + frac);
        let base = amm.input_price(Dir::AddToAmm, x).unwrap();
        let back = amm.output_price(Dir::RemoveFromAmm, base).unwrap();

        let (quote, reserve) = amm.reserves();
        let bound = price_units(quote.checked_add(x).unwrap(), reserve.checked_sub(base).unwrap()) + 1;
        prop_assert!(back <= x, "priced back {} for {}", back, x);
        prop_assert!(x.raw() - back.raw() <= bound, "delta {} over {}", x.raw() - back.raw(), bound);
    }

    /// The short side mirrors it: pricing the owed base back returns at least
    /// the quote raised, over by at most the same slack.
    #[test]
    fn short_pricing_round_trip_is_bounded(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        (bp, frac) in share_strategy(),
    ) {
        let amm = amm(quote_reserve, base_reserve);
        let x = fp(quote_reserve * Decimal::new(bp, 4) + frac);
        let base = amm.input_price(Dir::RemoveFromAmm, x).unwrap();
        let back = amm.output_price(Dir::AddToAmm, base).unwrap();

        let (quote, reserve) = amm.reserves();
        let bound = price_units(quote.checked_sub(x).unwrap(), reserve.checked_add(base).unwrap()) + 1;
        prop_assert!(back >= x, "priced back {} for {}", back, x);
        prop_assert!(back.raw() - x.raw() <= bound, "delta {} over {}", back.raw() - x.raw(), bound);
    }

    /// Adding and then removing the same quote restores the quote reserve
    /// exactly and leaves the base reserve a few raw units richer at most.
    #[test]
    fn opposite_equal_swaps_restore_reserves(
        quote_reserve in reserve_strategy(),
        base_reserve in reserve_strategy(),
        (bp, frac) in share_strategy(),
        first in dir_strategy(),
    ) {
        let mut amm = amm(quote_reserve, base_reserve);
        let before = amm.reserves();
        let x = fp(quote_reserve * Decimal::new(bp, 4) + frac);
        amm.swap_input(HOUSE, first, x, FixedPoint::ZERO, false, block(1)).unwrap();
        amm.swap_input(HOUSE, first.opposite(), x, FixedPoint::ZERO, false, block(1)).unwrap();

        let (quote, base) = amm.reserves();
        prop_assert_eq!(quote, before.0);
        prop_assert!(base >= before.1);
        prop_assert!(base.raw() - before.1.raw() <= 3, "base drifted {} units", base.raw() - before.1.raw());
        prop_assert!(amm.total_position_size().abs().raw() <= 3);
    }

    /// Rounding up lands at most one unit above rounding down.
    #[test]
    fn ceil_within_one_unit_of_floor(a in fraction_strategy(), b in fraction_strategy()) {
        let (a, b) = (fp(a), fp(b));
        let floor = a.checked_mul(b).unwrap();
        let ceil = a.mul_ceil(b).unwrap();
        prop_assert!(ceil >= floor);
        prop_assert!(ceil.raw() - floor.raw() <= 1);

        let floor = a.checked_div(b).unwrap();
        let ceil = a.div_ceil(b).unwrap();
        prop_assert!(ceil >= floor);
        prop_assert!(ceil.raw() - floor.raw() <= 1);
    }

    /// Decimal conversion is lossless within 18 fractional digits.
    #[test]
    fn decimal_conversion_is_exact(value in fraction_strategy()) {
        prop_assert_eq!(fp(value).to_decimal(), value.normalize());
        let negated = SignedFixedPoint::from_decimal(-value).unwrap();
        prop_assert_eq!(negated.to_decimal(), (-value).normalize());
        prop_assert_eq!(negated.abs(), fp(value));
    }

    /// Unrealized pnl of a long and a short with the same notionals cancel.
    #[test]
    fn pnl_is_symmetric(open in quote_strategy(), now in quote_strategy(), size in fraction_strategy()) {
        let size = SignedFixedPoint::from_decimal(size).unwrap();
        let long = unrealized_pnl(size, fp(open), fp(now)).unwrap();
        let short = unrealized_pnl(size.checked_neg().unwrap(), fp(open), fp(now)).unwrap();
        prop_assert_eq!(long.checked_add(short).unwrap(), SignedFixedPoint::ZERO);
    }
}

mod edge_cases {
    use super::*;

    #[test]
    fn removing_the_whole_reserve_is_rejected() {
        let amm = amm(dec!(1000), dec!(100));
        assert!(matches!(
            amm.input_price(Dir::RemoveFromAmm, fp(dec!(1000))),
            Err(AmmError::ReserveExhausted)
        ));
        assert!(matches!(
            amm.output_price(Dir::RemoveFromAmm, fp(dec!(100))),
            Err(AmmError::ReserveExhausted)
        ));
    }

    #[test]
    fn trading_limit_caps_quote_removed() {
        let mut amm = amm(dec!(1000), dec!(100));
        assert!(matches!(
            amm.swap_input(HOUSE, Dir::RemoveFromAmm, fp(dec!(901)), FixedPoint::ZERO, false, block(1)),
            Err(AmmError::OverTradingLimit)
        ));
    }

    #[test]
    fn one_unit_trades_round_to_nothing_for_the_trader() {
        let amm = amm(dec!(1000), dec!(100));
        let tiny = FixedPoint::from_raw(1);
        assert_eq!(amm.input_price(Dir::AddToAmm, tiny).unwrap(), FixedPoint::ZERO);
        assert!(amm.input_price(Dir::RemoveFromAmm, tiny).unwrap() >= tiny);
    }

    #[test]
    fn only_the_counter_party_swaps() {
        let mut amm = amm(dec!(1000), dec!(100));
        assert!(matches!(
            amm.swap_input(Address(3), Dir::AddToAmm, fp(dec!(10)), FixedPoint::ZERO, false, block(1)),
            Err(AmmError::Access(_))
        ));
    }
}
