//! Venue fixtures shared by the integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_perps::*;

pub const OWNER: Address = Address(1);
pub const ALICE: Address = Address(0xA);
pub const BOB: Address = Address(0xB);
pub const CAROL: Address = Address(0xC);
pub const KEEPER: Address = Address(0x11);
pub const FUND: Address = Address(0x1F);
pub const PERP: AssetId = AssetId(0);
pub const USDC: AssetId = AssetId(1);
pub const ETH: AmmId = AmmId(0);

pub fn fp(value: Decimal) -> FixedPoint {
    FixedPoint::from_decimal(value).unwrap()
}

pub fn sfp(value: Decimal) -> SignedFixedPoint {
    SignedFixedPoint::from_decimal(value).unwrap()
}

/// 1000 USDC : 100 ETH with no fees and no fluctuation band.
pub fn quiet_config() -> VenueConfig {
    let mut config = VenueConfig::default();
    config.amm.fluctuation_limit_ratio = Decimal::ZERO;
    config.amm.toll_ratio = Decimal::ZERO;
    config.amm.spread_ratio = Decimal::ZERO;
    config
}

/// Venue with one amm and an oracle at 10. Every named trader holds 10k USDC
/// and the fund holds `fund_balance`.
pub fn venue_with(config: &VenueConfig, fund_balance: Decimal) -> SimClearingHouse {
    let mut ledger = Ledger::new();
    ledger.register_asset(PERP, "PERP", 18);
    ledger.register_asset(USDC, "USDC", 18);
    for who in [ALICE, BOB, CAROL, KEEPER] {
        ledger::checked_mint(&mut ledger, USDC, who, fp(dec!(10_000))).unwrap();
    }
    if !fund_balance.is_zero() {
        ledger::checked_mint(&mut ledger, USDC, config.insurance_fund.address, fp(fund_balance)).unwrap();
    }

    let exchange = FixedRateExchange::new()
        .with_rate(PERP, fp(dec!(0.5)))
        .with_rate(USDC, fp(dec!(1)));
    let mut feed = MockPriceFeed::new();
    feed.set_price(&config.amm.price_feed_key, fp(dec!(10)), Timestamp::from_secs(0));

    let mut venue = SimClearingHouse::new(
        &config.clearing_house,
        &config.insurance_fund,
        OWNER,
        feed,
        ledger,
        exchange,
        BlockInfo::new(1, Timestamp::from_secs(0)),
    )
    .unwrap();
    venue.add_amm(OWNER, &config.amm).unwrap();
    venue.advance_block(15);
    venue
}

pub fn venue() -> SimClearingHouse {
    venue_with(&quiet_config(), dec!(5_000))
}

pub fn set_oracle(venue: &mut SimClearingHouse, price: Decimal) {
    let now = venue.block().timestamp;
    venue.feed_mut().set_price("ETH", fp(price), now);
}

pub fn open(
    venue: &mut SimClearingHouse,
    trader: Address,
    side: Side,
    margin: Decimal,
    leverage: Decimal,
) -> Result<PositionResp, ClearingHouseError> {
    venue.open_position(trader, ETH, side, fp(margin), fp(leverage), FixedPoint::ZERO)
}

pub fn wallet(venue: &SimClearingHouse, who: Address) -> FixedPoint {
    ledger::balance(venue.ledger(), USDC, who).unwrap()
}
