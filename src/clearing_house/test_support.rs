// shared fixtures for the clearing house unit tests

use super::core::SimClearingHouse;
use super::results::{ClearingHouseError, PositionResp};
use crate::config::{AmmConfig, ClearingHouseConfig, InsuranceFundConfig};
use crate::exchange::FixedRateExchange;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::ledger::{self, Ledger};
use crate::price_feed::MockPriceFeed;
use crate::types::{Address, AmmId, AssetId, BlockInfo, Side, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const OWNER: Address = Address(1);
pub const ALICE: Address = Address(0xA);
pub const BOB: Address = Address(0xB);
pub const CAROL: Address = Address(0xC);
pub const LIQUIDATOR: Address = Address(0x11);
pub const BACKSTOP: Address = Address(0x12);
pub const FUND: Address = Address(0x1F);
pub const FEE_POOL: Address = Address(0xFEE);
pub const PERP: AssetId = AssetId(0);
pub const USDC: AssetId = AssetId(1);
pub const ETH: AmmId = AmmId(0);

pub fn fp(value: Decimal) -> FixedPoint {
    FixedPoint::from_decimal(value).unwrap()
}

pub fn sfp(value: Decimal) -> SignedFixedPoint {
    SignedFixedPoint::from_decimal(value).unwrap()
}

/// 1000 quote : 100 base, no fees and no fluctuation band.
pub fn amm_config() -> AmmConfig {
    AmmConfig {
        fluctuation_limit_ratio: Decimal::ZERO,
        toll_ratio: Decimal::ZERO,
        spread_ratio: Decimal::ZERO,
        ..AmmConfig::default()
    }
}

pub fn ch_config() -> ClearingHouseConfig {
    ClearingHouseConfig::default()
}

/// Venue with one amm, funded wallets and an oracle at 10, one block after
/// the amm was created.
pub fn venue_with(amm: AmmConfig, config: ClearingHouseConfig) -> SimClearingHouse {
    let fund_config = InsuranceFundConfig::default();
    let mut ledger = Ledger::new();
    ledger.register_asset(PERP, "PERP", 18);
    ledger.register_asset(USDC, "USDC", 18);
    for who in [ALICE, BOB, CAROL, LIQUIDATOR, BACKSTOP] {
        ledger::checked_mint(&mut ledger, USDC, who, fp(dec!(10_000))).unwrap();
    }
    ledger::checked_mint(&mut ledger, USDC, fund_config.address, fp(dec!(5_000))).unwrap();

    let exchange = FixedRateExchange::new()
        .with_rate(PERP, fp(dec!(0.5)))
        .with_rate(USDC, fp(dec!(1)));
    let mut feed = MockPriceFeed::new();
    feed.set_price(&amm.price_feed_key, fp(dec!(10)), Timestamp::from_secs(0));

    let block = BlockInfo::new(1, Timestamp::from_secs(0));
    let mut venue = SimClearingHouse::new(&config, &fund_config, OWNER, feed, ledger, exchange, block).unwrap();
    venue.add_amm(OWNER, &amm).unwrap();
    venue.advance_block(15);
    venue
}

pub fn venue() -> SimClearingHouse {
    venue_with(amm_config(), ch_config())
}

/// Oracle update stamped with the current block.
pub fn set_oracle(venue: &mut SimClearingHouse, price: Decimal) {
    let now = venue.block().timestamp;
    let key = venue.amm(ETH).unwrap().price_feed_key().to_string();
    venue.feed_mut().set_price(&key, fp(price), now);
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
