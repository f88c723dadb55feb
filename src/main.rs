//! vAMM perpetual venue simulation.
//!
//! Walks one ETH-PERP market through trading, funding, liquidation, the
//! insurance fund waterfall and a global shutdown. Set `RUST_LOG=debug` to see
//! every swap and event.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use vamm_perps::*;

const OWNER: Address = Address(1);
const ALICE: Address = Address(0xA);
const BOB: Address = Address(0xB);
const KEEPER: Address = Address(0x11);
const PERP: AssetId = AssetId(0);
const USDC: AssetId = AssetId(1);
const ETH: AmmId = AmmId(0);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    println!("vAMM Perpetual Venue Simulation");
    println!("ETH-PERP on 1000 USDC : 100 ETH virtual reserves");
    println!("Genesis block at {}\n", Timestamp::now());

    scenario_1_open_and_close();
    scenario_2_reverse_position();
    scenario_3_funding();
    scenario_4_partial_liquidation();
    scenario_5_insurance_waterfall();
    scenario_6_many_traders();

    println!("\nAll simulations completed successfully.");
}

fn fp(value: Decimal) -> FixedPoint {
    FixedPoint::from_decimal(value).unwrap()
}

fn venue(config: VenueConfig) -> SimClearingHouse {
    let genesis = Timestamp::now();
    let mut ledger = Ledger::new();
    ledger.register_asset(PERP, "PERP", 18);
    ledger.register_asset(USDC, "USDC", 18);
    for who in [ALICE, BOB, KEEPER] {
        ledger::checked_mint(&mut ledger, USDC, who, fp(dec!(10_000))).unwrap();
    }
    ledger::checked_mint(&mut ledger, USDC, config.insurance_fund.address, fp(dec!(1_000))).unwrap();

    let exchange = FixedRateExchange::new()
        .with_rate(PERP, fp(dec!(0.5)))
        .with_rate(USDC, fp(dec!(1)));
    let mut feed = MockPriceFeed::new();
    feed.set_price(&config.amm.price_feed_key, fp(dec!(10)), genesis);

    let mut venue = SimClearingHouse::new(
        &config.clearing_house,
        &config.insurance_fund,
        OWNER,
        feed,
        ledger,
        exchange,
        BlockInfo::new(1, genesis),
    )
    .unwrap();
    venue.add_amm(OWNER, &config.amm).unwrap();
    venue.advance_block(15);
    venue
}

fn quiet_config() -> VenueConfig {
    let mut config = VenueConfig::default();
    config.amm.fluctuation_limit_ratio = Decimal::ZERO;
    config
}

fn wallet(venue: &SimClearingHouse, who: Address) -> FixedPoint {
    ledger::balance(venue.ledger(), USDC, who).unwrap()
}

fn refresh_oracle(venue: &mut SimClearingHouse, price: Decimal) {
    let now = venue.block().timestamp;
    venue.feed_mut().set_price("ETH", fp(price), now);
}

/// Long, then close at an unchanged price.
fn scenario_1_open_and_close() {
    println!("Scenario 1: Open and Close\n");
    let mut venue = venue(quiet_config());

    let resp = venue
        .open_position(ALICE, ETH, Side::Long, fp(dec!(60)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    let amm = venue.amm(ETH).unwrap();
    println!("  Alice opens 60 USDC x10 long: {} ETH", resp.exchanged_position_size);
    println!("  Spot moves 10 -> {}", amm.spot_price().unwrap());
    println!("  Fee paid: {}", wallet(&venue, ALICE).abs_diff(fp(dec!(9_940))));

    venue.advance_block(15);
    let close = venue.close_position(ALICE, ETH, FixedPoint::ZERO).unwrap();
    println!("  Alice closes for {} USDC, pnl {}", close.exchanged_quote_asset_amount, close.realized_pnl);
    println!("  Alice wallet: {}\n", wallet(&venue, ALICE));
}

/// A larger opposite trade closes and opens the other way.
fn scenario_2_reverse_position() {
    println!("Scenario 2: Reverse Position\n");
    let mut venue = venue(quiet_config());

    venue
        .open_position(ALICE, ETH, Side::Long, fp(dec!(60)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    venue.advance_block(15);
    let resp = venue
        .open_position(ALICE, ETH, Side::Short, fp(dec!(100)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    let position = venue.position(ETH, ALICE).unwrap();
    println!("  Alice long 600 notional, then short 1000 notional");
    println!("  Exchanged {} quote, size now {}", resp.exchanged_quote_asset_amount, position.size);
    println!("  Margin {}, open notional {}\n", position.margin, position.open_notional);
}

/// Spot above the oracle for an hour: longs pay.
fn scenario_3_funding() {
    println!("Scenario 3: Funding\n");
    let mut venue = venue(quiet_config());

    venue
        .open_position(ALICE, ETH, Side::Long, fp(dec!(100)), fp(dec!(5)), FixedPoint::ZERO)
        .unwrap();
    venue
        .open_position(BOB, ETH, Side::Short, fp(dec!(50)), fp(dec!(4)), FixedPoint::ZERO)
        .unwrap();
    let fund = venue.insurance_fund().address();
    let fund_before = wallet(&venue, fund);

    venue.advance_block(3_600);
    refresh_oracle(&mut venue, dec!(10));
    let result = venue.pay_funding(ETH).unwrap();
    println!("  Premium fraction {}, rate {}", result.premium_fraction, result.funding_rate);
    println!("  Paid to insurance fund: {}", result.paid_to_insurance_fund);
    println!("  Fund balance {} -> {}", fund_before, wallet(&venue, fund));
    println!(
        "  Alice margin after funding {}, Bob margin after funding {}\n",
        venue.position(ETH, ALICE).unwrap().margin,
        venue.position(ETH, BOB).unwrap().margin
    );
}

/// A quarter of an underwater long is liquidated.
fn scenario_4_partial_liquidation() {
    println!("Scenario 4: Partial Liquidation\n");
    let mut config = quiet_config();
    config.clearing_house.maintenance_margin_ratio = dec!(0.1);
    config.clearing_house.liquidation_fee_ratio = dec!(0.025);
    let mut venue = venue(config);

    venue
        .open_position(ALICE, ETH, Side::Long, fp(dec!(25)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    venue.advance_block(15);
    venue
        .open_position(BOB, ETH, Side::Short, fp(dec!(10)), fp(dec!(5)), FixedPoint::ZERO)
        .unwrap();
    venue.advance_block(3_600);
    refresh_oracle(&mut venue, dec!(10));

    println!("  Alice margin ratio: {}", venue.margin_ratio(ETH, ALICE).unwrap());
    let result = venue.liquidate(KEEPER, ETH, ALICE).unwrap();
    println!(
        "  Liquidated {} ETH for {} USDC, partial: {}",
        result.liquidated_size.abs(),
        result.position_notional,
        result.partial
    );
    println!(
        "  Keeper fee {}, fund fee {}, realized pnl {}",
        result.fee_to_liquidator, result.fee_to_insurance_fund, result.realized_pnl
    );
    let position = venue.position(ETH, ALICE).unwrap();
    println!("  Alice left with {} ETH, margin {}", position.size, position.margin);
    match venue.close_position(ALICE, ETH, FixedPoint::ZERO) {
        Err(err) => println!("  Same-block close rejected: {}\n", err),
        Ok(_) => println!("  Same-block close went through\n"),
    }
}

/// The fund runs dry, mints its protocol token and trips the breaker.
fn scenario_5_insurance_waterfall() {
    println!("Scenario 5: Insurance Fund Waterfall\n");
    let mut venue = venue(quiet_config());
    venue.set_backstop_liquidity_provider(OWNER, KEEPER, true).unwrap();
    let fund = venue.insurance_fund().address();

    venue
        .open_position(ALICE, ETH, Side::Long, fp(dec!(500)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    venue.advance_block(15);
    venue
        .open_position(BOB, ETH, Side::Short, fp(dec!(300)), fp(dec!(10)), FixedPoint::ZERO)
        .unwrap();
    venue.advance_block(3_600);
    refresh_oracle(&mut venue, dec!(10));

    println!("  Fund holds {} USDC", wallet(&venue, fund));
    let result = venue.liquidate(KEEPER, ETH, ALICE).unwrap();
    println!("  Alice liquidated with bad debt {}", result.bad_debt);
    println!("  Fund holds {} USDC", wallet(&venue, fund));
    let minted: Vec<_> = venue.insurance_fund().monitor().history().collect();
    println!("  Protocol token mints: {}", minted.len());

    match venue.shutdown_all_amm() {
        Ok(prices) => println!("  Breaker tripped, amms shut at {:?}", prices.iter().map(|p| p.to_string()).collect::<Vec<_>>()),
        Err(err) => println!("  Shutdown refused: {}", err),
    }
    if !venue.amm(ETH).unwrap().is_open() {
        let paid = venue.settle_position(BOB, ETH).unwrap();
        println!("  Bob settles for {}\n", paid);
    } else {
        println!();
    }
}

/// Alternating traders push the price around; keepers sweep after each block.
fn scenario_6_many_traders() {
    println!("Scenario 6: Many Traders\n");
    let mut venue = venue(quiet_config());
    let traders: Vec<Address> = (0..20).map(|i| Address(0x100 + i)).collect();
    for &trader in &traders {
        ledger::checked_mint(venue.ledger_mut(), USDC, trader, fp(dec!(1_000))).unwrap();
    }
    venue.set_backstop_liquidity_provider(OWNER, KEEPER, true).unwrap();

    let mut opened = 0;
    for (i, &trader) in traders.iter().enumerate() {
        let side = if i % 3 == 0 { Side::Short } else { Side::Long };
        let margin = dec!(5) + Decimal::from(i as u64 % 4) * dec!(5);
        if venue
            .open_position(trader, ETH, side, fp(margin), fp(dec!(8)), FixedPoint::ZERO)
            .is_ok()
        {
            opened += 1;
        }
        venue.advance_block(15);
    }
    println!("  Opened {} of {} positions", opened, traders.len());
    println!("  Spot {}", venue.amm(ETH).unwrap().spot_price().unwrap());

    venue.advance_block(60);
    refresh_oracle(&mut venue, dec!(10));
    let mut liquidations = 0;
    let mut bad_debt = FixedPoint::ZERO;
    for &trader in &traders {
        if let Ok(result) = venue.liquidate(KEEPER, ETH, trader) {
            liquidations += 1;
            bad_debt = bad_debt.checked_add(result.bad_debt).unwrap();
            venue.advance_block(1);
        }
    }
    println!("  Liquidations: {}, bad debt {}", liquidations, bad_debt);
    println!("  Open interest {}", venue.market(ETH).unwrap().open_interest_notional);
    println!("  Events recorded: {}", venue.events().events().len());
}
