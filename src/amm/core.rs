// 3.1 amm/core.rs: Amm state, construction and admin actions.

use super::funding::floor_to_hour;
use super::results::AmmError;
use crate::access::{AccessControl, Role};
use crate::config::AmmConfig;
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::types::{Address, AssetId, BlockInfo, Timestamp};
use serde::{Deserialize, Serialize};

/// Reserves at the end of a block. Same-block swaps overwrite the block's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub quote_asset_reserve: FixedPoint,
    pub base_asset_reserve: FixedPoint,
    pub cumulative_notional: SignedFixedPoint,
    pub block_number: u64,
    pub timestamp: Timestamp,
}

/// Recorded at construction and at every admin reserve reset.
/// TWAPs never integrate past `snapshot_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChangedSnapshot {
    pub quote_asset_reserve: FixedPoint,
    pub base_asset_reserve: FixedPoint,
    pub cumulative_notional: SignedFixedPoint,
    pub timestamp: Timestamp,
    pub snapshot_index: usize,
}

/** 3.1: one virtual market. */
#[derive(Debug, Clone)]
pub struct Amm {
    pub(super) symbol: String,
    pub(super) price_feed_key: String,
    pub(super) quote_asset: AssetId,
    pub(super) quote_asset_reserve: FixedPoint,
    pub(super) base_asset_reserve: FixedPoint,
    pub(super) trade_limit_ratio: FixedPoint,
    pub(super) fluctuation_limit_ratio: FixedPoint,
    pub(super) toll_ratio: FixedPoint,
    pub(super) spread_ratio: FixedPoint,
    pub(super) max_holding_base_asset: FixedPoint,
    pub(super) open_interest_notional_cap: FixedPoint,
    pub(super) funding_period: u64,
    pub(super) funding_buffer_period: u64,
    pub(super) spot_price_twap_interval: u64,
    pub(super) oracle_max_age: u64,
    pub(super) next_funding_time: Timestamp,
    pub(super) premium_fractions: Vec<SignedFixedPoint>,
    pub(super) funding_rate: SignedFixedPoint,
    // net base held by traders: longs positive
    pub(super) total_position_size: SignedFixedPoint,
    pub(super) cumulative_notional: SignedFixedPoint,
    pub(super) reserve_snapshots: Vec<ReserveSnapshot>,
    pub(super) liquidity_changes: Vec<LiquidityChangedSnapshot>,
    // block in which the one fluctuation override was spent
    pub(super) override_block: Option<u64>,
    pub(super) open: bool,
    pub(super) settlement_price: Option<FixedPoint>,
    pub(super) access: AccessControl,
}

impl Amm {
    pub fn new(config: &AmmConfig, owner: Address, block: BlockInfo) -> Result<Self, AmmError> {
        config.validate()?;
        let quote_asset_reserve = FixedPoint::from_decimal(config.quote_asset_reserve)?;
        let base_asset_reserve = FixedPoint::from_decimal(config.base_asset_reserve)?;

        let mut amm = Self {
            symbol: config.symbol.clone(),
            price_feed_key: config.price_feed_key.clone(),
            quote_asset: config.quote_asset,
            quote_asset_reserve,
            base_asset_reserve,
            trade_limit_ratio: FixedPoint::from_decimal(config.trade_limit_ratio)?,
            fluctuation_limit_ratio: FixedPoint::from_decimal(config.fluctuation_limit_ratio)?,
            toll_ratio: FixedPoint::from_decimal(config.toll_ratio)?,
            spread_ratio: FixedPoint::from_decimal(config.spread_ratio)?,
            max_holding_base_asset: FixedPoint::from_decimal(config.max_holding_base_asset)?,
            open_interest_notional_cap: FixedPoint::from_decimal(config.open_interest_notional_cap)?,
            funding_period: config.funding_period_secs,
            funding_buffer_period: config.funding_period_secs / 2,
            spot_price_twap_interval: config.spot_price_twap_interval_secs,
            oracle_max_age: config.oracle_max_age_secs,
            next_funding_time: floor_to_hour(block.timestamp.as_secs() + config.funding_period_secs),
            premium_fractions: Vec::new(),
            funding_rate: SignedFixedPoint::ZERO,
            total_position_size: SignedFixedPoint::ZERO,
            cumulative_notional: SignedFixedPoint::ZERO,
            reserve_snapshots: Vec::new(),
            liquidity_changes: Vec::new(),
            override_block: None,
            open: true,
            settlement_price: None,
            access: AccessControl::with_owner(owner),
        };
        amm.record_liquidity_change(block);

        tracing::info!(
            symbol = %amm.symbol,
            quote = %quote_asset_reserve,
            base = %base_asset_reserve,
            "amm created"
        );
        Ok(amm)
    }

    // 3.1.1: accessors

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price_feed_key(&self) -> &str {
        &self.price_feed_key
    }

    pub fn quote_asset(&self) -> AssetId {
        self.quote_asset
    }

    /// (quote, base)
    pub fn reserves(&self) -> (FixedPoint, FixedPoint) {
        (self.quote_asset_reserve, self.base_asset_reserve)
    }

    pub fn trade_limit_ratio(&self) -> FixedPoint {
        self.trade_limit_ratio
    }

    pub fn fluctuation_limit_ratio(&self) -> FixedPoint {
        self.fluctuation_limit_ratio
    }

    pub fn max_holding_base_asset(&self) -> FixedPoint {
        self.max_holding_base_asset
    }

    pub fn open_interest_notional_cap(&self) -> FixedPoint {
        self.open_interest_notional_cap
    }

    pub fn funding_period(&self) -> u64 {
        self.funding_period
    }

    pub fn spot_price_twap_interval(&self) -> u64 {
        self.spot_price_twap_interval
    }

    pub fn next_funding_time(&self) -> Timestamp {
        self.next_funding_time
    }

    pub fn premium_fractions(&self) -> &[SignedFixedPoint] {
        &self.premium_fractions
    }

    pub fn funding_rate(&self) -> SignedFixedPoint {
        self.funding_rate
    }

    pub fn total_position_size(&self) -> SignedFixedPoint {
        self.total_position_size
    }

    pub fn cumulative_notional(&self) -> SignedFixedPoint {
        self.cumulative_notional
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn settlement_price(&self) -> Option<FixedPoint> {
        self.settlement_price
    }

    pub fn snapshots(&self) -> &[ReserveSnapshot] {
        &self.reserve_snapshots
    }

    pub fn latest_snapshot(&self) -> Option<&ReserveSnapshot> {
        self.reserve_snapshots.last()
    }

    pub fn liquidity_changes(&self) -> &[LiquidityChangedSnapshot] {
        &self.liquidity_changes
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn is_counter_party(&self, who: Address) -> bool {
        self.access.has_role(Role::CounterParty, who)
    }

    pub(super) fn require_open(&self) -> Result<(), AmmError> {
        if !self.open {
            return Err(AmmError::Closed);
        }
        Ok(())
    }

    // 3.1.2: admin. the owner wires the counter party and the shutdown role.

    /// Replaces the counter party. Only one holder at a time.
    pub fn set_counter_party(&mut self, caller: Address, counter_party: Address) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        let previous: Vec<Address> = self.access.holders(Role::CounterParty).collect();
        for who in previous {
            self.access.revoke(Role::CounterParty, who);
        }
        self.access.grant(Role::CounterParty, counter_party);
        Ok(())
    }

    pub fn set_global_shutdown(&mut self, caller: Address, who: Address) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        self.access.grant(Role::GlobalShutdown, who);
        Ok(())
    }

    /// Opening restarts the funding clock. A shut down Amm stays closed.
    pub fn set_open(&mut self, caller: Address, open: bool, block: BlockInfo) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        if self.settlement_price.is_some() {
            return Err(AmmError::Closed);
        }
        if open && !self.open {
            self.next_funding_time = floor_to_hour(block.timestamp.as_secs() + self.funding_period);
        }
        self.open = open;
        Ok(())
    }

    pub fn set_fluctuation_limit_ratio(&mut self, caller: Address, ratio: FixedPoint) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        self.fluctuation_limit_ratio = ratio;
        Ok(())
    }

    pub fn set_caps(
        &mut self,
        caller: Address,
        max_holding_base_asset: FixedPoint,
        open_interest_notional_cap: FixedPoint,
    ) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        self.max_holding_base_asset = max_holding_base_asset;
        self.open_interest_notional_cap = open_interest_notional_cap;
        Ok(())
    }

    pub fn set_fee_ratios(&mut self, caller: Address, toll: FixedPoint, spread: FixedPoint) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        self.toll_ratio = toll;
        self.spread_ratio = spread;
        Ok(())
    }

    /// One-way close. Settlement price is the reserve ratio at the time of the call
    /// and never changes afterwards; repeated calls return it unchanged.
    pub fn shutdown(&mut self, caller: Address) -> Result<FixedPoint, AmmError> {
        self.access.require_any(&[Role::Owner, Role::GlobalShutdown], caller)?;
        if let Some(price) = self.settlement_price {
            return Ok(price);
        }
        let price = self.spot_price()?;
        self.settlement_price = Some(price);
        self.open = false;
        tracing::warn!(symbol = %self.symbol, settlement_price = %price, "amm shut down");
        Ok(price)
    }

    /// Admin reserve reset. Changes k, so it starts a new TWAP baseline.
    pub fn reset_reserves(
        &mut self,
        caller: Address,
        quote_asset_reserve: FixedPoint,
        base_asset_reserve: FixedPoint,
        block: BlockInfo,
    ) -> Result<(), AmmError> {
        self.access.require(Role::Owner, caller)?;
        if quote_asset_reserve.is_zero() || base_asset_reserve.is_zero() {
            return Err(AmmError::ReserveExhausted);
        }
        self.quote_asset_reserve = quote_asset_reserve;
        self.base_asset_reserve = base_asset_reserve;
        self.record_liquidity_change(block);
        tracing::info!(
            symbol = %self.symbol,
            quote = %quote_asset_reserve,
            base = %base_asset_reserve,
            "reserves reset"
        );
        Ok(())
    }

    fn record_liquidity_change(&mut self, block: BlockInfo) {
        self.add_reserve_snapshot(block);
        self.liquidity_changes.push(LiquidityChangedSnapshot {
            quote_asset_reserve: self.quote_asset_reserve,
            base_asset_reserve: self.base_asset_reserve,
            cumulative_notional: self.cumulative_notional,
            timestamp: block.timestamp,
            snapshot_index: self.reserve_snapshots.len() - 1,
        });
    }

    /// First snapshot index a TWAP may use.
    pub(super) fn twap_floor_index(&self) -> usize {
        self.liquidity_changes.last().map(|c| c.snapshot_index).unwrap_or(0)
    }
}
