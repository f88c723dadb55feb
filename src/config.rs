// 2.0 config.rs: all venue settings in one place. ratios are Decimal here and
// become FixedPoint when a component is built.
// 2.1 AmmConfig is per market, ClearingHouseConfig and InsuranceFundConfig are global.

use crate::types::{Address, AssetId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Per market vAMM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmmConfig {
    // Market symbol (e.g. "ETH-PERP")
    pub symbol: String,
    // Oracle key for the index price
    pub price_feed_key: String,
    // Settlement asset
    pub quote_asset: AssetId,
    // Initial virtual reserves
    pub quote_asset_reserve: Decimal,
    pub base_asset_reserve: Decimal,
    // Largest share of a reserve one swap may remove
    pub trade_limit_ratio: Decimal,
    // Seconds between funding settlements
    pub funding_period_secs: u64,
    // Max price move per block, 0 disables the check
    pub fluctuation_limit_ratio: Decimal,
    // Fee to the fee pool
    pub toll_ratio: Decimal,
    // Fee to the insurance fund
    pub spread_ratio: Decimal,
    // Per trader position bound, 0 = unbounded
    pub max_holding_base_asset: Decimal,
    // Gross notional cap, 0 = uncapped
    pub open_interest_notional_cap: Decimal,
    // TWAP window used for PnL and funding
    pub spot_price_twap_interval_secs: u64,
    // Oracle answers older than this are stale
    pub oracle_max_age_secs: u64,
}

impl Default for AmmConfig {
    fn default() -> Self {
        Self {
            symbol: "ETH-PERP".to_string(),
            price_feed_key: "ETH".to_string(),
            quote_asset: AssetId(1),
            quote_asset_reserve: Decimal::new(1000, 0),
            base_asset_reserve: Decimal::new(100, 0),
            trade_limit_ratio: Decimal::new(9, 1), // 90%
            funding_period_secs: 3_600,
            fluctuation_limit_ratio: Decimal::new(12, 3), // 1.2%
            toll_ratio: Decimal::ZERO,
            spread_ratio: Decimal::new(1, 3), // 0.1%
            max_holding_base_asset: Decimal::ZERO,
            open_interest_notional_cap: Decimal::ZERO,
            spot_price_twap_interval_secs: 3_600,
            oracle_max_age_secs: 3_600,
        }
    }
}

/** 2.2: margin and liquidation settings shared by every market */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearingHouseConfig {
    // Margin ratio required to open or grow a position (1 / max leverage)
    pub init_margin_ratio: Decimal,
    // Below this a position can be liquidated
    pub maintenance_margin_ratio: Decimal,
    // Share of liquidated notional charged as penalty, split liquidator / fund
    pub liquidation_fee_ratio: Decimal,
    // Share of a position closed by one partial liquidation. 0 or 1 = always full
    pub partial_liquidation_ratio: Decimal,
    // Account that holds escrowed margin
    pub address: Address,
    // Receives the toll
    pub fee_pool: Address,
    // Maximum number of events to retain in memory
    pub max_events: usize,
}

impl Default for ClearingHouseConfig {
    fn default() -> Self {
        Self {
            init_margin_ratio: Decimal::new(1, 1),           // 10%, 10x
            maintenance_margin_ratio: Decimal::new(625, 4),  // 6.25%
            liquidation_fee_ratio: Decimal::new(125, 4),     // 1.25%
            partial_liquidation_ratio: Decimal::new(25, 2),  // 25%
            address: Address(0xC1EA),
            fee_pool: Address(0xFEE),
            max_events: 100_000,
        }
    }
}

// Insurance fund and circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceFundConfig {
    // Account that holds the fund's balances
    pub address: Address,
    // Minted to cover a shortfall when every other asset is exhausted
    pub protocol_token: AssetId,
    // Minted share of supply in the window that trips the breaker
    pub mint_threshold_ratio: Decimal,
    // Trailing window for the minted amount
    pub mint_window_secs: u64,
}

impl Default for InsuranceFundConfig {
    fn default() -> Self {
        Self {
            address: Address(0x1F),
            protocol_token: AssetId(0),
            mint_threshold_ratio: Decimal::new(1, 2), // 1%
            mint_window_secs: 7 * 24 * 3_600,         // one week
        }
    }
}

// Everything the simulator needs to stand a venue up
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueConfig {
    pub amm: AmmConfig,
    pub clearing_house: ClearingHouseConfig,
    pub insurance_fund: InsuranceFundConfig,
}

impl VenueConfig {
    // Lower leverage, tighter per-block moves
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.clearing_house.init_margin_ratio = Decimal::new(2, 1); // 5x
        config.clearing_house.maintenance_margin_ratio = Decimal::new(1, 1);
        config.amm.fluctuation_limit_ratio = Decimal::new(5, 3);
        config.amm.open_interest_notional_cap = Decimal::new(1_000_000, 0);
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.amm.validate()?;
        self.clearing_house.validate()?;
        self.insurance_fund.validate()
    }
}

fn is_ratio(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

impl AmmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quote_asset_reserve <= Decimal::ZERO || self.base_asset_reserve <= Decimal::ZERO {
            return Err(ConfigError::InvalidAmm {
                reason: "reserves must be positive".to_string(),
            });
        }
        if self.trade_limit_ratio <= Decimal::ZERO || self.trade_limit_ratio > Decimal::ONE {
            return Err(ConfigError::InvalidAmm {
                reason: "trade limit ratio must be in (0, 1]".to_string(),
            });
        }
        if self.funding_period_secs == 0 {
            return Err(ConfigError::InvalidAmm {
                reason: "funding period must be nonzero".to_string(),
            });
        }
        let ratios = [self.fluctuation_limit_ratio, self.toll_ratio, self.spread_ratio];
        if !ratios.into_iter().all(is_ratio) {
            return Err(ConfigError::InvalidAmm {
                reason: "fee and fluctuation ratios must be in [0, 1]".to_string(),
            });
        }
        if self.max_holding_base_asset < Decimal::ZERO || self.open_interest_notional_cap < Decimal::ZERO {
            return Err(ConfigError::InvalidAmm {
                reason: "caps cannot be negative".to_string(),
            });
        }
        if self.price_feed_key.is_empty() {
            return Err(ConfigError::InvalidAmm {
                reason: "price feed key is empty".to_string(),
            });
        }
        Ok(())
    }
}

impl ClearingHouseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.init_margin_ratio <= Decimal::ZERO || self.init_margin_ratio > Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "init margin ratio must be in (0, 1]".to_string(),
            });
        }
        if self.maintenance_margin_ratio <= Decimal::ZERO || self.maintenance_margin_ratio > self.init_margin_ratio {
            return Err(ConfigError::InvalidMargin {
                reason: "maintenance margin ratio must be in (0, init]".to_string(),
            });
        }
        if !is_ratio(self.liquidation_fee_ratio) || !is_ratio(self.partial_liquidation_ratio) {
            return Err(ConfigError::InvalidMargin {
                reason: "liquidation ratios must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

impl InsuranceFundConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_ratio(self.mint_threshold_ratio) {
            return Err(ConfigError::InvalidInsuranceFund {
                reason: "mint threshold must be in [0, 1]".to_string(),
            });
        }
        if self.mint_window_secs == 0 {
            return Err(ConfigError::InvalidInsuranceFund {
                reason: "mint window must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid amm config: {reason}")]
    InvalidAmm { reason: String },

    #[error("invalid margin config: {reason}")]
    InvalidMargin { reason: String },

    #[error("invalid insurance fund config: {reason}")]
    InvalidInsuranceFund { reason: String },
}
