// vamm-perps: perpetual futures venue priced by a virtual constant-product amm.
// the clearing house escrows margin and trades against the amms; the insurance
// fund absorbs losses beyond margin and can wind every amm down.
// all computation is deterministic. time and block numbers are passed in.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Address, AmmId, AssetId, Dir, Side, Timestamp, BlockInfo
//   1.4  fixed_point.rs: 18-decimal unsigned and signed fixed point
//   1.5  access.rs: role based access control
//   2.x  config.rs: amm, clearing house and insurance fund parameters
//   3.x  amm/: reserves, pricing, fluctuation guard, TWAP, funding
//   4.x  position.rs: position struct, pnl, margin after funding
//   5.x  clearing_house/: positions, margin, funding, liquidations, settlement
//   6.x  insurance_fund.rs: multi-asset fund, withdrawal waterfall, shutdown
//   6.3  inflation_monitor.rs: protocol token mint circuit breaker
//   9.x  price_feed.rs: oracle interface (mocked)
//   9.2  ledger.rs: token balances (mocked)
//   9.3  exchange.rs: token swaps for the fund (mocked)
//   11.x events.rs: state transition events for audit

// core modules
pub mod amm;
pub mod clearing_house;
pub mod fixed_point;
pub mod position;
pub mod types;

// loss absorption
pub mod inflation_monitor;
pub mod insurance_fund;

// integration modules
pub mod access;
pub mod config;
pub mod events;
pub mod exchange;
pub mod ledger;
pub mod price_feed;

// re exports for convenience
pub use access::{AccessControl, AccessError, Role};
pub use amm::{Amm, AmmError, FundingSettlement};
pub use clearing_house::{
    ClearingHouse, ClearingHouseError, FundingResult, LiquidationResult, MarginParams, MarketState, PositionResp,
    SimClearingHouse,
};
pub use config::{AmmConfig, ClearingHouseConfig, ConfigError, InsuranceFundConfig, VenueConfig};
pub use events::*;
pub use exchange::{Exchange, ExchangeError, FixedRateExchange};
pub use fixed_point::{FixedPoint, MathError, SignedFixedPoint};
pub use inflation_monitor::InflationMonitor;
pub use insurance_fund::{InsuranceFund, InsuranceFundError};
pub use ledger::{Ledger, LedgerError, TokenLedger};
pub use position::*;
pub use price_feed::{MockPriceFeed, PriceAnswer, PriceFeed, PriceFeedError};
pub use types::*;
