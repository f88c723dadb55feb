// 5.0: clearing house. trades against the amms as their counter party,
// escrows margin, settles funding with the insurance fund and liquidates.
// one atomic transaction per public call; events commit only on success.

mod core;
mod funding;
mod liquidations;
mod margin;
mod positions;
mod results;
mod settlement;
#[cfg(test)]
mod test_support;

pub use self::core::{ClearingHouse, MarginParams, MarketState, SimClearingHouse};
pub use results::{ClearingHouseError, FundingResult, LiquidationResult, PositionResp};
