// 3.0: virtual constant-product market maker. reserves are accounting state only;
// the clearing house is the sole counter party allowed to move them.
// pricing and fees in pricing.rs, reserve mutation and the per-block fluctuation
// guard in swap.rs, time weighted prices in twap.rs, funding in funding.rs.

mod core;
mod funding;
mod pricing;
mod results;
mod swap;
mod twap;

pub use self::core::{Amm, LiquidityChangedSnapshot, ReserveSnapshot};
pub use funding::floor_to_hour;
pub use pricing::{input_price_with_reserves, output_price_with_reserves, MAX_ORACLE_SPREAD_RATIO};
pub use results::{AmmError, FundingSettlement};
