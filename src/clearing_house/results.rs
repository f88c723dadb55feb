// 5.0.2: result types and errors for clearing house operations.

use crate::access::AccessError;
use crate::amm::AmmError;
use crate::config::ConfigError;
use crate::fixed_point::{FixedPoint, MathError, SignedFixedPoint};
use crate::insurance_fund::InsuranceFundError;
use crate::ledger::LedgerError;
use crate::position::Position;
use crate::price_feed::PriceFeedError;
use crate::types::{Address, AmmId};

/// Outcome of one position mutation. `margin_to_vault` is what moves between the
/// trader and the clearing house: positive is pulled in, negative paid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionResp {
    pub position: Position,
    pub exchanged_quote_asset_amount: FixedPoint,
    pub exchanged_position_size: SignedFixedPoint,
    pub bad_debt: FixedPoint,
    pub funding_payment: SignedFixedPoint,
    pub realized_pnl: SignedFixedPoint,
    pub unrealized_pnl_after: SignedFixedPoint,
    pub margin_to_vault: SignedFixedPoint,
}

impl PositionResp {
    // close then reopen: totals of both legs, final position from the second
    pub(super) fn merge(close: PositionResp, increase: PositionResp) -> Result<Self, MathError> {
        Ok(Self {
            position: increase.position,
            exchanged_quote_asset_amount: close
                .exchanged_quote_asset_amount
                .checked_add(increase.exchanged_quote_asset_amount)?,
            exchanged_position_size: close
                .exchanged_position_size
                .checked_add(increase.exchanged_position_size)?,
            bad_debt: close.bad_debt.checked_add(increase.bad_debt)?,
            funding_payment: close.funding_payment.checked_add(increase.funding_payment)?,
            realized_pnl: close.realized_pnl.checked_add(increase.realized_pnl)?,
            unrealized_pnl_after: increase.unrealized_pnl_after,
            margin_to_vault: close.margin_to_vault.checked_add(increase.margin_to_vault)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub amm: AmmId,
    pub trader: Address,
    pub partial: bool,
    pub liquidated_size: SignedFixedPoint,
    pub position_notional: FixedPoint,
    pub fee_to_liquidator: FixedPoint,
    pub fee_to_insurance_fund: FixedPoint,
    pub bad_debt: FixedPoint,
    pub realized_pnl: SignedFixedPoint,
    pub margin_ratio: SignedFixedPoint,
}

#[derive(Debug, Clone)]
pub struct FundingResult {
    pub premium_fraction: SignedFixedPoint,
    pub funding_rate: SignedFixedPoint,
    pub cumulative_premium_fraction: SignedFixedPoint,
    // positive: the clearing house paid the fund
    pub paid_to_insurance_fund: SignedFixedPoint,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClearingHouseError {
    #[error("Amm {0:?} not found")]
    AmmNotFound(AmmId),

    #[error("input is 0")]
    ZeroInput,

    #[error("Pausable: paused")]
    Paused,

    #[error("Margin ratio not meet criteria: {ratio} < {required}")]
    MarginRatioNotMet {
        ratio: SignedFixedPoint,
        required: FixedPoint,
    },

    #[error("bad debt: {0}")]
    BadDebt(FixedPoint),

    #[error("reduce an underwater position")]
    ReduceUnderwaterPosition,

    #[error("value of openNotional <= 0")]
    NonPositiveOpenNotional,

    #[error("hit position size upper bound")]
    PositionSizeUpperBound,

    #[error("over limit: open interest {open_interest} > cap {cap}")]
    OverOpenInterestLimit {
        open_interest: FixedPoint,
        cap: FixedPoint,
    },

    #[error("margin is not enough")]
    MarginNotEnough,

    #[error("free collateral is not enough")]
    FreeCollateralNotEnough,

    #[error("positionSize is 0")]
    PositionSizeZero,

    #[error("only one action allowed")]
    OnlyOneActionAllowed,

    #[error("not backstop LP")]
    NotBackstopLiquidityProvider,

    #[error("amm is open")]
    AmmStillOpen,

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Amm error: {0}")]
    Amm(#[from] AmmError),

    #[error("Insurance fund error: {0}")]
    InsuranceFund(#[from] InsuranceFundError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
