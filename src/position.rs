// 4.0: one position per (amm, trader). size is signed base, longs positive.
// pnl for a long = notional now - open notional, negated for a short.
// 4.1 margin after funding is at the bottom.

use crate::fixed_point::{FixedPoint, MathError, SignedFixedPoint};
use crate::types::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub size: SignedFixedPoint,
    pub margin: FixedPoint,
    pub open_notional: FixedPoint,
    pub last_updated_cumulative_premium_fraction: SignedFixedPoint,
    // last block the position was written in. drives restriction mode
    pub block_number: u64,
}

impl Position {
    /// Flat position stamped with the block it was cleared in.
    pub fn cleared(block_number: u64) -> Self {
        Self {
            block_number,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        if self.size.is_positive() {
            Some(Side::Long)
        } else if self.size.is_negative() {
            Some(Side::Short)
        } else {
            None
        }
    }

    /// open notional / |size|
    pub fn entry_price(&self) -> Result<Option<FixedPoint>, MathError> {
        if self.is_empty() {
            return Ok(None);
        }
        self.open_notional.checked_div(self.size.abs()).map(Some)
    }

    /// Funding owed since the last touch. Positive means the position pays.
    pub fn funding_payment(&self, latest_cumulative_premium_fraction: SignedFixedPoint) -> Result<SignedFixedPoint, MathError> {
        if self.is_empty() {
            return Ok(SignedFixedPoint::ZERO);
        }
        latest_cumulative_premium_fraction
            .checked_sub(self.last_updated_cumulative_premium_fraction)?
            .checked_mul(self.size)
    }
}

// 4.1: pnl against a notional read at some price
pub fn unrealized_pnl(
    size: SignedFixedPoint,
    open_notional: FixedPoint,
    position_notional: FixedPoint,
) -> Result<SignedFixedPoint, MathError> {
    let notional = position_notional.to_signed()?;
    let open = open_notional.to_signed()?;
    if size.is_negative() {
        open.checked_sub(notional)
    } else {
        notional.checked_sub(open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainMargin {
    pub remain_margin: FixedPoint,
    // the part of the loss the margin could not absorb
    pub bad_debt: FixedPoint,
    pub funding_payment: SignedFixedPoint,
    pub latest_cumulative_premium_fraction: SignedFixedPoint,
}

impl RemainMargin {
    /// remain margin - bad debt
    pub fn signed(&self) -> Result<SignedFixedPoint, MathError> {
        self.remain_margin.to_signed()?.checked_sub(self.bad_debt.to_signed()?)
    }
}

// 4.2: margin + delta - funding. a negative result is bad debt, never negative margin
pub fn calc_remain_margin_with_funding_payment(
    position: &Position,
    margin_delta: SignedFixedPoint,
    latest_cumulative_premium_fraction: SignedFixedPoint,
) -> Result<RemainMargin, MathError> {
    let funding_payment = position.funding_payment(latest_cumulative_premium_fraction)?;
    let signed_remain = margin_delta
        .checked_sub(funding_payment)?
        .add_unsigned(position.margin)?;

    let (remain_margin, bad_debt) = if signed_remain.is_negative() {
        (FixedPoint::ZERO, signed_remain.abs())
    } else {
        (signed_remain.to_unsigned()?, FixedPoint::ZERO)
    };
    Ok(RemainMargin {
        remain_margin,
        bad_debt,
        funding_payment,
        latest_cumulative_premium_fraction,
    })
}
