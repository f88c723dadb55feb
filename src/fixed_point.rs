// 1.4: 18-decimal fixed point. every amount in the venue is one of these two types.
// raw values are u128/i128 scaled by 1e18; products go through U256 so nothing wraps.
// every op returns Result. overflow, underflow and zero divisors are hard failures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uint::construct_uint;

construct_uint! {
    /// 256-bit intermediate for mul/div.
    pub struct U256(4);
}

pub const DECIMALS: u32 = 18;
pub const UNIT: u128 = 1_000_000_000_000_000_000;

// largest mantissa rust_decimal can hold (2^96 - 1)
const MAX_DECIMAL_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed point overflow")]
    Overflow,

    #[error("fixed point underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("more than 18 decimal places")]
    PrecisionLoss,
}

fn pow10(exp: u32) -> Result<u128, MathError> {
    10u128.checked_pow(exp).ok_or(MathError::Overflow)
}

/// floor(a * b / d) plus whether the division left a remainder.
fn mul_div(a: u128, b: u128, d: u128) -> Result<(u128, bool), MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let numerator = U256::from(a) * U256::from(b);
    let divisor = U256::from(d);
    let quotient = numerator / divisor;
    let remainder = numerator % divisor;
    if quotient.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok((quotient.low_u128(), !remainder.is_zero()))
}

fn rescale_to_decimal(raw: u128, negative: bool) -> Decimal {
    let mut mantissa = raw;
    let mut scale = DECIMALS;
    while mantissa > MAX_DECIMAL_MANTISSA {
        mantissa /= 10;
        scale -= 1;
    }
    let signed = if negative {
        -(mantissa as i128)
    } else {
        mantissa as i128
    };
    Decimal::from_i128_with_scale(signed, scale).normalize()
}

fn raw_from_decimal(value: Decimal) -> Result<i128, MathError> {
    let mantissa = value.mantissa();
    let scale = value.scale();
    if scale <= DECIMALS {
        mantissa
            .checked_mul(pow10(DECIMALS - scale)? as i128)
            .ok_or(MathError::Overflow)
    } else {
        let divisor = pow10(scale - DECIMALS)? as i128;
        if mantissa % divisor != 0 {
            return Err(MathError::PrecisionLoss);
        }
        Ok(mantissa / divisor)
    }
}

/// Unsigned 18-decimal fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FixedPoint(u128);

impl FixedPoint {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(UNIT);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn from_int(value: u128) -> Result<Self, MathError> {
        value.checked_mul(UNIT).map(Self).ok_or(MathError::Overflow)
    }

    /// Exact for up to 18 fractional digits, truncates beyond.
    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        let raw = raw_from_decimal(value)?;
        if raw < 0 {
            return Err(MathError::Underflow);
        }
        Ok(Self(raw as u128))
    }

    pub fn to_decimal(&self) -> Decimal {
        rescale_to_decimal(self.0, false)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Result<Self, MathError> {
        self.0.checked_add(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(&self, other: Self) -> Result<Self, MathError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MathError::Underflow)
    }

    /// floor(a * b)
    pub fn checked_mul(&self, other: Self) -> Result<Self, MathError> {
        mul_div(self.0, other.0, UNIT).map(|(q, _)| Self(q))
    }

    pub fn mul_ceil(&self, other: Self) -> Result<Self, MathError> {
        let (q, rem) = mul_div(self.0, other.0, UNIT)?;
        if rem {
            return Self(q).checked_add(Self(1));
        }
        Ok(Self(q))
    }

    /// floor(a / b)
    pub fn checked_div(&self, other: Self) -> Result<Self, MathError> {
        self.div_rem(other).map(|(q, _)| q)
    }

    pub fn div_ceil(&self, other: Self) -> Result<Self, MathError> {
        let (q, rem) = self.div_rem(other)?;
        if rem {
            return q.checked_add(Self(1));
        }
        Ok(q)
    }

    /// floor(a / b) and whether the 18-decimal division was inexact.
    pub fn div_rem(&self, other: Self) -> Result<(Self, bool), MathError> {
        mul_div(self.0, UNIT, other.0).map(|(q, rem)| (Self(q), rem))
    }

    pub fn mul_scalar(&self, scalar: u128) -> Result<Self, MathError> {
        self.0.checked_mul(scalar).map(Self).ok_or(MathError::Overflow)
    }

    pub fn div_scalar(&self, scalar: u128) -> Result<Self, MathError> {
        if scalar == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Self(self.0 / scalar))
    }

    pub fn abs_diff(&self, other: Self) -> Self {
        Self(self.0.abs_diff(other.0))
    }

    pub fn to_signed(&self) -> Result<SignedFixedPoint, MathError> {
        i128::try_from(self.0)
            .map(SignedFixedPoint)
            .map_err(|_| MathError::Overflow)
    }
}

impl TryFrom<Decimal> for FixedPoint {
    type Error = MathError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

/// Signed 18-decimal fixed point. mul/div truncate toward zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignedFixedPoint(i128);

impl SignedFixedPoint {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(UNIT as i128);

    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> i128 {
        self.0
    }

    pub fn from_int(value: i128) -> Result<Self, MathError> {
        value
            .checked_mul(UNIT as i128)
            .map(Self)
            .ok_or(MathError::Overflow)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        raw_from_decimal(value).map(Self)
    }

    pub fn to_decimal(&self) -> Decimal {
        rescale_to_decimal(self.0.unsigned_abs(), self.0 < 0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn abs(&self) -> FixedPoint {
        FixedPoint(self.0.unsigned_abs())
    }

    pub fn checked_neg(&self) -> Result<Self, MathError> {
        self.0.checked_neg().map(Self).ok_or(MathError::Overflow)
    }

    /// Fails on negative values.
    pub fn to_unsigned(&self) -> Result<FixedPoint, MathError> {
        if self.0 < 0 {
            return Err(MathError::Underflow);
        }
        Ok(FixedPoint(self.0 as u128))
    }

    pub fn checked_add(&self, other: Self) -> Result<Self, MathError> {
        self.0.checked_add(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(&self, other: Self) -> Result<Self, MathError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn checked_mul(&self, other: Self) -> Result<Self, MathError> {
        let (q, _) = mul_div(self.0.unsigned_abs(), other.0.unsigned_abs(), UNIT)?;
        Self::with_sign(q, (self.0 < 0) != (other.0 < 0))
    }

    pub fn checked_div(&self, other: Self) -> Result<Self, MathError> {
        let (q, _) = mul_div(self.0.unsigned_abs(), UNIT, other.0.unsigned_abs())?;
        Self::with_sign(q, (self.0 < 0) != (other.0 < 0))
    }

    pub fn mul_unsigned(&self, other: FixedPoint) -> Result<Self, MathError> {
        self.checked_mul(other.to_signed()?)
    }

    pub fn div_unsigned(&self, other: FixedPoint) -> Result<Self, MathError> {
        self.checked_div(other.to_signed()?)
    }

    pub fn add_unsigned(&self, other: FixedPoint) -> Result<Self, MathError> {
        self.checked_add(other.to_signed()?)
    }

    pub fn sub_unsigned(&self, other: FixedPoint) -> Result<Self, MathError> {
        self.checked_sub(other.to_signed()?)
    }

    pub fn mul_scalar(&self, scalar: i128) -> Result<Self, MathError> {
        self.0.checked_mul(scalar).map(Self).ok_or(MathError::Overflow)
    }

    pub fn div_scalar(&self, scalar: i128) -> Result<Self, MathError> {
        if scalar == 0 {
            return Err(MathError::DivisionByZero);
        }
        self.0.checked_div(scalar).map(Self).ok_or(MathError::Overflow)
    }

    fn with_sign(magnitude: u128, negative: bool) -> Result<Self, MathError> {
        let value = i128::try_from(magnitude).map_err(|_| MathError::Overflow)?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl From<i64> for SignedFixedPoint {
    fn from(value: i64) -> Self {
        // |i64| * 1e18 always fits in i128
        Self(value as i128 * UNIT as i128)
    }
}

impl TryFrom<Decimal> for SignedFixedPoint {
    type Error = MathError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl TryFrom<FixedPoint> for SignedFixedPoint {
    type Error = MathError;

    fn try_from(value: FixedPoint) -> Result<Self, Self::Error> {
        value.to_signed()
    }
}

impl fmt::Display for SignedFixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fp(value: Decimal) -> FixedPoint {
        FixedPoint::from_decimal(value).unwrap()
    }

    #[test]
    fn decimal_round_trip() {
        let value = fp(dec!(1234.567890123456789012));
        assert_eq!(value.raw(), 1_234_567_890_123_456_789_012);
        assert_eq!(value.to_decimal(), dec!(1234.567890123456789012));
        assert_eq!(fp(dec!(37.5)).to_string(), "37.5");
    }

    #[test]
    fn decimal_past_18_places_is_rejected() {
        assert_eq!(
            FixedPoint::from_decimal(dec!(0.1234567890123456789)),
            Err(MathError::PrecisionLoss)
        );
        assert_eq!(
            SignedFixedPoint::from_decimal(dec!(-0.0000000000000000001)),
            Err(MathError::PrecisionLoss)
        );
        // trailing zeros past the 18th place lose nothing
        let padded = Decimal::from_i128_with_scale(15_000_000_000_000_000_000, 21);
        assert_eq!(fp(padded).raw(), 15_000_000_000_000_000);
    }

    #[test]
    fn negative_decimal_rejected_for_unsigned() {
        assert_eq!(FixedPoint::from_decimal(dec!(-1)), Err(MathError::Underflow));
        let signed = SignedFixedPoint::from_decimal(dec!(-2.5)).unwrap();
        assert!(signed.is_negative());
        assert_eq!(signed.abs(), fp(dec!(2.5)));
    }

    #[test]
    fn mul_and_div_floor() {
        let a = fp(dec!(10));
        let b = fp(dec!(3));
        assert_eq!(a.checked_div(b).unwrap().raw(), 3_333_333_333_333_333_333);
        assert_eq!(a.div_ceil(b).unwrap().raw(), 3_333_333_333_333_333_334);
        let (_, rem) = a.div_rem(b).unwrap();
        assert!(rem);
        let (q, rem) = fp(dec!(100000)).div_rem(fp(dec!(1600))).unwrap();
        assert_eq!(q, fp(dec!(62.5)));
        assert!(!rem);
        assert_eq!(fp(dec!(1000)).checked_mul(fp(dec!(100))).unwrap(), fp(dec!(100000)));
    }

    #[test]
    fn large_products_use_wide_intermediates() {
        // raw 1e27 * 1e27 does not fit u128 before the rescale
        let a = FixedPoint::from_int(1_000_000_000).unwrap();
        let product = a.checked_mul(a).unwrap();
        assert_eq!(product, FixedPoint::from_int(1_000_000_000_000_000_000).unwrap());
    }

    #[test]
    fn overflow_and_zero_division_fail() {
        let max = FixedPoint::from_raw(u128::MAX);
        assert_eq!(max.checked_add(FixedPoint::from_raw(1)), Err(MathError::Overflow));
        assert_eq!(max.checked_mul(fp(dec!(2))), Err(MathError::Overflow));
        assert_eq!(FixedPoint::ONE.checked_div(FixedPoint::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(FixedPoint::ZERO.checked_sub(FixedPoint::ONE), Err(MathError::Underflow));
        assert_eq!(
            SignedFixedPoint::from_raw(i128::MIN).checked_neg(),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn signed_truncates_toward_zero() {
        let a = SignedFixedPoint::from_int(-10).unwrap();
        let b = SignedFixedPoint::from_int(3).unwrap();
        assert_eq!(a.checked_div(b).unwrap().raw(), -3_333_333_333_333_333_333);
        assert_eq!(a.checked_mul(b).unwrap(), SignedFixedPoint::from_int(-30).unwrap());
        assert_eq!(a.to_unsigned(), Err(MathError::Underflow));
    }
}
