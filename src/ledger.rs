// 9.2 ledger.rs: fungible asset balances. the consumed token interface plus an
// in-memory ledger. amounts on the trait are native units; the venue works in
// 18-decimal fixed point and converts at this boundary.

use crate::fixed_point::{FixedPoint, MathError, DECIMALS};
use crate::types::{Address, AssetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown asset {0:?}")]
    UnknownAsset(AssetId),

    #[error("insufficient balance of {asset:?} for {owner}: have {balance}, need {requested}")]
    InsufficientBalance {
        asset: AssetId,
        owner: Address,
        balance: u128,
        requested: u128,
    },

    #[error("balance inconsistent after transfer of {asset:?}: expected {expected}, received {received}")]
    BalanceInconsistent {
        asset: AssetId,
        expected: u128,
        received: u128,
    },

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Consumed interface of the asset ledger. Amounts are in the asset's native units.
pub trait TokenLedger: fmt::Debug {
    fn decimals(&self, asset: AssetId) -> Result<u8, LedgerError>;

    fn balance_of(&self, asset: AssetId, owner: Address) -> u128;

    fn total_supply(&self, asset: AssetId) -> u128;

    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> Result<(), LedgerError>;

    fn mint(&mut self, asset: AssetId, to: Address, amount: u128) -> Result<(), LedgerError>;

    fn burn(&mut self, asset: AssetId, from: Address, amount: u128) -> Result<(), LedgerError>;
}

// 9.2.1: decimals normalization

/// Native units for an 18-decimal amount. Rounds down.
pub fn to_native(amount: FixedPoint, decimals: u8) -> Result<u128, MathError> {
    let decimals = u32::from(decimals);
    if decimals <= DECIMALS {
        let factor = 10u128.checked_pow(DECIMALS - decimals).ok_or(MathError::Overflow)?;
        Ok(amount.raw() / factor)
    } else {
        let factor = 10u128.checked_pow(decimals - DECIMALS).ok_or(MathError::Overflow)?;
        amount.raw().checked_mul(factor).ok_or(MathError::Overflow)
    }
}

pub fn from_native(amount: u128, decimals: u8) -> Result<FixedPoint, MathError> {
    let decimals = u32::from(decimals);
    if decimals <= DECIMALS {
        let factor = 10u128.checked_pow(DECIMALS - decimals).ok_or(MathError::Overflow)?;
        amount
            .checked_mul(factor)
            .map(FixedPoint::from_raw)
            .ok_or(MathError::Overflow)
    } else {
        let factor = 10u128.checked_pow(decimals - DECIMALS).ok_or(MathError::Overflow)?;
        Ok(FixedPoint::from_raw(amount / factor))
    }
}

pub fn balance(ledger: &dyn TokenLedger, asset: AssetId, owner: Address) -> Result<FixedPoint, LedgerError> {
    let decimals = ledger.decimals(asset)?;
    Ok(from_native(ledger.balance_of(asset, owner), decimals)?)
}

pub fn supply(ledger: &dyn TokenLedger, asset: AssetId) -> Result<FixedPoint, LedgerError> {
    let decimals = ledger.decimals(asset)?;
    Ok(from_native(ledger.total_supply(asset), decimals)?)
}

/// Moves an 18-decimal amount and checks the recipient was credited in full.
/// Fee-on-transfer assets fail here.
pub fn checked_transfer(
    ledger: &mut dyn TokenLedger,
    asset: AssetId,
    from: Address,
    to: Address,
    amount: FixedPoint,
) -> Result<(), LedgerError> {
    let native = to_native(amount, ledger.decimals(asset)?)?;
    if native == 0 || from == to {
        return Ok(());
    }
    let before = ledger.balance_of(asset, to);
    ledger.transfer(asset, from, to, native)?;
    let received = ledger.balance_of(asset, to).saturating_sub(before);
    if received != native {
        return Err(LedgerError::BalanceInconsistent {
            asset,
            expected: native,
            received,
        });
    }
    Ok(())
}

pub fn checked_mint(
    ledger: &mut dyn TokenLedger,
    asset: AssetId,
    to: Address,
    amount: FixedPoint,
) -> Result<(), LedgerError> {
    let native = to_native(amount, ledger.decimals(asset)?)?;
    ledger.mint(asset, to, native)
}

pub fn checked_burn(
    ledger: &mut dyn TokenLedger,
    asset: AssetId,
    from: Address,
    amount: FixedPoint,
) -> Result<(), LedgerError> {
    let native = to_native(amount, ledger.decimals(asset)?)?;
    ledger.burn(asset, from, native)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub symbol: String,
    pub decimals: u8,
    /// skimmed from every transfer and burned. nonzero only for misbehaving assets
    pub transfer_fee_bps: u16,
    pub total_supply: u128,
}

/// In-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    assets: BTreeMap<AssetId, AssetInfo>,
    balances: HashMap<(AssetId, Address), u128>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_asset(&mut self, asset: AssetId, symbol: &str, decimals: u8) {
        self.register_asset_with_fee(asset, symbol, decimals, 0);
    }

    pub fn register_asset_with_fee(&mut self, asset: AssetId, symbol: &str, decimals: u8, transfer_fee_bps: u16) {
        self.assets.insert(
            asset,
            AssetInfo {
                symbol: symbol.to_string(),
                decimals,
                transfer_fee_bps,
                total_supply: 0,
            },
        );
    }

    pub fn asset(&self, asset: AssetId) -> Option<&AssetInfo> {
        self.assets.get(&asset)
    }

    fn info_mut(&mut self, asset: AssetId) -> Result<&mut AssetInfo, LedgerError> {
        self.assets.get_mut(&asset).ok_or(LedgerError::UnknownAsset(asset))
    }

    fn debit(&mut self, asset: AssetId, owner: Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.balances.entry((asset, owner)).or_insert(0);
        if *balance < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                owner,
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, asset: AssetId, owner: Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.balances.entry((asset, owner)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(MathError::Overflow)?;
        Ok(())
    }
}

impl TokenLedger for Ledger {
    fn decimals(&self, asset: AssetId) -> Result<u8, LedgerError> {
        self.assets
            .get(&asset)
            .map(|info| info.decimals)
            .ok_or(LedgerError::UnknownAsset(asset))
    }

    fn balance_of(&self, asset: AssetId, owner: Address) -> u128 {
        self.balances.get(&(asset, owner)).copied().unwrap_or(0)
    }

    fn total_supply(&self, asset: AssetId) -> u128 {
        self.assets.get(&asset).map(|info| info.total_supply).unwrap_or(0)
    }

    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        let fee_bps = self.info_mut(asset)?.transfer_fee_bps;
        let fee = amount.checked_mul(u128::from(fee_bps)).ok_or(MathError::Overflow)? / 10_000;
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount - fee)?;
        let info = self.info_mut(asset)?;
        info.total_supply = info.total_supply.saturating_sub(fee);
        Ok(())
    }

    fn mint(&mut self, asset: AssetId, to: Address, amount: u128) -> Result<(), LedgerError> {
        let info = self.info_mut(asset)?;
        info.total_supply = info.total_supply.checked_add(amount).ok_or(MathError::Overflow)?;
        self.credit(asset, to, amount)
    }

    fn burn(&mut self, asset: AssetId, from: Address, amount: u128) -> Result<(), LedgerError> {
        self.info_mut(asset)?;
        self.debit(asset, from, amount)?;
        let info = self.info_mut(asset)?;
        info.total_supply = info.total_supply.saturating_sub(amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const USDC: AssetId = AssetId(1);
    const FEE_TOKEN: AssetId = AssetId(2);

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.register_asset(USDC, "USDC", 6);
        ledger.register_asset_with_fee(FEE_TOKEN, "FOT", 18, 100);
        ledger
    }

    #[test]
    fn native_decimals_normalized() {
        let amount = FixedPoint::from_decimal(dec!(12.3456789)).unwrap();
        assert_eq!(to_native(amount, 6).unwrap(), 12_345_678);
        assert_eq!(
            from_native(12_345_678, 6).unwrap(),
            FixedPoint::from_decimal(dec!(12.345678)).unwrap()
        );
        assert_eq!(to_native(FixedPoint::ONE, 20).unwrap(), 100 * 10u128.pow(18));
    }

    #[test]
    fn transfer_moves_balance() {
        let mut ledger = ledger();
        let alice = Address(1);
        let bob = Address(2);
        checked_mint(&mut ledger, USDC, alice, FixedPoint::from_int(100).unwrap()).unwrap();
        checked_transfer(&mut ledger, USDC, alice, bob, FixedPoint::from_int(40).unwrap()).unwrap();

        assert_eq!(balance(&ledger, USDC, alice).unwrap(), FixedPoint::from_int(60).unwrap());
        assert_eq!(balance(&ledger, USDC, bob).unwrap(), FixedPoint::from_int(40).unwrap());
        assert_eq!(supply(&ledger, USDC).unwrap(), FixedPoint::from_int(100).unwrap());
    }

    #[test]
    fn insufficient_balance_rejected() {
        let mut ledger = ledger();
        let err = checked_transfer(&mut ledger, USDC, Address(1), Address(2), FixedPoint::ONE).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn fee_on_transfer_is_hard_failure() {
        let mut ledger = ledger();
        checked_mint(&mut ledger, FEE_TOKEN, Address(1), FixedPoint::from_int(100).unwrap()).unwrap();
        let err = checked_transfer(&mut ledger, FEE_TOKEN, Address(1), Address(2), FixedPoint::from_int(10).unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceInconsistent { .. }));
    }

    #[test]
    fn huge_fee_on_transfer_overflows_cleanly() {
        let mut ledger = ledger();
        let whale = Address(1);
        let amount = u128::MAX / 50;
        ledger.mint(FEE_TOKEN, whale, amount).unwrap();

        let err = ledger.transfer(FEE_TOKEN, whale, Address(2), amount).unwrap_err();
        assert!(matches!(err, LedgerError::Math(MathError::Overflow)));
        assert_eq!(ledger.balance_of(FEE_TOKEN, whale), amount);
        assert_eq!(ledger.total_supply(FEE_TOKEN), amount);
    }
}
