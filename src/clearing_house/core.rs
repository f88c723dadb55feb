// 5.0 clearing_house/core.rs: clearing house state. holds the amm arena,
// positions, escrowed margin and the insurance fund.

use super::results::ClearingHouseError;
use crate::access::{AccessControl, Role};
use crate::amm::{Amm, AmmError};
use crate::config::{AmmConfig, ClearingHouseConfig, InsuranceFundConfig};
use crate::events::{
    BadDebtEvent, EventEmitter, EventLog, EventPayload, ReserveSnapshottedEvent, RestrictionModeEnteredEvent,
    ShutdownEvent, SwapEvent,
};
use crate::exchange::{Exchange, FixedRateExchange};
use crate::fixed_point::{FixedPoint, SignedFixedPoint};
use crate::insurance_fund::InsuranceFund;
use crate::ledger::{self, Ledger, TokenLedger};
use crate::position::Position;
use crate::price_feed::{MockPriceFeed, PriceFeed};
use crate::types::{Address, AmmId, AssetId, BlockInfo, Dir, Timestamp};
use std::collections::HashMap;

/// Margin settings converted to fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginParams {
    pub init_margin_ratio: FixedPoint,
    pub maintenance_margin_ratio: FixedPoint,
    pub liquidation_fee_ratio: FixedPoint,
    pub partial_liquidation_ratio: FixedPoint,
}

impl MarginParams {
    fn from_config(config: &ClearingHouseConfig) -> Result<Self, ClearingHouseError> {
        config.validate()?;
        Ok(Self {
            init_margin_ratio: FixedPoint::from_decimal(config.init_margin_ratio)?,
            maintenance_margin_ratio: FixedPoint::from_decimal(config.maintenance_margin_ratio)?,
            liquidation_fee_ratio: FixedPoint::from_decimal(config.liquidation_fee_ratio)?,
            partial_liquidation_ratio: FixedPoint::from_decimal(config.partial_liquidation_ratio)?,
        })
    }
}

/// What the clearing house tracks per amm, next to the amm itself.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub open_interest_notional: FixedPoint,
    pub cumulative_premium_fractions: Vec<SignedFixedPoint>,
    // block of the last liquidation; nothing else may touch the amm in it
    pub last_restriction_block: Option<u64>,
}

impl MarketState {
    pub fn latest_cumulative_premium_fraction(&self) -> SignedFixedPoint {
        self.cumulative_premium_fractions
            .last()
            .copied()
            .unwrap_or(SignedFixedPoint::ZERO)
    }
}

// everything a failed transaction rolls back
#[derive(Debug, Clone)]
pub(super) struct VenueState<L, E: Exchange> {
    pub(super) amms: Vec<Amm>,
    pub(super) markets: Vec<MarketState>,
    pub(super) positions: HashMap<(AmmId, Address), Position>,
    // shortfall drawn from the fund ahead of a bad debt being realized
    pub(super) prepaid_bad_debt: HashMap<AssetId, FixedPoint>,
    pub(super) ledger: L,
    pub(super) insurance_fund: InsuranceFund<E>,
    pub(super) access: AccessControl,
    pub(super) paused: bool,
}

/** 5.1: the margin engine. amms are addressed by index into the arena */
#[derive(Debug)]
pub struct ClearingHouse<F, L, E: Exchange> {
    pub(super) address: Address,
    pub(super) fee_pool: Address,
    pub(super) params: MarginParams,
    pub(super) feed: F,
    pub(super) state: VenueState<L, E>,
    pub(super) events: EventLog,
    pub(super) block: BlockInfo,
}

/// In-memory venue used by the simulator and the tests.
pub type SimClearingHouse = ClearingHouse<MockPriceFeed, Ledger, FixedRateExchange>;

impl<F, L, E> ClearingHouse<F, L, E>
where
    F: PriceFeed,
    L: TokenLedger + Clone,
    E: Exchange + Clone,
{
    pub fn new(
        config: &ClearingHouseConfig,
        fund_config: &InsuranceFundConfig,
        owner: Address,
        feed: F,
        ledger: L,
        exchange: E,
        block: BlockInfo,
    ) -> Result<Self, ClearingHouseError> {
        let params = MarginParams::from_config(config)?;
        let mut insurance_fund = InsuranceFund::new(fund_config, owner, exchange)?;
        insurance_fund.set_beneficiary(owner, config.address)?;

        tracing::info!(
            address = %config.address,
            init_margin_ratio = %params.init_margin_ratio,
            maintenance_margin_ratio = %params.maintenance_margin_ratio,
            "clearing house created"
        );
        Ok(Self {
            address: config.address,
            fee_pool: config.fee_pool,
            params,
            feed,
            state: VenueState {
                amms: Vec::new(),
                markets: Vec::new(),
                positions: HashMap::new(),
                prepaid_bad_debt: HashMap::new(),
                ledger,
                insurance_fund,
                access: AccessControl::with_owner(owner),
                paused: false,
            },
            events: EventLog::new(config.max_events),
            block,
        })
    }

    // 5.1.1: accessors

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn fee_pool(&self) -> Address {
        self.fee_pool
    }

    pub fn params(&self) -> MarginParams {
        self.params
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    pub fn ledger(&self) -> &L {
        &self.state.ledger
    }

    /// Wallet funding outside any transaction.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.state.ledger
    }

    pub fn insurance_fund(&self) -> &InsuranceFund<E> {
        &self.state.insurance_fund
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn access(&self) -> &AccessControl {
        &self.state.access
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn amm_count(&self) -> usize {
        self.state.amms.len()
    }

    pub fn amm(&self, amm: AmmId) -> Result<&Amm, ClearingHouseError> {
        self.state
            .amms
            .get(amm.0 as usize)
            .ok_or(ClearingHouseError::AmmNotFound(amm))
    }

    pub fn market(&self, amm: AmmId) -> Result<&MarketState, ClearingHouseError> {
        self.state
            .markets
            .get(amm.0 as usize)
            .ok_or(ClearingHouseError::AmmNotFound(amm))
    }

    pub fn is_whitelisted(&self, who: Address) -> bool {
        self.state.access.has_role(Role::Whitelisted, who)
    }

    /// Quote held by the clearing house for `asset`.
    pub fn vault_balance(&self, asset: AssetId) -> Result<FixedPoint, ClearingHouseError> {
        Ok(ledger::balance(&self.state.ledger, asset, self.address)?)
    }

    // 5.1.2: block clock. every call in a block shares its number and timestamp

    pub fn advance_block(&mut self, seconds: u64) -> BlockInfo {
        self.block = self.block.next(seconds);
        self.block
    }

    pub fn set_block(&mut self, number: u64, timestamp: Timestamp) {
        self.block = BlockInfo::new(number, timestamp);
    }

    // 5.1.3: admin

    /// Creates an amm owned by `caller`, wires this clearing house in as its
    /// counter party and the fund as its global shutdown, and registers it with
    /// the fund.
    pub fn add_amm(&mut self, caller: Address, config: &AmmConfig) -> Result<AmmId, ClearingHouseError> {
        self.atomic(|ch| {
            ch.state.access.require(Role::Owner, caller)?;
            let id = AmmId(ch.state.amms.len() as u32);
            let fund_address = ch.state.insurance_fund.address();
            let mut amm = Amm::new(config, caller, ch.block)?;
            amm.set_counter_party(caller, ch.address)?;
            amm.set_global_shutdown(caller, fund_address)?;
            ch.state.insurance_fund.add_amm(caller, id, config.quote_asset, &mut ch.events, ch.block)?;
            ch.state.amms.push(amm);
            ch.state.markets.push(MarketState::default());
            tracing::info!(amm = ?id, symbol = %config.symbol, "amm registered");
            Ok(id)
        })
    }

    /// Unregisters an amm from the insurance fund. Positions stay where they are.
    pub fn remove_amm(&mut self, caller: Address, amm: AmmId) -> Result<(), ClearingHouseError> {
        self.atomic(|ch| {
            ch.amm(amm)?;
            ch.state
                .insurance_fund
                .remove_amm(caller, amm, &mut ch.state.ledger, &mut ch.events, ch.block)?;
            Ok(())
        })
    }

    /// Runs an owner action on one amm inside a transaction. The amm checks the
    /// caller's role itself.
    pub fn amm_admin<T>(
        &mut self,
        amm: AmmId,
        op: impl FnOnce(&mut Amm, BlockInfo) -> Result<T, AmmError>,
    ) -> Result<T, ClearingHouseError> {
        self.atomic(|ch| {
            let block = ch.block;
            let target = ch.amm_mut(amm)?;
            let was_shut = target.settlement_price().is_some();
            let out = op(target, block)?;
            if let (false, Some(settlement_price)) = (was_shut, target.settlement_price()) {
                ch.emit(EventPayload::Shutdown(ShutdownEvent { amm, settlement_price }));
            }
            Ok(out)
        })
    }

    pub fn pause(&mut self, caller: Address) -> Result<(), ClearingHouseError> {
        self.state.access.require(Role::Owner, caller)?;
        self.state.paused = true;
        tracing::warn!("clearing house paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), ClearingHouseError> {
        self.state.access.require(Role::Owner, caller)?;
        self.state.paused = false;
        tracing::info!("clearing house unpaused");
        Ok(())
    }

    pub fn set_whitelisted(&mut self, caller: Address, who: Address, enabled: bool) -> Result<(), ClearingHouseError> {
        self.set_role(caller, Role::Whitelisted, who, enabled)
    }

    pub fn set_backstop_liquidity_provider(
        &mut self,
        caller: Address,
        who: Address,
        enabled: bool,
    ) -> Result<(), ClearingHouseError> {
        self.set_role(caller, Role::BackstopLiquidityProvider, who, enabled)
    }

    fn set_role(&mut self, caller: Address, role: Role, who: Address, enabled: bool) -> Result<(), ClearingHouseError> {
        self.state.access.require(Role::Owner, caller)?;
        if enabled {
            self.state.access.grant(role, who);
        } else {
            self.state.access.revoke(role, who);
        }
        Ok(())
    }

    // 5.1.4: transactions. state is restored and pending events dropped on error

    pub(super) fn atomic<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, ClearingHouseError>,
    ) -> Result<T, ClearingHouseError> {
        let checkpoint = self.state.clone();
        match op(self) {
            Ok(out) => {
                self.events.commit();
                Ok(out)
            }
            Err(err) => {
                self.state = checkpoint;
                self.events.rollback();
                tracing::debug!(error = %err, block = self.block.number, "transaction reverted");
                Err(err)
            }
        }
    }

    pub(super) fn emit(&mut self, payload: EventPayload) {
        self.events.emit(self.block, payload);
    }

    pub(super) fn amm_mut(&mut self, amm: AmmId) -> Result<&mut Amm, ClearingHouseError> {
        self.state
            .amms
            .get_mut(amm.0 as usize)
            .ok_or(ClearingHouseError::AmmNotFound(amm))
    }

    pub(super) fn market_mut(&mut self, amm: AmmId) -> Result<&mut MarketState, ClearingHouseError> {
        self.state
            .markets
            .get_mut(amm.0 as usize)
            .ok_or(ClearingHouseError::AmmNotFound(amm))
    }

    pub(super) fn latest_cumulative_premium_fraction(&self, amm: AmmId) -> Result<SignedFixedPoint, ClearingHouseError> {
        Ok(self.market(amm)?.latest_cumulative_premium_fraction())
    }

    // 5.1.5: guards

    pub(super) fn require_not_paused(&self) -> Result<(), ClearingHouseError> {
        if self.state.paused {
            return Err(ClearingHouseError::Paused);
        }
        Ok(())
    }

    pub(super) fn require_amm_open(&self, amm: AmmId) -> Result<(), ClearingHouseError> {
        if !self.amm(amm)?.is_open() {
            return Err(AmmError::Closed.into());
        }
        Ok(())
    }

    /// After a liquidation the amm takes no further action in that block,
    /// whoever the caller is.
    pub(super) fn require_not_restricted(&self, amm: AmmId) -> Result<(), ClearingHouseError> {
        if self.market(amm)?.last_restriction_block == Some(self.block.number) {
            return Err(ClearingHouseError::OnlyOneActionAllowed);
        }
        Ok(())
    }

    pub(super) fn enter_restriction_mode(&mut self, amm: AmmId) -> Result<(), ClearingHouseError> {
        let block_number = self.block.number;
        self.market_mut(amm)?.last_restriction_block = Some(block_number);
        self.emit(EventPayload::RestrictionModeEntered(RestrictionModeEnteredEvent {
            amm,
            block_number,
        }));
        tracing::info!(?amm, block = block_number, "restriction mode entered");
        Ok(())
    }

    // 5.1.6: position storage

    /// Stored position, without pending funding.
    pub(super) fn position_of(&self, amm: AmmId, trader: Address) -> Position {
        self.state
            .positions
            .get(&(amm, trader))
            .copied()
            .unwrap_or_default()
    }

    pub(super) fn set_position(&mut self, amm: AmmId, trader: Address, mut position: Position) {
        position.block_number = self.block.number;
        self.state.positions.insert((amm, trader), position);
    }

    pub(super) fn clear_position(&mut self, amm: AmmId, trader: Address) {
        self.state
            .positions
            .insert((amm, trader), Position::cleared(self.block.number));
    }

    // 5.1.7: amm calls as counter party. sizes come back signed, longs positive

    pub(super) fn swap_input(
        &mut self,
        amm: AmmId,
        dir_of_quote: Dir,
        quote_amount: FixedPoint,
        base_limit: FixedPoint,
        can_over_fluctuation_limit: bool,
    ) -> Result<SignedFixedPoint, ClearingHouseError> {
        let (caller, block) = (self.address, self.block);
        let target = self.amm_mut(amm)?;
        let base_amount = target.swap_input(
            caller,
            dir_of_quote,
            quote_amount,
            base_limit,
            can_over_fluctuation_limit,
            block,
        )?;
        let (quote_asset_reserve, base_asset_reserve) = target.reserves();
        self.emit(EventPayload::SwapInput(SwapEvent {
            amm,
            dir: dir_of_quote,
            quote_amount,
            base_amount,
        }));
        self.emit(EventPayload::ReserveSnapshotted(ReserveSnapshottedEvent {
            amm,
            quote_asset_reserve,
            base_asset_reserve,
        }));
        let size = base_amount.to_signed()?;
        match dir_of_quote {
            Dir::AddToAmm => Ok(size),
            Dir::RemoveFromAmm => Ok(size.checked_neg()?),
        }
    }

    pub(super) fn swap_output(
        &mut self,
        amm: AmmId,
        dir_of_base: Dir,
        base_amount: FixedPoint,
        quote_limit: FixedPoint,
    ) -> Result<FixedPoint, ClearingHouseError> {
        let (caller, block) = (self.address, self.block);
        let target = self.amm_mut(amm)?;
        let quote_amount = target.swap_output(caller, dir_of_base, base_amount, quote_limit, block)?;
        let (quote_asset_reserve, base_asset_reserve) = target.reserves();
        self.emit(EventPayload::SwapOutput(SwapEvent {
            amm,
            dir: dir_of_base,
            quote_amount,
            base_amount,
        }));
        self.emit(EventPayload::ReserveSnapshotted(ReserveSnapshottedEvent {
            amm,
            quote_asset_reserve,
            base_asset_reserve,
        }));
        Ok(quote_amount)
    }

    // 5.1.8: money movement

    pub(super) fn pull_from(&mut self, asset: AssetId, from: Address, amount: FixedPoint) -> Result<(), ClearingHouseError> {
        ledger::checked_transfer(&mut self.state.ledger, asset, from, self.address, amount)?;
        Ok(())
    }

    /// Pays out of the vault. A shortfall is drawn from the insurance fund and
    /// booked as prepaid bad debt.
    pub(super) fn withdraw(&mut self, asset: AssetId, receiver: Address, amount: FixedPoint) -> Result<(), ClearingHouseError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.vault_balance(asset)?;
        if balance < amount {
            let shortage = amount.checked_sub(balance)?;
            let prepaid = self.state.prepaid_bad_debt.entry(asset).or_insert(FixedPoint::ZERO);
            *prepaid = prepaid.checked_add(shortage)?;
            self.state.insurance_fund.withdraw(
                self.address,
                asset,
                shortage,
                &mut self.state.ledger,
                &mut self.events,
                self.block,
            )?;
            tracing::warn!(?asset, %shortage, "vault short, drew on insurance fund");
        }
        ledger::checked_transfer(&mut self.state.ledger, asset, self.address, receiver, amount)?;
        Ok(())
    }

    /// Covers `bad_debt` from prepaid shortfall first, the insurance fund after.
    pub(super) fn realize_bad_debt(&mut self, amm: AmmId, asset: AssetId, bad_debt: FixedPoint) -> Result<(), ClearingHouseError> {
        if bad_debt.is_zero() {
            return Ok(());
        }
        let prepaid = self
            .state
            .prepaid_bad_debt
            .get(&asset)
            .copied()
            .unwrap_or(FixedPoint::ZERO);
        if prepaid > bad_debt {
            self.state.prepaid_bad_debt.insert(asset, prepaid.checked_sub(bad_debt)?);
        } else {
            self.state.prepaid_bad_debt.insert(asset, FixedPoint::ZERO);
            self.state.insurance_fund.withdraw(
                self.address,
                asset,
                bad_debt.checked_sub(prepaid)?,
                &mut self.state.ledger,
                &mut self.events,
                self.block,
            )?;
        }
        self.emit(EventPayload::BadDebtRealized(BadDebtEvent {
            amm,
            asset,
            amount: bad_debt,
        }));
        tracing::warn!(?amm, ?asset, %bad_debt, "bad debt realized");
        Ok(())
    }

    pub(super) fn transfer_to_insurance_fund(&mut self, asset: AssetId, amount: FixedPoint) -> Result<(), ClearingHouseError> {
        let fund = self.state.insurance_fund.address();
        ledger::checked_transfer(&mut self.state.ledger, asset, self.address, fund, amount)?;
        Ok(())
    }

    /// Spread to the insurance fund, toll to the fee pool, both from the trader's
    /// wallet. Returns the total.
    pub(super) fn transfer_fee(&mut self, trader: Address, amm: AmmId, notional: FixedPoint) -> Result<FixedPoint, ClearingHouseError> {
        let target = self.amm(amm)?;
        let asset = target.quote_asset();
        let (toll, spread) = target.calc_fee(notional)?;
        let fund = self.state.insurance_fund.address();
        ledger::checked_transfer(&mut self.state.ledger, asset, trader, fund, spread)?;
        ledger::checked_transfer(&mut self.state.ledger, asset, trader, self.fee_pool, toll)?;
        Ok(toll.checked_add(spread)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_amm_wires_roles_and_fund() {
        let venue = venue();
        let amm = venue.amm(ETH).unwrap();
        assert!(amm.is_counter_party(venue.address()));
        assert!(amm.access().has_role(Role::GlobalShutdown, FUND));
        assert_eq!(venue.insurance_fund().all_amms(), vec![ETH]);
        assert_eq!(venue.insurance_fund().quote_assets(), &[USDC]);
        assert!(venue
            .events()
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::AmmAdded(_))));
    }

    #[test]
    fn only_owner_adds_amms() {
        let mut venue = venue();
        let err = venue.add_amm(ALICE, &amm_config()).unwrap_err();
        assert!(matches!(err, ClearingHouseError::Access(_)));
        assert_eq!(venue.amm_count(), 1);
    }

    #[test]
    fn failed_transaction_rolls_back_state_and_events() {
        let mut venue = venue();
        let before = venue.events().events().len();
        let reserves = venue.amm(ETH).unwrap().reserves();
        // a swap, then a transfer the trader cannot fund
        let result: Result<(), ClearingHouseError> = venue.atomic(|ch| {
            ch.swap_input(ETH, Dir::AddToAmm, fp(dec!(600)), FixedPoint::ZERO, false)?;
            ch.pull_from(USDC, ALICE, fp(dec!(1_000_000_000)))?;
            Ok(())
        });
        assert!(matches!(result, Err(ClearingHouseError::Ledger(_))));
        assert_eq!(venue.amm(ETH).unwrap().reserves(), reserves);
        assert_eq!(venue.events().events().len(), before);
        assert!(venue.events().pending().is_empty());
    }

    #[test]
    fn pause_is_owner_only() {
        let mut venue = venue();
        assert!(venue.pause(ALICE).is_err());
        venue.pause(OWNER).unwrap();
        assert!(venue.is_paused());
        venue.unpause(OWNER).unwrap();
        assert!(!venue.is_paused());
    }

    #[test]
    fn amm_admin_emits_shutdown_once() {
        let mut venue = venue();
        let price = venue.amm_admin(ETH, |amm, _| amm.shutdown(OWNER)).unwrap();
        assert_eq!(price, fp(dec!(10)));
        venue.amm_admin(ETH, |amm, _| amm.shutdown(OWNER)).unwrap();
        let shutdowns = venue
            .events()
            .events()
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Shutdown(_)))
            .count();
        assert_eq!(shutdowns, 1);
        assert!(matches!(
            venue.amm_admin(ETH, |amm, _| amm.shutdown(ALICE)),
            Err(ClearingHouseError::Amm(AmmError::Access(_)))
        ));
    }

    #[test]
    fn vault_shortfall_draws_on_fund() {
        let mut venue = venue();
        venue
            .atomic(|ch| ch.withdraw(USDC, ALICE, fp(dec!(100))))
            .unwrap();
        assert_eq!(venue.state.prepaid_bad_debt.get(&USDC), Some(&fp(dec!(100))));
        // prepaid shortfall covers a later bad debt first
        venue.atomic(|ch| ch.realize_bad_debt(ETH, USDC, fp(dec!(60)))).unwrap();
        assert_eq!(venue.state.prepaid_bad_debt.get(&USDC), Some(&fp(dec!(40))));
        assert_eq!(
            venue.insurance_fund().balance_of(venue.ledger(), USDC).unwrap(),
            fp(dec!(4_900))
        );
    }
}
