// 6.0 insurance_fund.rs: multi-asset backstop for bad debt.
// balances live in the ledger under the fund's address. a shortfall in the
// requested asset is covered from the other registered assets, richest first,
// then by minting the protocol token. minting feeds the circuit breaker.

use crate::access::{AccessControl, AccessError, Role};
use crate::amm::{Amm, AmmError};
use crate::config::{ConfigError, InsuranceFundConfig};
use crate::events::{
    AmmRegistrationEvent, EventEmitter, EventPayload, ShutdownEvent, TokenMintedEvent, TokenSwappedEvent,
    WithdrawnEvent,
};
use crate::exchange::{Exchange, ExchangeError};
use crate::fixed_point::{FixedPoint, MathError};
use crate::inflation_monitor::InflationMonitor;
use crate::ledger::{self, LedgerError, TokenLedger};
use crate::types::{Address, AmmId, AssetId, BlockInfo, Timestamp};

#[derive(Debug, Clone, thiserror::Error)]
pub enum InsuranceFundError {
    #[error("asset {0:?} is not supported")]
    AssetNotSupported(AssetId),

    #[error("amm {0:?} already added")]
    AmmAlreadyAdded(AmmId),

    #[error("amm {0:?} not found")]
    AmmNotFound(AmmId),

    #[error("Fund not enough: requested {requested} of {asset:?}, available {available}")]
    FundNotEnough {
        asset: AssetId,
        requested: FixedPoint,
        available: FixedPoint,
    },

    #[error("loss is not large enough")]
    LossNotLargeEnough,

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Amm error: {0}")]
    Amm(#[from] AmmError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/** 6.1: registry of amms and their settlement assets, plus the mint monitor */
#[derive(Debug, Clone)]
pub struct InsuranceFund<E: Exchange> {
    address: Address,
    protocol_token: AssetId,
    // registration order breaks waterfall ties
    amms: Vec<(AmmId, AssetId)>,
    quote_assets: Vec<AssetId>,
    exchange: E,
    monitor: InflationMonitor,
    access: AccessControl,
}

impl<E: Exchange> InsuranceFund<E> {
    pub fn new(config: &InsuranceFundConfig, owner: Address, exchange: E) -> Result<Self, InsuranceFundError> {
        config.validate()?;
        let threshold = FixedPoint::from_decimal(config.mint_threshold_ratio)?;
        Ok(Self {
            address: config.address,
            protocol_token: config.protocol_token,
            amms: Vec::new(),
            quote_assets: Vec::new(),
            exchange,
            monitor: InflationMonitor::new(config.mint_window_secs, threshold),
            access: AccessControl::with_owner(owner),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn protocol_token(&self) -> AssetId {
        self.protocol_token
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn monitor(&self) -> &InflationMonitor {
        &self.monitor
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn all_amms(&self) -> Vec<AmmId> {
        self.amms.iter().map(|(amm, _)| *amm).collect()
    }

    pub fn quote_assets(&self) -> &[AssetId] {
        &self.quote_assets
    }

    pub fn is_quote_asset(&self, asset: AssetId) -> bool {
        self.quote_assets.contains(&asset)
    }

    pub fn balance_of(&self, ledger: &dyn TokenLedger, asset: AssetId) -> Result<FixedPoint, InsuranceFundError> {
        Ok(ledger::balance(ledger, asset, self.address)?)
    }

    /// Owner only. The beneficiary is the only caller that may withdraw.
    pub fn set_beneficiary(&mut self, caller: Address, beneficiary: Address) -> Result<(), InsuranceFundError> {
        self.access.require(Role::Owner, caller)?;
        let previous: Vec<Address> = self.access.holders(Role::Beneficiary).collect();
        for who in previous {
            self.access.revoke(Role::Beneficiary, who);
        }
        self.access.grant(Role::Beneficiary, beneficiary);
        Ok(())
    }

    // 6.1.1: registration

    pub fn add_amm(
        &mut self,
        caller: Address,
        amm: AmmId,
        asset: AssetId,
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<(), InsuranceFundError> {
        self.access.require(Role::Owner, caller)?;
        if self.amms.iter().any(|(id, _)| *id == amm) {
            return Err(InsuranceFundError::AmmAlreadyAdded(amm));
        }
        self.amms.push((amm, asset));
        if !self.quote_assets.contains(&asset) {
            self.quote_assets.push(asset);
        }
        events.emit(block, EventPayload::AmmAdded(AmmRegistrationEvent { amm, asset }));
        tracing::info!(?amm, ?asset, "amm added to insurance fund");
        Ok(())
    }

    /// Unregisters an amm. When no other amm settles in its asset the asset is
    /// dropped and its balance is swapped into the remaining asset it buys the most
    /// of, or into the protocol token when none remain.
    pub fn remove_amm(
        &mut self,
        caller: Address,
        amm: AmmId,
        ledger: &mut dyn TokenLedger,
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<(), InsuranceFundError> {
        self.access.require(Role::Owner, caller)?;
        let index = self
            .amms
            .iter()
            .position(|(id, _)| *id == amm)
            .ok_or(InsuranceFundError::AmmNotFound(amm))?;
        let (_, asset) = self.amms.remove(index);
        events.emit(block, EventPayload::AmmRemoved(AmmRegistrationEvent { amm, asset }));

        if self.amms.iter().any(|(_, other)| *other == asset) {
            return Ok(());
        }
        self.quote_assets.retain(|other| *other != asset);

        let balance = self.balance_of(ledger, asset)?;
        if balance.is_zero() {
            return Ok(());
        }
        let mut target = self.protocol_token;
        let mut best = FixedPoint::ZERO;
        for other in &self.quote_assets {
            let value = self.exchange.input_price(asset, *other, balance)?;
            if value > best {
                best = value;
                target = *other;
            }
        }
        self.swap(ledger, asset, target, balance, FixedPoint::ZERO, events, block)?;
        tracing::info!(?amm, ?asset, ?target, %balance, "removed asset swapped out");
        Ok(())
    }

    // 6.2: waterfall

    /// Other registered assets with a balance, by current value in `asset`,
    /// richest first. Equal values keep registration order.
    pub fn ordered_quote_assets(
        &self,
        ledger: &dyn TokenLedger,
        asset: AssetId,
    ) -> Result<Vec<(AssetId, FixedPoint)>, InsuranceFundError> {
        let mut ranked = Vec::new();
        for other in self.quote_assets.iter().filter(|other| **other != asset) {
            let balance = self.balance_of(ledger, *other)?;
            if balance.is_zero() {
                continue;
            }
            let value = self.exchange.input_price(*other, asset, balance)?;
            ranked.push((*other, value));
        }
        // sort_by is stable
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(ranked)
    }

    /// Beneficiary only. Pays `amount` of `asset` to the caller.
    pub fn withdraw(
        &mut self,
        caller: Address,
        asset: AssetId,
        amount: FixedPoint,
        ledger: &mut dyn TokenLedger,
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<(), InsuranceFundError> {
        self.access.require(Role::Beneficiary, caller)?;
        if !self.is_quote_asset(asset) {
            return Err(InsuranceFundError::AssetNotSupported(asset));
        }

        let balance = self.balance_of(ledger, asset)?;
        if balance < amount {
            self.cover_shortfall(asset, amount.checked_sub(balance)?, ledger, events, block)?;
        }

        let available = self.balance_of(ledger, asset)?;
        if available < amount {
            return Err(InsuranceFundError::FundNotEnough {
                asset,
                requested: amount,
                available,
            });
        }
        ledger::checked_transfer(ledger, asset, self.address, caller, amount)?;
        events.emit(
            block,
            EventPayload::Withdrawn(WithdrawnEvent {
                asset,
                to: caller,
                amount,
            }),
        );
        tracing::info!(?asset, to = %caller, %amount, "insurance fund withdrawal");
        Ok(())
    }

    fn cover_shortfall(
        &mut self,
        asset: AssetId,
        shortfall: FixedPoint,
        ledger: &mut dyn TokenLedger,
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<(), InsuranceFundError> {
        let mut remaining = shortfall;
        for (other, _) in self.ordered_quote_assets(ledger, asset)? {
            let other_balance = self.balance_of(ledger, other)?;
            let needed = self.exchange.output_price(other, asset, remaining)?;
            if needed <= other_balance {
                self.swap(ledger, other, asset, needed, remaining, events, block)?;
                return Ok(());
            }
            let received = self.swap(ledger, other, asset, other_balance, FixedPoint::ZERO, events, block)?;
            if received >= remaining {
                return Ok(());
            }
            remaining = remaining.checked_sub(received)?;
        }

        // every other asset is exhausted
        let to_mint = self.exchange.output_price(self.protocol_token, asset, remaining)?;
        ledger::checked_mint(ledger, self.protocol_token, self.address, to_mint)?;
        self.monitor.record_minted(to_mint, block.timestamp);
        events.emit(
            block,
            EventPayload::TokenMinted(TokenMintedEvent {
                asset: self.protocol_token,
                amount: to_mint,
            }),
        );
        tracing::warn!(?asset, %remaining, minted = %to_mint, "protocol token minted to cover shortfall");
        self.swap(ledger, self.protocol_token, asset, to_mint, remaining, events, block)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn swap(
        &self,
        ledger: &mut dyn TokenLedger,
        from: AssetId,
        to: AssetId,
        amount: FixedPoint,
        min_out: FixedPoint,
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<FixedPoint, InsuranceFundError> {
        let received = self.exchange.swap_input(ledger, self.address, from, to, amount, min_out)?;
        events.emit(
            block,
            EventPayload::TokenSwapped(TokenSwappedEvent {
                from,
                to,
                sold: amount,
                received,
            }),
        );
        Ok(received)
    }

    // 6.3: circuit breaker

    pub fn is_over_mint_threshold(&self, ledger: &dyn TokenLedger, now: Timestamp) -> Result<bool, InsuranceFundError> {
        let supply = ledger::supply(ledger, self.protocol_token)?;
        Ok(self.monitor.is_over_mint_threshold(supply, now)?)
    }

    /// Anyone may call once the breaker trips. Shuts every registered amm down
    /// and returns the settlement prices in registration order. Repeating the
    /// call leaves the prices unchanged.
    pub fn shutdown_all_amm(
        &self,
        ledger: &dyn TokenLedger,
        amms: &mut [Amm],
        events: &mut dyn EventEmitter,
        block: BlockInfo,
    ) -> Result<Vec<FixedPoint>, InsuranceFundError> {
        if !self.is_over_mint_threshold(ledger, block.timestamp)? {
            return Err(InsuranceFundError::LossNotLargeEnough);
        }
        let mut prices = Vec::with_capacity(self.amms.len());
        for (id, _) in &self.amms {
            let amm = amms.get_mut(id.0 as usize).ok_or(InsuranceFundError::AmmNotFound(*id))?;
            let already_shut = amm.settlement_price().is_some();
            let price = amm.shutdown(self.address)?;
            if !already_shut {
                events.emit(
                    block,
                    EventPayload::Shutdown(ShutdownEvent {
                        amm: *id,
                        settlement_price: price,
                    }),
                );
            }
            prices.push(price);
        }
        tracing::warn!(amms = prices.len(), "all amms shut down");
        Ok(prices)
    }
}
