//! Role-based access control.
//!
//! Each component owns one `AccessControl` and checks the caller's role at
//! every privileged entry point. Roles replace single-owner admin addresses:
//! the counter-party capability on an Amm, the beneficiary of the insurance
//! fund and the backstop liquidity providers are all grants here.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// configuration and admin actions
    Owner,
    /// the only caller allowed to mutate Amm reserves
    CounterParty,
    /// may shut an Amm down besides its owner
    GlobalShutdown,
    /// may withdraw from the insurance fund
    Beneficiary,
    /// may trigger liquidations that create fresh bad debt
    BackstopLiquidityProvider,
    /// exempt from open interest cap and position size bound
    Whitelisted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("caller {caller} lacks role {role:?}")]
pub struct AccessError {
    pub role: Role,
    pub caller: Address,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    grants: BTreeSet<(Role, Address)>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(owner: Address) -> Self {
        let mut access = Self::new();
        access.grant(Role::Owner, owner);
        access
    }

    pub fn grant(&mut self, role: Role, who: Address) {
        self.grants.insert((role, who));
    }

    pub fn revoke(&mut self, role: Role, who: Address) {
        self.grants.remove(&(role, who));
    }

    pub fn has_role(&self, role: Role, who: Address) -> bool {
        self.grants.contains(&(role, who))
    }

    pub fn require(&self, role: Role, caller: Address) -> Result<(), AccessError> {
        if self.has_role(role, caller) {
            Ok(())
        } else {
            Err(AccessError { role, caller })
        }
    }

    /// Passes if the caller holds any of `roles`. Reports the first role on failure.
    pub fn require_any(&self, roles: &[Role], caller: Address) -> Result<(), AccessError> {
        if roles.iter().any(|role| self.has_role(*role, caller)) {
            return Ok(());
        }
        Err(AccessError {
            role: roles.first().copied().unwrap_or(Role::Owner),
            caller,
        })
    }

    pub fn holders(&self, role: Role) -> impl Iterator<Item = Address> + '_ {
        self.grants
            .iter()
            .filter(move |(r, _)| *r == role)
            .map(|(_, who)| *who)
    }
}
