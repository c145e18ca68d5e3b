// This file is part of Warden.
//
// Warden is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Warden is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Warden.
// If not, see https://www.gnu.org/licenses/.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Fee sponsorship: allow-set paymasters with rolling daily and
//! per-operation caps.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use tracing::debug;
use warden_ledger::Ledger;
use warden_types::{Clock, DailyQuota, Operation, PolicyError};

/// Spending caps applied to every sponsored subject.
#[derive(Clone, Copy, Debug)]
pub struct PaymasterConfig {
    /// Rolling 24-hour cap per sponsored subject.
    pub daily_limit: U256,
    /// Cap per single operation.
    pub tx_limit: U256,
}

/// What a sponsorship was granted against.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum SponsorKey {
    /// A sponsored sender address.
    Address(Address),
    /// A sponsored target app.
    App(Address),
}

/// Granted sponsorship for one operation; hand it back through
/// [`SponsoringPaymaster::post_op`] exactly once.
#[derive(Clone, Copy, Debug)]
pub struct SponsorshipContext {
    key: SponsorKey,
    estimated_cost: U256,
}

/// A paymaster that sponsors fees for allow-listed sender addresses and
/// target apps, bounded per subject by a rolling daily window and a
/// per-operation cap, and by its own ledger deposit.
pub struct SponsoringPaymaster {
    address: Address,
    owner: Address,
    config: PaymasterConfig,
    state: RwLock<PaymasterState>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct PaymasterState {
    sponsored_addresses: HashSet<Address>,
    sponsored_apps: HashSet<Address>,
    records: HashMap<SponsorKey, DailyQuota>,
}

impl SponsoringPaymaster {
    /// Create a paymaster owned by `owner`.
    pub fn new(
        address: Address,
        owner: Address,
        config: PaymasterConfig,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            owner,
            config,
            state: RwLock::new(PaymasterState::default()),
            ledger,
            clock,
        }
    }

    /// The paymaster's own address, referenced by operations.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Add a sender address to the allow set. Owner-only.
    pub fn sponsor(&self, caller: Address, address: Address) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        self.state.write().sponsored_addresses.insert(address);
        Ok(())
    }

    /// Add a target app to the allow set. Owner-only.
    pub fn sponsor_app(&self, caller: Address, app: Address) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        self.state.write().sponsored_apps.insert(app);
        Ok(())
    }

    /// Whether `subject` is in either allow set.
    pub fn is_sponsored(&self, subject: Address) -> bool {
        let state = self.state.read();
        state.sponsored_addresses.contains(&subject) || state.sponsored_apps.contains(&subject)
    }

    /// Decide whether to sponsor `op` and reserve its estimated cost
    /// against the subject's rolling window.
    ///
    /// The reservation is settled by [`SponsoringPaymaster::post_op`]
    /// with the actual cost; an operation abandoned after validation
    /// must post an actual cost of zero to release it.
    pub async fn validate_sponsorship(
        &self,
        op: &Operation,
    ) -> Result<SponsorshipContext, PolicyError> {
        let estimated_cost = op.max_gas_cost();

        let key = {
            let state = self.state.read();
            if state.sponsored_addresses.contains(&op.sender) {
                SponsorKey::Address(op.sender)
            } else if state.sponsored_apps.contains(&op.target) {
                SponsorKey::App(op.target)
            } else {
                return Err(PolicyError::NotSponsored);
            }
        };

        if estimated_cost > self.config.tx_limit {
            return Err(PolicyError::QuotaExceeded {
                requested: estimated_cost,
                remaining: self.config.tx_limit,
            });
        }

        let deposit = self.ledger.balance_of(self.address).await?;
        if deposit < estimated_cost {
            return Err(PolicyError::DepositTooLow {
                needed: estimated_cost,
                available: deposit,
            });
        }

        let now = self.clock.now();
        let daily_limit = self.config.daily_limit;
        self.state
            .write()
            .records
            .entry(key)
            .or_insert_with(|| DailyQuota::new(daily_limit, now))
            .try_reserve(estimated_cost, now)?;

        debug!(paymaster = %self.address, sender = %op.sender, %estimated_cost, "sponsorship granted");
        Ok(SponsorshipContext {
            key,
            estimated_cost,
        })
    }

    /// Settle a granted sponsorship: commit `actual_cost` against the
    /// window and release the rest of the reservation.
    pub fn post_op(&self, context: SponsorshipContext, actual_cost: U256) {
        let refund = context.estimated_cost.saturating_sub(actual_cost);
        if refund.is_zero() {
            return;
        }
        if let Some(record) = self.state.write().records.get_mut(&context.key) {
            record.refund(refund);
        }
    }

    /// Amount the subject keyed by `context` has left in its window.
    pub fn remaining_for(&self, subject: Address) -> U256 {
        let now = self.clock.now();
        let state = self.state.read();
        for key in [SponsorKey::Address(subject), SponsorKey::App(subject)] {
            if let Some(record) = state.records.get(&key) {
                return record.remaining(now);
            }
        }
        self.config.daily_limit
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), PolicyError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(PolicyError::Unauthorized(format!(
                "{caller} is not the paymaster owner"
            )))
        }
    }
}

/// Registry of paymasters, resolved by address.
#[derive(Default)]
pub struct PaymasterRegistry {
    paymasters: RwLock<HashMap<Address, Arc<SponsoringPaymaster>>>,
}

impl PaymasterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a paymaster under its own address.
    pub fn insert(&self, paymaster: Arc<SponsoringPaymaster>) {
        self.paymasters
            .write()
            .insert(paymaster.address(), paymaster);
    }

    /// Look up a paymaster by address.
    pub fn get(&self, address: Address) -> Option<Arc<SponsoringPaymaster>> {
        self.paymasters.read().get(&address).cloned()
    }
}
