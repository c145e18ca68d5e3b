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

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use parking_lot::RwLock;
use tracing::info;
use warden_ledger::{CallOutcome, Ledger, LedgerCall};
use warden_types::{Clock, Operation, PolicyError, RecoveryState, SignerSet};

use crate::{AccountKind, AccountPolicy, Caller};

/// Single-owner account whose control can be recovered by a guardian
/// quorum after a delay.
///
/// The owner executes normally via signature. Any guardian may open a
/// recovery toward a new owner; a fresh initiation supersedes a pending
/// one and clears its approvals. Guardians and timing are
/// owner-configurable only while no recovery is pending.
pub struct SocialRecoveryAccount {
    address: Address,
    state: RwLock<SocialState>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

struct SocialState {
    owner: Address,
    guardians: SignerSet,
    delay: Duration,
    recovery: RecoveryState<Address>,
}

impl SocialRecoveryAccount {
    /// Create a social recovery account. Fails on an invalid guardian
    /// set or threshold.
    pub fn new(
        address: Address,
        owner: Address,
        guardians: Vec<Address>,
        threshold: usize,
        delay: Duration,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PolicyError> {
        let guardians = SignerSet::new(guardians, threshold, 1)?;
        Ok(Self {
            address,
            state: RwLock::new(SocialState {
                owner,
                guardians,
                delay,
                recovery: RecoveryState::Idle,
            }),
            ledger,
            clock,
        })
    }

    /// The current owner.
    pub fn owner(&self) -> Address {
        self.state.read().owner
    }

    /// The current guardian set.
    pub fn guardians(&self) -> SignerSet {
        self.state.read().guardians.clone()
    }

    /// Whether a recovery request is pending.
    pub fn recovery_pending(&self) -> bool {
        self.state.read().recovery.is_pending()
    }

    /// Replace the guardian set, threshold and delay. Owner-only, and
    /// locked while a recovery is pending.
    pub fn configure_guardians(
        &self,
        caller: Address,
        guardians: Vec<Address>,
        threshold: usize,
        delay: Duration,
    ) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        if caller != state.owner {
            return Err(PolicyError::Unauthorized(format!(
                "{caller} is not the account owner"
            )));
        }
        if state.recovery.is_pending() {
            return Err(PolicyError::Unauthorized(
                "guardian configuration is locked while a recovery is pending".to_string(),
            ));
        }
        state.guardians = SignerSet::new(guardians, threshold, 1)?;
        state.delay = delay;
        Ok(())
    }

    /// Open a recovery toward `new_owner`, superseding any pending
    /// request. The initiator counts as the first approval.
    pub fn initiate_recovery(
        &self,
        guardian: Address,
        new_owner: Address,
    ) -> Result<(), PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_guardian(&state, guardian)?;
        state.recovery.initiate(new_owner, guardian, now);
        info!(account = %self.address, %new_owner, "recovery initiated");
        Ok(())
    }

    /// Approve the pending recovery. Duplicate approvals are no-ops.
    /// Returns the number of distinct approvals.
    pub fn approve_recovery(&self, guardian: Address) -> Result<usize, PolicyError> {
        let mut state = self.state.write();
        Self::ensure_guardian(&state, guardian)?;
        state.recovery.approve(guardian)
    }

    /// Execute the pending recovery once quorum is met and the delay has
    /// elapsed, overwriting the owner and clearing the request.
    pub fn execute_recovery(&self, guardian: Address) -> Result<Address, PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_guardian(&state, guardian)?;
        let threshold = state.guardians.threshold();
        let delay = state.delay;
        state.recovery.ready(threshold, delay, now)?;
        let new_owner = state
            .recovery
            .take()
            .expect("readiness check passed on a pending recovery");
        let old_owner = state.owner;
        state.owner = new_owner;
        info!(account = %self.address, %old_owner, %new_owner, "recovery executed");
        Ok(new_owner)
    }

    fn ensure_guardian(state: &SocialState, address: Address) -> Result<(), PolicyError> {
        if state.guardians.contains(&address) {
            Ok(())
        } else {
            Err(PolicyError::Unauthorized(format!(
                "{address} is not a guardian"
            )))
        }
    }
}

#[async_trait::async_trait]
impl AccountPolicy for SocialRecoveryAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::SocialRecovery
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        let owner = self.owner();
        if self
            .ledger
            .verify_signature(owner, op_hash, &op.signature)
            .await?
        {
            Ok(())
        } else {
            Err(PolicyError::InvalidSignature)
        }
    }

    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        crate::ensure_owner_or_dispatcher(caller, self.owner())?;
        Ok(self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: target,
                value,
                data,
            })
            .await?)
    }
}
