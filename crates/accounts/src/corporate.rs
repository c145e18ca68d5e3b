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
use warden_types::{Clock, DailyQuota, Operation, PolicyError, RecoveryState, SignerSet};

use crate::{
    proposals::{Proposal, ProposalBook},
    AccountKind, AccountPolicy, Caller,
};

/// Cooldown between initiating a signer-set recovery and executing it.
pub const RECOVERY_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Minimum size of a corporate signer set, at creation and on
/// replacement.
const MIN_SIGNERS: usize = 3;

/// Construction parameters for a corporate account.
#[derive(Clone, Debug)]
pub struct CorporateConfig {
    /// Signing addresses, duplicate-free, at least three.
    pub signers: Vec<Address>,
    /// Confirmations required on the proposal path and for recovery.
    pub threshold: usize,
    /// Rolling 24-hour spending limit.
    pub daily_limit: U256,
    /// Per-transaction spending limit.
    pub tx_limit: U256,
    /// How long a proposal stays executable.
    pub proposal_ttl: Duration,
}

/// Threshold multisig with full signer-set replacement.
///
/// Day-to-day operation is the same propose/confirm/execute workflow as
/// the plain multisig. Recovery replaces the entire signer set at once:
/// initiated by a current signer with a fresh set of at least three
/// addresses, approved by a quorum of current signers, and executable
/// only after a fixed 7-day cooldown. On success the set is swapped
/// atomically and every in-flight proposal is killed.
#[derive(Debug)]
pub struct CorporateRecoveryAccount {
    address: Address,
    tx_limit: U256,
    state: RwLock<CorporateState>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct CorporateState {
    signers: SignerSet,
    quota: DailyQuota,
    proposals: ProposalBook,
    recovery: RecoveryState<SignerSet>,
}

impl CorporateRecoveryAccount {
    /// Create a corporate account. Fails on an invalid signer set, a bad
    /// threshold, or fewer than three signers.
    pub fn new(
        address: Address,
        config: CorporateConfig,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PolicyError> {
        let signers = SignerSet::new(config.signers, config.threshold, MIN_SIGNERS)?;
        let quota = DailyQuota::new(config.daily_limit, clock.now());
        Ok(Self {
            address,
            tx_limit: config.tx_limit,
            state: RwLock::new(CorporateState {
                signers,
                quota,
                proposals: ProposalBook::new(config.proposal_ttl),
                recovery: RecoveryState::Idle,
            }),
            ledger,
            clock,
        })
    }

    /// The current signer set.
    pub fn signers(&self) -> SignerSet {
        self.state.read().signers.clone()
    }

    /// Whether a signer-set recovery is pending.
    pub fn recovery_pending(&self) -> bool {
        self.state.read().recovery.is_pending()
    }

    /// Snapshot of a proposal.
    pub fn proposal(&self, index: u64) -> Result<Proposal, PolicyError> {
        Ok(self.state.read().proposals.get(index)?.clone())
    }

    /// Open a proposal. Any current signer may propose.
    pub fn propose_transaction(
        &self,
        proposer: Address,
        dest: Address,
        value: U256,
        data: Bytes,
    ) -> Result<u64, PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_signer(&state, proposer)?;
        Ok(state.proposals.propose(proposer, dest, value, data, now))
    }

    /// Confirm a proposal, once per signer.
    pub fn confirm_transaction(&self, signer: Address, index: u64) -> Result<usize, PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_signer(&state, signer)?;
        state.proposals.confirm(signer, index, now)
    }

    /// Execute a proposal holding threshold confirmations, within the
    /// spending limits. A failed call reopens the proposal.
    pub async fn execute_transaction(
        &self,
        signer: Address,
        index: u64,
    ) -> Result<CallOutcome, PolicyError> {
        let now = self.clock.now();
        let (dest, value, data) = {
            let mut state = self.state.write();
            Self::ensure_signer(&state, signer)?;
            let threshold = state.signers.threshold();
            let (dest, value, data) = state.proposals.begin_execution(index, threshold, now)?;
            if value > self.tx_limit {
                state.proposals.rollback(index);
                return Err(PolicyError::QuotaExceeded {
                    requested: value,
                    remaining: self.tx_limit,
                });
            }
            if let Err(err) = state.quota.try_reserve(value, now) {
                state.proposals.rollback(index);
                return Err(err);
            }
            (dest, value, data)
        };

        let result = self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: dest,
                value,
                data,
            })
            .await;

        match result {
            Ok(outcome) if outcome.success => Ok(outcome),
            Ok(outcome) => {
                let mut state = self.state.write();
                state.proposals.rollback(index);
                state.quota.refund(value);
                Ok(outcome)
            }
            Err(err) => {
                let mut state = self.state.write();
                state.proposals.rollback(index);
                state.quota.refund(value);
                Err(err.into())
            }
        }
    }

    /// Open a signer-set recovery, superseding any pending one. The new
    /// set must hold at least three duplicate-free addresses and still
    /// satisfy the current threshold.
    pub fn initiate_recovery(
        &self,
        caller: Address,
        new_signers: Vec<Address>,
    ) -> Result<(), PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_signer(&state, caller)?;
        let proposed = SignerSet::new(new_signers, state.signers.threshold(), MIN_SIGNERS)?;
        state.recovery.initiate(proposed, caller, now);
        info!(account = %self.address, "signer-set recovery initiated");
        Ok(())
    }

    /// Approve the pending recovery as a current signer. Duplicate
    /// approvals are no-ops. Returns the number of distinct approvals.
    pub fn approve_recovery(&self, caller: Address) -> Result<usize, PolicyError> {
        let mut state = self.state.write();
        Self::ensure_signer(&state, caller)?;
        state.recovery.approve(caller)
    }

    /// Swap in the proposed signer set once a quorum of current signers
    /// approved and the 7-day cooldown elapsed. Pending proposals are
    /// killed: confirmations from the outgoing set must not carry over.
    pub fn recover_access(&self, caller: Address) -> Result<(), PolicyError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        Self::ensure_signer(&state, caller)?;
        let threshold = state.signers.threshold();
        state.recovery.ready(threshold, RECOVERY_COOLDOWN, now)?;
        let new_signers = state
            .recovery
            .take()
            .expect("readiness check passed on a pending recovery");
        state.signers = new_signers;
        state.proposals.expire_all_pending(now);
        info!(account = %self.address, signers = state.signers.len(), "signer set replaced");
        Ok(())
    }

    fn ensure_signer(state: &CorporateState, address: Address) -> Result<(), PolicyError> {
        if state.signers.contains(&address) {
            Ok(())
        } else {
            Err(PolicyError::Unauthorized(format!(
                "{address} is not a current signer"
            )))
        }
    }
}

#[async_trait::async_trait]
impl AccountPolicy for CorporateRecoveryAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::Corporate
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        let signers: Vec<Address> = self.state.read().signers.signers().to_vec();
        for signer in signers {
            if self
                .ledger
                .verify_signature(signer, op_hash, &op.signature)
                .await?
            {
                return Ok(());
            }
        }
        Err(PolicyError::InvalidSignature)
    }

    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        if let Caller::Direct(address) = caller {
            let state = self.state.read();
            Self::ensure_signer(&state, address)?;
        }
        if value > self.tx_limit {
            return Err(PolicyError::QuotaExceeded {
                requested: value,
                remaining: self.tx_limit,
            });
        }
        let now = self.clock.now();
        self.state.write().quota.try_reserve(value, now)?;

        let result = self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: target,
                value,
                data,
            })
            .await;

        match result {
            Ok(outcome) if outcome.success => Ok(outcome),
            Ok(outcome) => {
                self.state.write().quota.refund(value);
                Ok(outcome)
            }
            Err(err) => {
                self.state.write().quota.refund(value);
                Err(err.into())
            }
        }
    }
}
