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
use warden_ledger::{CallOutcome, Ledger, LedgerCall};
use warden_types::{Clock, DailyQuota, Operation, PolicyError, SignerSet};

use crate::{
    proposals::{Proposal, ProposalBook},
    AccountKind, AccountPolicy, Caller,
};

/// Construction parameters for a threshold multisig account.
#[derive(Clone, Debug)]
pub struct MultiSigConfig {
    /// Signing addresses, duplicate-free.
    pub signers: Vec<Address>,
    /// Confirmations required on the proposal path.
    pub threshold: usize,
    /// Rolling 24-hour spending limit.
    pub daily_limit: U256,
    /// Per-transaction spending limit.
    pub tx_limit: U256,
    /// How long a proposal stays executable.
    pub proposal_ttl: Duration,
}

/// Threshold multisig account.
///
/// Funds move through two surfaces with independent checks: the
/// propose/confirm/execute workflow, which always requires the
/// confirmation threshold, and the dispatcher/direct single-signer
/// `execute` path. The daily and per-transaction limits cap both.
#[derive(Debug)]
pub struct MultiSigAccount {
    address: Address,
    signers: SignerSet,
    tx_limit: U256,
    state: RwLock<MultiSigState>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct MultiSigState {
    quota: DailyQuota,
    proposals: ProposalBook,
}

impl MultiSigAccount {
    /// Create a multisig account. Fails on an invalid signer set or
    /// threshold; nothing is usable afterwards.
    pub fn new(
        address: Address,
        config: MultiSigConfig,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PolicyError> {
        let signers = SignerSet::new(config.signers, config.threshold, 1)?;
        let quota = DailyQuota::new(config.daily_limit, clock.now());
        Ok(Self {
            address,
            signers,
            tx_limit: config.tx_limit,
            state: RwLock::new(MultiSigState {
                quota,
                proposals: ProposalBook::new(config.proposal_ttl),
            }),
            ledger,
            clock,
        })
    }

    /// The signer set.
    pub fn signers(&self) -> &SignerSet {
        &self.signers
    }

    /// Snapshot of a proposal.
    pub fn proposal(&self, index: u64) -> Result<Proposal, PolicyError> {
        Ok(self.state.read().proposals.get(index)?.clone())
    }

    /// Open a proposal. Any signer may propose; the proposer counts as
    /// the first confirmation.
    pub fn propose_transaction(
        &self,
        proposer: Address,
        dest: Address,
        value: U256,
        data: Bytes,
    ) -> Result<u64, PolicyError> {
        self.ensure_signer(proposer)?;
        let now = self.clock.now();
        Ok(self
            .state
            .write()
            .proposals
            .propose(proposer, dest, value, data, now))
    }

    /// Confirm a proposal, once per signer. Returns the confirmation
    /// count.
    pub fn confirm_transaction(&self, signer: Address, index: u64) -> Result<usize, PolicyError> {
        self.ensure_signer(signer)?;
        let now = self.clock.now();
        self.state.write().proposals.confirm(signer, index, now)
    }

    /// Execute a proposal once it holds threshold confirmations, has not
    /// expired, and fits the spending limits.
    ///
    /// A failed ledger call reopens the proposal and releases the quota
    /// reservation; the outcome is returned either way.
    pub async fn execute_transaction(
        &self,
        signer: Address,
        index: u64,
    ) -> Result<CallOutcome, PolicyError> {
        self.ensure_signer(signer)?;
        let now = self.clock.now();
        let (dest, value, data) = {
            let mut state = self.state.write();
            let (dest, value, data) =
                state
                    .proposals
                    .begin_execution(index, self.signers.threshold(), now)?;
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

    /// Amount still spendable in the current window.
    pub fn daily_remaining(&self) -> U256 {
        self.state.read().quota.remaining(self.clock.now())
    }

    fn ensure_signer(&self, address: Address) -> Result<(), PolicyError> {
        if self.signers.contains(&address) {
            Ok(())
        } else {
            Err(PolicyError::Unauthorized(format!(
                "{address} is not a signer"
            )))
        }
    }

    async fn verify_any_signer(
        &self,
        signers: &[Address],
        op_hash: B256,
        signature: &Bytes,
    ) -> Result<(), PolicyError> {
        for signer in signers {
            if self
                .ledger
                .verify_signature(*signer, op_hash, signature)
                .await?
            {
                return Ok(());
            }
        }
        Err(PolicyError::InvalidSignature)
    }
}

#[async_trait::async_trait]
impl AccountPolicy for MultiSigAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::MultiSig
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        self.verify_any_signer(self.signers.signers(), op_hash, &op.signature)
            .await
    }

    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        if let Caller::Direct(address) = caller {
            self.ensure_signer(address)?;
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
