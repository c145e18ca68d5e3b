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

//! The propose/confirm/execute workflow shared by the threshold account
//! variants.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use warden_types::{ApprovalSet, PolicyError, Timestamp};

/// Lifecycle state of a proposal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProposalStatus {
    /// Collecting confirmations.
    Pending,
    /// Executed, terminal.
    Executed,
}

/// A proposed transaction collecting signer confirmations.
///
/// Expiry is judged against the clock at use-time: a proposal with
/// `now >= expires_at` can never be confirmed or executed.
#[derive(Clone, Debug)]
pub struct Proposal {
    /// Call target.
    pub dest: Address,
    /// Value to transfer.
    pub value: U256,
    /// Call payload.
    pub data: Bytes,
    /// The signer who proposed it.
    pub proposer: Address,
    /// When the proposal was opened.
    pub proposed_at: Timestamp,
    /// After this instant the proposal is dead.
    pub expires_at: Timestamp,
    /// Distinct confirming signers, including the proposer.
    pub confirmations: ApprovalSet,
    /// Current lifecycle state.
    pub status: ProposalStatus,
}

impl Proposal {
    /// Whether the proposal has expired at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.status == ProposalStatus::Pending && now >= self.expires_at
    }
}

/// Indexed book of proposals for one account.
#[derive(Debug)]
pub(crate) struct ProposalBook {
    proposals: Vec<Proposal>,
    ttl: Duration,
}

impl ProposalBook {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            proposals: Vec::new(),
            ttl,
        }
    }

    /// Open a proposal; the proposer counts as the first confirmation.
    pub(crate) fn propose(
        &mut self,
        proposer: Address,
        dest: Address,
        value: U256,
        data: Bytes,
        now: Timestamp,
    ) -> u64 {
        let index = self.proposals.len() as u64;
        let mut confirmations = ApprovalSet::new();
        confirmations.approve(proposer);
        self.proposals.push(Proposal {
            dest,
            value,
            data,
            proposer,
            proposed_at: now,
            expires_at: now + self.ttl,
            confirmations,
            status: ProposalStatus::Pending,
        });
        index
    }

    /// Register a confirmation, returning the confirmation count.
    /// Each signer confirms at most once.
    pub(crate) fn confirm(
        &mut self,
        signer: Address,
        index: u64,
        now: Timestamp,
    ) -> Result<usize, PolicyError> {
        let proposal = self.get_mut(index)?;
        if proposal.status == ProposalStatus::Executed {
            return Err(PolicyError::AlreadyExecuted(index));
        }
        if proposal.is_expired(now) {
            return Err(PolicyError::ProposalExpired(index));
        }
        if !proposal.confirmations.approve(signer) {
            return Err(PolicyError::AlreadyConfirmed(index));
        }
        Ok(proposal.confirmations.count())
    }

    /// Gate execution and flip the proposal to `Executed`, handing back
    /// the call to perform. The flip happens before the call so a
    /// re-entrant attempt sees a terminal proposal; callers roll back
    /// with [`ProposalBook::rollback`] if the call fails.
    pub(crate) fn begin_execution(
        &mut self,
        index: u64,
        threshold: usize,
        now: Timestamp,
    ) -> Result<(Address, U256, Bytes), PolicyError> {
        let proposal = self.get_mut(index)?;
        if proposal.status == ProposalStatus::Executed {
            return Err(PolicyError::AlreadyExecuted(index));
        }
        if proposal.is_expired(now) {
            return Err(PolicyError::ProposalExpired(index));
        }
        if proposal.confirmations.count() < threshold {
            return Err(PolicyError::ThresholdNotMet {
                approvals: proposal.confirmations.count(),
                threshold,
            });
        }
        proposal.status = ProposalStatus::Executed;
        Ok((proposal.dest, proposal.value, proposal.data.clone()))
    }

    /// Return a proposal to `Pending` after a failed execution.
    pub(crate) fn rollback(&mut self, index: u64) {
        if let Some(proposal) = self.proposals.get_mut(index as usize) {
            proposal.status = ProposalStatus::Pending;
        }
    }

    /// Cut every pending proposal's expiry to `now`, killing it.
    pub(crate) fn expire_all_pending(&mut self, now: Timestamp) {
        for proposal in &mut self.proposals {
            if proposal.status == ProposalStatus::Pending && proposal.expires_at > now {
                proposal.expires_at = now;
            }
        }
    }

    pub(crate) fn get(&self, index: u64) -> Result<&Proposal, PolicyError> {
        self.proposals
            .get(index as usize)
            .ok_or(PolicyError::UnknownProposal(index))
    }

    fn get_mut(&mut self, index: u64) -> Result<&mut Proposal, PolicyError> {
        self.proposals
            .get_mut(index as usize)
            .ok_or(PolicyError::UnknownProposal(index))
    }
}
