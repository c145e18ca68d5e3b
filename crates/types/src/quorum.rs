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

//! Signer sets, approval sets and the recovery request lifecycle.

use std::{collections::BTreeSet, time::Duration};

use alloy_primitives::Address;

use crate::{PolicyError, Timestamp};

/// An ordered, duplicate-free set of signing addresses with a
/// confirmation threshold.
///
/// Validity is enforced at construction: a bad threshold or a duplicate
/// signer can never reach use-time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerSet {
    signers: Vec<Address>,
    threshold: usize,
}

impl SignerSet {
    /// Create a signer set, requiring at least `minimum` signers and
    /// `1 <= threshold <= len`.
    pub fn new(
        signers: Vec<Address>,
        threshold: usize,
        minimum: usize,
    ) -> Result<Self, PolicyError> {
        if signers.len() < minimum {
            return Err(PolicyError::InvalidSignerSet(format!(
                "{} signers provided, at least {minimum} required",
                signers.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for signer in &signers {
            if !seen.insert(*signer) {
                return Err(PolicyError::InvalidSignerSet(format!(
                    "duplicate signer {signer}"
                )));
            }
        }
        if threshold == 0 || threshold > signers.len() {
            return Err(PolicyError::InvalidSignerSet(format!(
                "threshold {threshold} outside 1..={}",
                signers.len()
            )));
        }
        Ok(Self { signers, threshold })
    }

    /// Whether `address` is a member of the set.
    pub fn contains(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// The members, in registration order.
    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// The confirmation threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Distinct approvers of a pending action.
///
/// Set semantics make a double-approval by the same address a no-op
/// rather than a double-count.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApprovalSet(BTreeSet<Address>);

impl ApprovalSet {
    /// Create an empty approval set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an approval. Returns false if the approver was already
    /// counted.
    pub fn approve(&mut self, approver: Address) -> bool {
        self.0.insert(approver)
    }

    /// Whether `approver` has already approved.
    pub fn contains(&self, approver: &Address) -> bool {
        self.0.contains(approver)
    }

    /// Number of distinct approvals.
    pub fn count(&self) -> usize {
        self.0.len()
    }
}

/// Lifecycle of a recovery request over a proposed change of type `T`.
///
/// A fresh initiation supersedes any pending request, clearing its stale
/// approvals.
#[derive(Clone, Debug)]
pub enum RecoveryState<T> {
    /// No recovery is pending.
    Idle,
    /// A recovery request is open and collecting approvals.
    Pending {
        /// The change that will be applied on execution.
        proposed: T,
        /// Who opened the request.
        initiator: Address,
        /// Distinct approvers, including the initiator.
        approvals: ApprovalSet,
        /// When the request was opened; the delay counts from here.
        requested_at: Timestamp,
    },
}

impl<T> RecoveryState<T> {
    /// Open a request, superseding any pending one. The initiator counts
    /// as the first approval.
    pub fn initiate(&mut self, proposed: T, initiator: Address, now: Timestamp) {
        let mut approvals = ApprovalSet::new();
        approvals.approve(initiator);
        *self = RecoveryState::Pending {
            proposed,
            initiator,
            approvals,
            requested_at: now,
        };
    }

    /// Register an approval on the pending request, returning the number
    /// of distinct approvals. Duplicate approvals are no-ops.
    pub fn approve(&mut self, approver: Address) -> Result<usize, PolicyError> {
        match self {
            RecoveryState::Idle => Err(PolicyError::NoPendingRecovery),
            RecoveryState::Pending { approvals, .. } => {
                approvals.approve(approver);
                Ok(approvals.count())
            }
        }
    }

    /// Check whether the pending request may execute at `now`.
    ///
    /// The threshold is checked before the time gate: below quorum the
    /// answer is [`PolicyError::ThresholdNotMet`] regardless of elapsed
    /// time, and with quorum met but the delay not elapsed it is
    /// [`PolicyError::RecoveryNotReady`].
    pub fn ready(
        &self,
        threshold: usize,
        delay: Duration,
        now: Timestamp,
    ) -> Result<&T, PolicyError> {
        match self {
            RecoveryState::Idle => Err(PolicyError::NoPendingRecovery),
            RecoveryState::Pending {
                proposed,
                approvals,
                requested_at,
                ..
            } => {
                if approvals.count() < threshold {
                    return Err(PolicyError::ThresholdNotMet {
                        approvals: approvals.count(),
                        threshold,
                    });
                }
                let ready_at = *requested_at + delay;
                if now < ready_at {
                    return Err(PolicyError::RecoveryNotReady { ready_at });
                }
                Ok(proposed)
            }
        }
    }

    /// Consume the pending request, returning the proposed change.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, RecoveryState::Idle) {
            RecoveryState::Idle => None,
            RecoveryState::Pending { proposed, .. } => Some(proposed),
        }
    }

    /// Whether a request is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, RecoveryState::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[test]
    fn rejects_duplicate_signers() {
        let err = SignerSet::new(vec![addr(1), addr(2), addr(1)], 2, 1).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignerSet(_)));
    }

    #[test]
    fn rejects_threshold_above_len() {
        let err = SignerSet::new(vec![addr(1), addr(2)], 3, 1).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignerSet(_)));
        let err = SignerSet::new(vec![addr(1), addr(2)], 0, 1).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignerSet(_)));
    }

    #[test]
    fn rejects_below_minimum() {
        let err = SignerSet::new(vec![addr(1), addr(2)], 2, 3).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignerSet(_)));
    }

    #[test]
    fn double_approval_is_a_no_op() {
        let mut approvals = ApprovalSet::new();
        assert!(approvals.approve(addr(1)));
        assert!(!approvals.approve(addr(1)));
        assert_eq!(approvals.count(), 1);
    }

    #[test]
    fn initiator_counts_as_first_approval() {
        let mut recovery = RecoveryState::Idle;
        recovery.initiate(addr(9), addr(1), Timestamp::new(100));
        let count = recovery.approve(addr(2)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn threshold_checked_before_time() {
        let delay = Duration::from_secs(3600);
        let mut recovery = RecoveryState::Idle;
        recovery.initiate(addr(9), addr(1), Timestamp::new(100));

        // below quorum, even long after the delay
        let late = Timestamp::new(100) + delay + Duration::from_secs(10_000);
        let err = recovery.ready(2, delay, late).unwrap_err();
        assert!(matches!(err, PolicyError::ThresholdNotMet { .. }));

        // quorum met, 1 second early
        recovery.approve(addr(2)).unwrap();
        let early = Timestamp::new(100) + delay - Duration::from_secs(1);
        let err = recovery.ready(2, delay, early).unwrap_err();
        assert!(matches!(err, PolicyError::RecoveryNotReady { .. }));

        // quorum met, exactly at the delay
        let on_time = Timestamp::new(100) + delay;
        assert_eq!(recovery.ready(2, delay, on_time).unwrap(), &addr(9));
    }

    #[test]
    fn fresh_initiation_supersedes_and_clears_approvals() {
        let mut recovery = RecoveryState::Idle;
        recovery.initiate(addr(9), addr(1), Timestamp::new(100));
        recovery.approve(addr(2)).unwrap();
        recovery.approve(addr(3)).unwrap();

        recovery.initiate(addr(8), addr(2), Timestamp::new(200));
        match &recovery {
            RecoveryState::Pending {
                proposed,
                approvals,
                requested_at,
                ..
            } => {
                assert_eq!(proposed, &addr(8));
                assert_eq!(approvals.count(), 1);
                assert_eq!(*requested_at, Timestamp::new(200));
            }
            RecoveryState::Idle => panic!("expected pending recovery"),
        }
    }

    #[test]
    fn approve_without_pending_fails() {
        let mut recovery: RecoveryState<Address> = RecoveryState::Idle;
        let err = recovery.approve(addr(1)).unwrap_err();
        assert!(matches!(err, PolicyError::NoPendingRecovery));
    }

    #[test]
    fn take_clears_the_request() {
        let mut recovery = RecoveryState::Idle;
        recovery.initiate(addr(9), addr(1), Timestamp::new(100));
        assert_eq!(recovery.take(), Some(addr(9)));
        assert!(!recovery.is_pending());
        assert_eq!(recovery.take(), None);
    }
}
