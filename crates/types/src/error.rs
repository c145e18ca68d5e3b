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

use alloy_primitives::{Address, U256};

use crate::Timestamp;

/// Rejections produced by an account policy or paymaster while
/// authorizing or executing an operation.
///
/// Every variant renders a specific reason; callers surface the message
/// verbatim in per-operation results.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Caller is not an owner, signer, guardian, device, or the dispatcher.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// An operation or device signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Fewer distinct approvals than the configured threshold.
    #[error("threshold not met: {approvals} of {threshold} required approvals")]
    ThresholdNotMet {
        /// Distinct approvals registered so far.
        approvals: usize,
        /// Approvals required before the action may execute.
        threshold: usize,
    },
    /// A spend would exceed the applicable limit.
    #[error("quota exceeded: requested {requested} with {remaining} available")]
    QuotaExceeded {
        /// Amount the caller attempted to spend.
        requested: U256,
        /// Amount still spendable under the binding limit.
        remaining: U256,
    },
    /// The account has already been liquidated.
    #[error("already liquidated")]
    AlreadyLiquidated,
    /// The recovery cooldown has not elapsed.
    #[error("recovery not ready: executable at {ready_at}")]
    RecoveryNotReady {
        /// Earliest time the recovery may execute.
        ready_at: Timestamp,
    },
    /// No recovery request is pending.
    #[error("no pending recovery")]
    NoPendingRecovery,
    /// A signer set was rejected at construction or replacement.
    #[error("invalid signer set: {0}")]
    InvalidSignerSet(String),
    /// The device exists but is not active.
    #[error("device inactive: {0}")]
    DeviceInactive(String),
    /// No device is registered under this id.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    /// A device is already registered under this id.
    #[error("device already registered: {0}")]
    DeviceExists(String),
    /// Removing or deactivating the device would leave too few active devices.
    #[error("at least {minimum} active devices required")]
    MinimumDevices {
        /// Configured minimum number of active devices.
        minimum: usize,
    },
    /// No proposal exists at this index.
    #[error("unknown proposal: {0}")]
    UnknownProposal(u64),
    /// The proposal expired before execution.
    #[error("proposal {0} expired")]
    ProposalExpired(u64),
    /// The proposal was already executed.
    #[error("proposal {0} already executed")]
    AlreadyExecuted(u64),
    /// The signer already confirmed this proposal.
    #[error("proposal {0} already confirmed by this signer")]
    AlreadyConfirmed(u64),
    /// Neither the sender nor the target is sponsored.
    #[error("not sponsored")]
    NotSponsored,
    /// The payer's ledger deposit does not cover the operation.
    #[error("deposit too low: need {needed}, have {available}")]
    DepositTooLow {
        /// Deposit required to fund the operation.
        needed: U256,
        /// Deposit currently held.
        available: U256,
    },
    /// The price oracle reported an invalid reading.
    #[error("price oracle unavailable")]
    OracleUnavailable,
    /// The observed price does not qualify for liquidation.
    #[error("price {price} is not below trigger {trigger}")]
    PriceAboveTrigger {
        /// Price reported by the oracle.
        price: U256,
        /// Liquidation trigger price.
        trigger: U256,
    },
    /// Collaborator failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Rejections produced by the dispatcher before or while running an
/// operation. One operation's error never aborts its batch siblings.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The nonce is not the next expected sequence for `(sender, key)`.
    #[error("invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce {
        /// Sequence the dispatcher expected.
        expected: u64,
        /// Sequence the operation carried.
        actual: u64,
    },
    /// No account is registered for the sender.
    #[error("unknown sender: {0}")]
    UnknownSender(Address),
    /// No paymaster is registered at the referenced address.
    #[error("unknown paymaster: {0}")]
    UnknownPaymaster(Address),
    /// Self-funded operation with an insufficient sender deposit.
    #[error("insufficient deposit: need {needed}, have {available}")]
    InsufficientDeposit {
        /// Deposit required to fund the operation.
        needed: U256,
        /// Deposit currently held by the sender.
        available: U256,
    },
    /// The account or paymaster policy rejected the operation.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_messages_are_specific() {
        let err = PolicyError::ThresholdNotMet {
            approvals: 1,
            threshold: 2,
        };
        assert_eq!(err.to_string(), "threshold not met: 1 of 2 required approvals");

        let err = PolicyError::QuotaExceeded {
            requested: U256::from(5),
            remaining: U256::from(3),
        };
        assert_eq!(err.to_string(), "quota exceeded: requested 5 with 3 available");
    }

    #[test]
    fn dispatch_wraps_policy_transparently() {
        let err = DispatchError::from(PolicyError::AlreadyLiquidated);
        assert_eq!(err.to_string(), "already liquidated");
    }

    #[test]
    fn invalid_nonce_message() {
        let err = DispatchError::InvalidNonce {
            expected: 3,
            actual: 7,
        };
        assert_eq!(err.to_string(), "invalid nonce: expected 3, got 7");
    }
}
