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

//! Account authorization policies, the factory that creates them, and
//! the registry the dispatcher resolves senders against.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use parse_display::Display;
use serde::{Deserialize, Serialize};
use strum::EnumString;
use warden_ledger::CallOutcome;
use warden_types::{Operation, PolicyError};

mod biometric;
pub use biometric::{BiometricAuthAccount, Device};

mod corporate;
pub use corporate::{CorporateConfig, CorporateRecoveryAccount, RECOVERY_COOLDOWN};

mod factory;
pub use factory::{AccountFactory, AccountParams, AccountRegistry};

mod insurance;
pub use insurance::{DeFiInsuranceAccount, TRIGGER_PERCENT};

mod multisig;
pub use multisig::{MultiSigAccount, MultiSigConfig};

mod proposals;
pub use proposals::{Proposal, ProposalStatus};

mod simple;
pub use simple::SimpleAccount;

mod social_recovery;
pub use social_recovery::SocialRecoveryAccount;

/// Who is invoking an account's execution surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Caller {
    /// The dispatcher, after a successful `validate`.
    Dispatcher,
    /// A direct caller identified by address.
    Direct(Address),
}

/// The policy variant of an account.
#[derive(
    Display, Debug, Clone, Copy, Eq, PartialEq, EnumString, Serialize, Deserialize,
)]
#[display(style = "camelCase")]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum AccountKind {
    /// Single-owner account
    Simple,
    /// Threshold multisig account
    MultiSig,
    /// Guardian-based social recovery account
    SocialRecovery,
    /// Corporate account with full signer-set recovery
    Corporate,
    /// Per-device daily-quota biometric account
    Biometric,
    /// Oracle-triggered insurance account
    Insurance,
}

/// Authorization policy of one account.
///
/// `validate` decides whether a dispatched operation is permitted and
/// never mutates spend state on failure; `execute` performs the call,
/// gated to the dispatcher or the account's manual/emergency callers.
#[async_trait::async_trait]
pub trait AccountPolicy: Send + Sync {
    /// The account's address.
    fn address(&self) -> Address;

    /// The policy variant.
    fn kind(&self) -> AccountKind;

    /// Check whether the operation is permitted.
    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError>;

    /// Perform a call on behalf of the account.
    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError>;
}

/// An account, tagged by policy variant.
///
/// Dispatch goes through [`AccountPolicy`]; the variant accessors give
/// workflow surfaces (proposals, recovery, devices) to direct callers.
#[derive(Clone)]
pub enum Account {
    /// Single-owner account
    Simple(Arc<SimpleAccount>),
    /// Threshold multisig account
    MultiSig(Arc<MultiSigAccount>),
    /// Guardian-based social recovery account
    SocialRecovery(Arc<SocialRecoveryAccount>),
    /// Corporate account with full signer-set recovery
    Corporate(Arc<CorporateRecoveryAccount>),
    /// Per-device daily-quota biometric account
    Biometric(Arc<BiometricAuthAccount>),
    /// Oracle-triggered insurance account
    Insurance(Arc<DeFiInsuranceAccount>),
}

impl Account {
    fn policy(&self) -> &dyn AccountPolicy {
        match self {
            Account::Simple(a) => a.as_ref(),
            Account::MultiSig(a) => a.as_ref(),
            Account::SocialRecovery(a) => a.as_ref(),
            Account::Corporate(a) => a.as_ref(),
            Account::Biometric(a) => a.as_ref(),
            Account::Insurance(a) => a.as_ref(),
        }
    }

    /// The underlying multisig account, if this is one.
    pub fn as_multi_sig(&self) -> Option<&Arc<MultiSigAccount>> {
        match self {
            Account::MultiSig(a) => Some(a),
            _ => None,
        }
    }

    /// The underlying social recovery account, if this is one.
    pub fn as_social_recovery(&self) -> Option<&Arc<SocialRecoveryAccount>> {
        match self {
            Account::SocialRecovery(a) => Some(a),
            _ => None,
        }
    }

    /// The underlying corporate account, if this is one.
    pub fn as_corporate(&self) -> Option<&Arc<CorporateRecoveryAccount>> {
        match self {
            Account::Corporate(a) => Some(a),
            _ => None,
        }
    }

    /// The underlying biometric account, if this is one.
    pub fn as_biometric(&self) -> Option<&Arc<BiometricAuthAccount>> {
        match self {
            Account::Biometric(a) => Some(a),
            _ => None,
        }
    }

    /// The underlying insurance account, if this is one.
    pub fn as_insurance(&self) -> Option<&Arc<DeFiInsuranceAccount>> {
        match self {
            Account::Insurance(a) => Some(a),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl AccountPolicy for Account {
    fn address(&self) -> Address {
        self.policy().address()
    }

    fn kind(&self) -> AccountKind {
        self.policy().kind()
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        self.policy().validate(op, op_hash).await
    }

    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        self.policy().execute(caller, target, value, data).await
    }
}

/// Gate an execution surface to the dispatcher or the account owner.
pub(crate) fn ensure_owner_or_dispatcher(
    caller: Caller,
    owner: Address,
) -> Result<(), PolicyError> {
    match caller {
        Caller::Dispatcher => Ok(()),
        Caller::Direct(address) if address == owner => Ok(()),
        Caller::Direct(address) => Err(PolicyError::Unauthorized(format!(
            "{address} is not the account owner"
        ))),
    }
}
