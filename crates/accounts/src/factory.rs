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

//! Deterministic account creation and the registry of live accounts.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy_primitives::{keccak256, Address, B256, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use warden_ledger::{Ledger, PriceOracle};
use warden_types::{math::uint_percent, Clock, PolicyError};

use crate::{
    insurance::TRIGGER_PERCENT, Account, AccountKind, AccountPolicy, BiometricAuthAccount,
    CorporateConfig, CorporateRecoveryAccount, DeFiInsuranceAccount, MultiSigAccount,
    MultiSigConfig, SimpleAccount, SocialRecoveryAccount,
};

/// Registry of live accounts, resolved by address.
///
/// An explicit context object handed to the factory and the dispatcher,
/// so independent engines never share state.
#[derive(Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<Address, Account>>,
}

impl AccountRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an account by address.
    pub fn get(&self, address: Address) -> Option<Account> {
        self.accounts.read().get(&address).cloned()
    }

    /// Whether an account is registered at `address`.
    pub fn contains(&self, address: Address) -> bool {
        self.accounts.read().contains_key(&address)
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    fn insert(&self, account: Account) {
        self.accounts.write().insert(account.address(), account);
    }
}

/// Constructor parameters for each account variant.
///
/// The encoding of the parameters, together with a salt, fully
/// determines the created account's address.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccountParams {
    /// Single-owner account
    #[serde(rename_all = "camelCase")]
    Simple {
        /// The owner address.
        owner: Address,
    },
    /// Threshold multisig account
    #[serde(rename_all = "camelCase")]
    MultiSig {
        /// Signing addresses, duplicate-free.
        signers: Vec<Address>,
        /// Confirmations required on the proposal path.
        threshold: usize,
        /// Rolling 24-hour spending limit.
        daily_limit: U256,
        /// Per-transaction spending limit.
        tx_limit: U256,
        /// Proposal time-to-live in seconds.
        proposal_ttl_secs: u64,
    },
    /// Guardian-based social recovery account
    #[serde(rename_all = "camelCase")]
    SocialRecovery {
        /// The owner address.
        owner: Address,
        /// Guardian addresses, duplicate-free.
        guardians: Vec<Address>,
        /// Guardian approvals required to recover.
        threshold: usize,
        /// Recovery delay in seconds.
        delay_secs: u64,
    },
    /// Corporate account with full signer-set recovery
    #[serde(rename_all = "camelCase")]
    Corporate {
        /// Signing addresses, duplicate-free, at least three.
        signers: Vec<Address>,
        /// Confirmations required on the proposal path and for recovery.
        threshold: usize,
        /// Rolling 24-hour spending limit.
        daily_limit: U256,
        /// Per-transaction spending limit.
        tx_limit: U256,
        /// Proposal time-to-live in seconds.
        proposal_ttl_secs: u64,
    },
    /// Per-device daily-quota biometric account
    #[serde(rename_all = "camelCase")]
    Biometric {
        /// The owner address.
        owner: Address,
        /// Minimum number of active devices once registered.
        min_active_devices: usize,
    },
    /// Oracle-triggered insurance account
    #[serde(rename_all = "camelCase")]
    Insurance {
        /// The owner address.
        owner: Address,
        /// Where a liquidation sweeps the funds.
        rescue_destination: Address,
    },
}

impl AccountParams {
    /// The variant these parameters construct.
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountParams::Simple { .. } => AccountKind::Simple,
            AccountParams::MultiSig { .. } => AccountKind::MultiSig,
            AccountParams::SocialRecovery { .. } => AccountKind::SocialRecovery,
            AccountParams::Corporate { .. } => AccountKind::Corporate,
            AccountParams::Biometric { .. } => AccountKind::Biometric,
            AccountParams::Insurance { .. } => AccountKind::Insurance,
        }
    }

    /// Deterministic packed encoding used for address derivation.
    fn encode(&self) -> Vec<u8> {
        fn push_addresses(buf: &mut Vec<u8>, addresses: &[Address]) {
            buf.extend_from_slice(&(addresses.len() as u64).to_be_bytes());
            for address in addresses {
                buf.extend_from_slice(address.as_slice());
            }
        }

        let mut buf = Vec::with_capacity(128);
        match self {
            AccountParams::Simple { owner } => {
                buf.push(0);
                buf.extend_from_slice(owner.as_slice());
            }
            AccountParams::MultiSig {
                signers,
                threshold,
                daily_limit,
                tx_limit,
                proposal_ttl_secs,
            } => {
                buf.push(1);
                push_addresses(&mut buf, signers);
                buf.extend_from_slice(&(*threshold as u64).to_be_bytes());
                buf.extend_from_slice(&daily_limit.to_be_bytes::<32>());
                buf.extend_from_slice(&tx_limit.to_be_bytes::<32>());
                buf.extend_from_slice(&proposal_ttl_secs.to_be_bytes());
            }
            AccountParams::SocialRecovery {
                owner,
                guardians,
                threshold,
                delay_secs,
            } => {
                buf.push(2);
                buf.extend_from_slice(owner.as_slice());
                push_addresses(&mut buf, guardians);
                buf.extend_from_slice(&(*threshold as u64).to_be_bytes());
                buf.extend_from_slice(&delay_secs.to_be_bytes());
            }
            AccountParams::Corporate {
                signers,
                threshold,
                daily_limit,
                tx_limit,
                proposal_ttl_secs,
            } => {
                buf.push(3);
                push_addresses(&mut buf, signers);
                buf.extend_from_slice(&(*threshold as u64).to_be_bytes());
                buf.extend_from_slice(&daily_limit.to_be_bytes::<32>());
                buf.extend_from_slice(&tx_limit.to_be_bytes::<32>());
                buf.extend_from_slice(&proposal_ttl_secs.to_be_bytes());
            }
            AccountParams::Biometric {
                owner,
                min_active_devices,
            } => {
                buf.push(4);
                buf.extend_from_slice(owner.as_slice());
                buf.extend_from_slice(&(*min_active_devices as u64).to_be_bytes());
            }
            AccountParams::Insurance {
                owner,
                rescue_destination,
            } => {
                buf.push(5);
                buf.extend_from_slice(owner.as_slice());
                buf.extend_from_slice(rescue_destination.as_slice());
            }
        }
        buf
    }
}

/// Creates accounts at deterministic addresses, exactly once per
/// `(params, salt)` pair.
pub struct AccountFactory {
    address: Address,
    registry: Arc<AccountRegistry>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn PriceOracle>,
}

impl AccountFactory {
    /// Create a factory registering accounts into `registry`.
    pub fn new(
        address: Address,
        registry: Arc<AccountRegistry>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            address,
            registry,
            ledger,
            clock,
            oracle,
        }
    }

    /// Derive the address `(params, salt)` creates. Pure: no lookups,
    /// no side effects.
    pub fn get_address(&self, params: &AccountParams, salt: B256) -> Address {
        let mut buf = Vec::with_capacity(85);
        buf.push(0xff);
        buf.extend_from_slice(self.address.as_slice());
        buf.extend_from_slice(salt.as_slice());
        buf.extend_from_slice(keccak256(params.encode()).as_slice());
        Address::from_slice(&keccak256(&buf)[12..])
    }

    /// Create and register the account for `(params, salt)`.
    ///
    /// Idempotent: if the derived address is already registered, it is
    /// returned untouched. Configuration errors fail here and register
    /// nothing.
    pub async fn create_account(
        &self,
        params: AccountParams,
        salt: B256,
    ) -> Result<Address, PolicyError> {
        let address = self.get_address(&params, salt);
        if self.registry.contains(address) {
            return Ok(address);
        }
        let kind = params.kind();
        let account = self.build(address, params).await?;
        self.registry.insert(account);
        info!(%address, %kind, "account created");
        Ok(address)
    }

    async fn build(&self, address: Address, params: AccountParams) -> Result<Account, PolicyError> {
        let account = match params {
            AccountParams::Simple { owner } => Account::Simple(Arc::new(SimpleAccount::new(
                address,
                owner,
                self.ledger.clone(),
            ))),
            AccountParams::MultiSig {
                signers,
                threshold,
                daily_limit,
                tx_limit,
                proposal_ttl_secs,
            } => Account::MultiSig(Arc::new(MultiSigAccount::new(
                address,
                MultiSigConfig {
                    signers,
                    threshold,
                    daily_limit,
                    tx_limit,
                    proposal_ttl: Duration::from_secs(proposal_ttl_secs),
                },
                self.ledger.clone(),
                self.clock.clone(),
            )?)),
            AccountParams::SocialRecovery {
                owner,
                guardians,
                threshold,
                delay_secs,
            } => Account::SocialRecovery(Arc::new(SocialRecoveryAccount::new(
                address,
                owner,
                guardians,
                threshold,
                Duration::from_secs(delay_secs),
                self.ledger.clone(),
                self.clock.clone(),
            )?)),
            AccountParams::Corporate {
                signers,
                threshold,
                daily_limit,
                tx_limit,
                proposal_ttl_secs,
            } => Account::Corporate(Arc::new(CorporateRecoveryAccount::new(
                address,
                CorporateConfig {
                    signers,
                    threshold,
                    daily_limit,
                    tx_limit,
                    proposal_ttl: Duration::from_secs(proposal_ttl_secs),
                },
                self.ledger.clone(),
                self.clock.clone(),
            )?)),
            AccountParams::Biometric {
                owner,
                min_active_devices,
            } => Account::Biometric(Arc::new(BiometricAuthAccount::new(
                address,
                owner,
                min_active_devices,
                self.ledger.clone(),
                self.clock.clone(),
            ))),
            AccountParams::Insurance {
                owner,
                rescue_destination,
            } => {
                let reading = self.oracle.fetch_price().await?;
                if !reading.is_valid {
                    return Err(PolicyError::OracleUnavailable);
                }
                let trigger_price = uint_percent(reading.price, TRIGGER_PERCENT);
                Account::Insurance(Arc::new(DeFiInsuranceAccount::new(
                    address,
                    owner,
                    rescue_destination,
                    trigger_price,
                    self.oracle.clone(),
                    self.ledger.clone(),
                )))
            }
        };
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use warden_ledger::{SimLedger, SimOracle};
    use warden_types::{SimClock, Timestamp};

    use super::*;

    fn factory() -> (AccountFactory, Arc<AccountRegistry>, Arc<SimOracle>) {
        let registry = Arc::new(AccountRegistry::new());
        let oracle = Arc::new(SimOracle::new(U256::from(2_000)));
        let factory = AccountFactory::new(
            Address::repeat_byte(0xfa),
            registry.clone(),
            Arc::new(SimLedger::new()),
            Arc::new(SimClock::new(Timestamp::new(1_000))),
            oracle.clone(),
        );
        (factory, registry, oracle)
    }

    fn simple_params(owner_byte: u8) -> AccountParams {
        AccountParams::Simple {
            owner: Address::repeat_byte(owner_byte),
        }
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let (factory, _, _) = factory();
        let salt = B256::repeat_byte(1);
        let a = factory.get_address(&simple_params(1), salt);
        let b = factory.get_address(&simple_params(1), salt);
        assert_eq!(a, b);

        // any input change moves the address
        assert_ne!(factory.get_address(&simple_params(2), salt), a);
        assert_ne!(
            factory.get_address(&simple_params(1), B256::repeat_byte(2)),
            a
        );
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (factory, registry, _) = factory();
        let salt = B256::repeat_byte(1);
        let first = factory
            .create_account(simple_params(1), salt)
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);

        let second = factory
            .create_account(simple_params(1), salt)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn bad_configuration_fails_at_creation() {
        let (factory, registry, _) = factory();
        let err = factory
            .create_account(
                AccountParams::MultiSig {
                    signers: vec![Address::repeat_byte(1), Address::repeat_byte(1)],
                    threshold: 2,
                    daily_limit: U256::from(1u64),
                    tx_limit: U256::from(1u64),
                    proposal_ttl_secs: 3600,
                },
                B256::ZERO,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignerSet(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn insurance_trigger_fixed_at_creation() {
        let (factory, registry, oracle) = factory();
        let address = factory
            .create_account(
                AccountParams::Insurance {
                    owner: Address::repeat_byte(1),
                    rescue_destination: Address::repeat_byte(2),
                },
                B256::ZERO,
            )
            .await
            .unwrap();
        let account = registry.get(address).unwrap();
        let insurance = account.as_insurance().unwrap();
        assert_eq!(insurance.trigger_price(), U256::from(1_600));

        // later price moves don't shift the trigger
        oracle.set_price(U256::from(99));
        assert_eq!(insurance.trigger_price(), U256::from(1_600));
    }

    #[tokio::test]
    async fn insurance_creation_fails_on_invalid_oracle() {
        let (factory, registry, oracle) = factory();
        oracle.set_valid(false);
        let err = factory
            .create_account(
                AccountParams::Insurance {
                    owner: Address::repeat_byte(1),
                    rescue_destination: Address::repeat_byte(2),
                },
                B256::ZERO,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::OracleUnavailable));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn created_account_kind_matches_params() {
        let (factory, registry, _) = factory();
        let address = factory
            .create_account(
                AccountParams::Biometric {
                    owner: Address::repeat_byte(1),
                    min_active_devices: 2,
                },
                B256::ZERO,
            )
            .await
            .unwrap();
        assert_eq!(registry.get(address).unwrap().kind(), AccountKind::Biometric);
    }
}
