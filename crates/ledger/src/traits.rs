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

//! Traits for the external collaborators the engine executes against.

use alloy_primitives::{Address, Bytes, B256, U256};
#[cfg(feature = "test-utils")]
use mockall::automock;

/// A call to be performed by the ledger on behalf of an account.
#[derive(Clone, Debug)]
pub struct LedgerCall {
    /// The account the value is drawn from.
    pub from: Address,
    /// The address to call.
    pub to: Address,
    /// Value to transfer.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
}

/// Outcome of a ledger call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// Data returned by the callee.
    pub return_data: Bytes,
    /// Gas consumed by the call.
    pub gas_used: u128,
}

/// The finalizing ledger the engine executes state changes against.
///
/// Signature verification is opaque: the engine never interprets key
/// material or schemes, it only asks whether a signature verifies.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait Ledger: std::fmt::Debug + Send + Sync {
    /// Verify `signature` by `signer` over `digest`.
    async fn verify_signature(
        &self,
        signer: Address,
        digest: B256,
        signature: &Bytes,
    ) -> anyhow::Result<bool>;

    /// Perform a value-bearing call. Execution failures are reported in
    /// the outcome, not as errors.
    async fn call(&self, call: LedgerCall) -> anyhow::Result<CallOutcome>;

    /// Balance of an address in the ledger's deposit accounting.
    async fn balance_of(&self, address: Address) -> anyhow::Result<U256>;

    /// Credit a deposit.
    async fn deposit_to(&self, address: Address, amount: U256) -> anyhow::Result<()>;

    /// Move deposited funds between two addresses.
    async fn transfer_deposit(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> anyhow::Result<()>;
}

/// A price reading pulled from an oracle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PriceReading {
    /// The observed price.
    pub price: U256,
    /// Whether the reading can be acted on. Callers must treat
    /// `is_valid == false` as "do not act".
    pub is_valid: bool,
}

/// A pull-based price feed.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait PriceOracle: Send + Sync {
    /// Pull the current price.
    async fn fetch_price(&self) -> anyhow::Result<PriceReading>;
}
