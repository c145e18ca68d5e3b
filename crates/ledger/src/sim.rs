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

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use anyhow::bail;
use parking_lot::RwLock;

use crate::{CallOutcome, Ledger, LedgerCall, PriceOracle, PriceReading};

/// Flat per-call gas charge.
const CALL_BASE_GAS: u128 = 21_000;
/// Flat per-byte gas charge on call data.
const CALL_BYTE_GAS: u128 = 16;

/// In-memory ledger used by tests and the CLI.
///
/// Balances live in a single deposit space. Signatures use a
/// deterministic digest scheme: a valid signature by `signer` over
/// `digest` is exactly `keccak256(signer ++ digest)`, producible with
/// [`SimLedger::sign`]. Gas metering is a flat model: a base charge plus
/// a per-byte charge on call data.
#[derive(Debug, Default)]
pub struct SimLedger {
    state: RwLock<SimState>,
}

#[derive(Debug, Default)]
struct SimState {
    balances: HashMap<Address, U256>,
}

impl SimLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the signature `verify_signature` accepts for
    /// `(signer, digest)`.
    pub fn sign(signer: Address, digest: B256) -> Bytes {
        let mut buf = Vec::with_capacity(52);
        buf.extend_from_slice(signer.as_slice());
        buf.extend_from_slice(digest.as_slice());
        Bytes::from(keccak256(&buf).to_vec())
    }

    /// Overwrite an address's balance.
    pub fn set_balance(&self, address: Address, amount: U256) {
        self.state.write().balances.insert(address, amount);
    }

    fn gas_for(data: &Bytes) -> u128 {
        CALL_BASE_GAS + CALL_BYTE_GAS * data.len() as u128
    }
}

#[async_trait::async_trait]
impl Ledger for SimLedger {
    async fn verify_signature(
        &self,
        signer: Address,
        digest: B256,
        signature: &Bytes,
    ) -> anyhow::Result<bool> {
        Ok(signature.as_ref() == Self::sign(signer, digest).as_ref())
    }

    async fn call(&self, call: LedgerCall) -> anyhow::Result<CallOutcome> {
        let gas_used = Self::gas_for(&call.data);
        let mut state = self.state.write();
        let from_balance = state.balances.get(&call.from).copied().unwrap_or_default();
        if call.value > from_balance {
            return Ok(CallOutcome {
                success: false,
                return_data: Bytes::new(),
                gas_used,
            });
        }
        state.balances.insert(call.from, from_balance - call.value);
        *state.balances.entry(call.to).or_default() += call.value;
        Ok(CallOutcome {
            success: true,
            return_data: Bytes::new(),
            gas_used,
        })
    }

    async fn balance_of(&self, address: Address) -> anyhow::Result<U256> {
        Ok(self
            .state
            .read()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn deposit_to(&self, address: Address, amount: U256) -> anyhow::Result<()> {
        *self.state.write().balances.entry(address).or_default() += amount;
        Ok(())
    }

    async fn transfer_deposit(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let from_balance = state.balances.get(&from).copied().unwrap_or_default();
        if amount > from_balance {
            bail!("insufficient deposit: {from} holds {from_balance}, needs {amount}");
        }
        state.balances.insert(from, from_balance - amount);
        *state.balances.entry(to).or_default() += amount;
        Ok(())
    }
}

/// In-memory price oracle with a settable reading.
#[derive(Debug)]
pub struct SimOracle {
    reading: RwLock<PriceReading>,
}

impl SimOracle {
    /// Create an oracle reporting a valid reading at `price`.
    pub fn new(price: U256) -> Self {
        Self {
            reading: RwLock::new(PriceReading {
                price,
                is_valid: true,
            }),
        }
    }

    /// Update the reported price.
    pub fn set_price(&self, price: U256) {
        self.reading.write().price = price;
    }

    /// Mark the feed valid or invalid.
    pub fn set_valid(&self, is_valid: bool) {
        self.reading.write().is_valid = is_valid;
    }
}

#[async_trait::async_trait]
impl PriceOracle for SimOracle {
    async fn fetch_price(&self) -> anyhow::Result<PriceReading> {
        Ok(*self.reading.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signature_scheme_round_trips() {
        let ledger = SimLedger::new();
        let signer = Address::repeat_byte(1);
        let digest = keccak256(b"payload");

        let sig = SimLedger::sign(signer, digest);
        assert!(ledger.verify_signature(signer, digest, &sig).await.unwrap());

        let other = Address::repeat_byte(2);
        assert!(!ledger.verify_signature(other, digest, &sig).await.unwrap());
        assert!(!ledger
            .verify_signature(signer, digest, &Bytes::from(vec![0u8; 32]))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn call_moves_value() {
        let ledger = SimLedger::new();
        let from = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        ledger.set_balance(from, U256::from(100));

        let outcome = ledger
            .call(LedgerCall {
                from,
                to,
                value: U256::from(40),
                data: Bytes::new(),
            })
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.gas_used, CALL_BASE_GAS);
        assert_eq!(ledger.balance_of(from).await.unwrap(), U256::from(60));
        assert_eq!(ledger.balance_of(to).await.unwrap(), U256::from(40));
    }

    #[tokio::test]
    async fn call_with_insufficient_balance_fails_without_moving_value() {
        let ledger = SimLedger::new();
        let from = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        ledger.set_balance(from, U256::from(10));

        let outcome = ledger
            .call(LedgerCall {
                from,
                to,
                value: U256::from(40),
                data: Bytes::new(),
            })
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(ledger.balance_of(from).await.unwrap(), U256::from(10));
        assert_eq!(ledger.balance_of(to).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn transfer_deposit_errors_when_underfunded() {
        let ledger = SimLedger::new();
        let from = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        ledger.set_balance(from, U256::from(10));

        ledger
            .transfer_deposit(from, to, U256::from(10))
            .await
            .unwrap();
        assert!(ledger
            .transfer_deposit(from, to, U256::from(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn oracle_reading_is_settable() {
        let oracle = SimOracle::new(U256::from(2_000));
        assert_eq!(
            oracle.fetch_price().await.unwrap(),
            PriceReading {
                price: U256::from(2_000),
                is_valid: true
            }
        );
        oracle.set_price(U256::from(1_599));
        oracle.set_valid(false);
        let reading = oracle.fetch_price().await.unwrap();
        assert_eq!(reading.price, U256::from(1_599));
        assert!(!reading.is_valid);
    }
}
