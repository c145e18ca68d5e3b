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

//! The operation wire type and per-operation results.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Number of low bits of the packed nonce holding the sequence; the
/// remaining high bits select the nonce key.
const NONCE_SEQUENCE_BITS: usize = 64;

/// A signed intent to act on behalf of an account, submitted to the
/// dispatcher in a batch.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operation {
    /// The account this operation acts on behalf of.
    pub sender: Address,
    /// Packed nonce: the upper 192 bits select the nonce key, the low 64
    /// bits are the strictly increasing sequence within that key.
    pub nonce: U256,
    /// Constructor reference for counterfactual senders; carried and
    /// hashed, deployment itself goes through the factory.
    pub init_code: Bytes,
    /// Call target.
    pub target: Address,
    /// Value to transfer with the call.
    pub value: U256,
    /// Call payload.
    pub call_data: Bytes,
    /// Gas limit for the execution call.
    pub call_gas_limit: u128,
    /// Gas limit for validation.
    pub verification_gas_limit: u128,
    /// Gas paid up front, before any validation runs.
    pub pre_verification_gas: u128,
    /// Maximum total fee per gas unit the sender will pay.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee per gas unit.
    pub max_priority_fee_per_gas: u128,
    /// Fee sponsorship reference: empty for self-funded operations,
    /// otherwise the first 20 bytes are the paymaster address.
    pub paymaster_and_data: Bytes,
    /// Signature over the operation hash; interpretation is up to the
    /// sender's policy.
    pub signature: Bytes,
}

impl Operation {
    /// The nonce key: upper 192 bits of the packed nonce.
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> NONCE_SEQUENCE_BITS
    }

    /// The sequence within the nonce key: low 64 bits of the packed nonce.
    pub fn nonce_sequence(&self) -> u64 {
        self.nonce.as_limbs()[0]
    }

    /// The paymaster address referenced by `paymaster_and_data`, if any.
    pub fn paymaster(&self) -> Option<Address> {
        (self.paymaster_and_data.len() >= Address::len_bytes())
            .then(|| Address::from_slice(&self.paymaster_and_data[..Address::len_bytes()]))
    }

    /// Worst-case fee this operation can incur, used for funding checks.
    pub fn max_gas_cost(&self) -> U256 {
        let gas = self
            .call_gas_limit
            .saturating_add(self.verification_gas_limit)
            .saturating_add(self.pre_verification_gas);
        U256::from(gas) * U256::from(self.max_fee_per_gas)
    }

    /// Identity of this operation within its sender's nonce space.
    pub fn id(&self) -> OperationId {
        OperationId {
            sender: self.sender,
            nonce: self.nonce,
        }
    }

    /// Hash binding all non-signature fields to a dispatcher and chain.
    ///
    /// Variable-length fields enter through their own digests, so no two
    /// distinct field encodings can collide in the packed form.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let mut packed = Vec::with_capacity(256);
        packed.extend_from_slice(self.sender.as_slice());
        packed.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        packed.extend_from_slice(keccak256(&self.init_code).as_slice());
        packed.extend_from_slice(self.target.as_slice());
        packed.extend_from_slice(&self.value.to_be_bytes::<32>());
        packed.extend_from_slice(keccak256(&self.call_data).as_slice());
        packed.extend_from_slice(&self.call_gas_limit.to_be_bytes());
        packed.extend_from_slice(&self.verification_gas_limit.to_be_bytes());
        packed.extend_from_slice(&self.pre_verification_gas.to_be_bytes());
        packed.extend_from_slice(&self.max_fee_per_gas.to_be_bytes());
        packed.extend_from_slice(&self.max_priority_fee_per_gas.to_be_bytes());
        packed.extend_from_slice(keccak256(&self.paymaster_and_data).as_slice());
        let inner = keccak256(&packed);

        let mut outer = Vec::with_capacity(60);
        outer.extend_from_slice(inner.as_slice());
        outer.extend_from_slice(entry_point.as_slice());
        outer.extend_from_slice(&chain_id.to_be_bytes());
        keccak256(&outer)
    }
}

/// Unique identifier for an operation from a given sender.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OperationId {
    /// Sender of the operation.
    pub sender: Address,
    /// Packed nonce of the operation.
    pub nonce: U256,
}

/// Per-operation outcome surfaced by the dispatcher. One failed
/// operation never aborts its batch siblings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    /// Hash of the operation.
    pub op_hash: B256,
    /// Whether validation and execution both succeeded.
    pub success: bool,
    /// Specific rejection or revert reason, `None` on success.
    pub reason: Option<String>,
    /// Fee charged for the operation.
    pub gas_cost: U256,
}
