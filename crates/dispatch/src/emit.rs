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

use alloy_primitives::{Address, B256, U256};

/// Events broadcast by the dispatcher as it works through a batch.
#[derive(Clone, Debug)]
pub enum DispatchEvent {
    /// An operation entered the pipeline.
    OpReceived {
        /// Hash of the operation.
        op_hash: B256,
        /// Sender of the operation.
        sender: Address,
    },
    /// An operation was rejected before execution.
    OpRejected {
        /// Hash of the operation.
        op_hash: B256,
        /// Specific rejection reason.
        reason: String,
    },
    /// An operation was executed; `success` reflects the call outcome.
    OpExecuted {
        /// Hash of the operation.
        op_hash: B256,
        /// Whether the call succeeded.
        success: bool,
        /// Fee charged for the operation.
        gas_cost: U256,
    },
}
