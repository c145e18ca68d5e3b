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

//! Collaborator traits for the finalizing ledger and the price oracle,
//! plus the in-memory implementations used by tests and the CLI.

mod sim;
pub use sim::{SimLedger, SimOracle};

mod traits;
#[cfg(feature = "test-utils")]
pub use traits::{MockLedger, MockPriceOracle};
pub use traits::{CallOutcome, Ledger, LedgerCall, PriceOracle, PriceReading};
