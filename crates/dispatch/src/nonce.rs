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

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use warden_types::DispatchError;

/// Per-`(sender, key)` sequence counters with compare-and-increment
/// consumption.
///
/// A sequence is valid only if it equals the stored counter;
/// consumption checks and increments under one lock, so two submissions
/// racing on the same sequence see exactly one winner.
#[derive(Debug, Default)]
pub struct NonceManager {
    nonces: Mutex<HashMap<(Address, U256), u64>>,
}

impl NonceManager {
    /// Create an empty manager; every counter starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next expected sequence for `(sender, key)`.
    pub fn get(&self, sender: Address, key: U256) -> u64 {
        self.nonces
            .lock()
            .get(&(sender, key))
            .copied()
            .unwrap_or_default()
    }

    /// Check that `sequence` is the next expected one, without consuming.
    pub fn check(&self, sender: Address, key: U256, sequence: u64) -> Result<(), DispatchError> {
        let expected = self.get(sender, key);
        if sequence != expected {
            return Err(DispatchError::InvalidNonce {
                expected,
                actual: sequence,
            });
        }
        Ok(())
    }

    /// Consume `sequence` atomically: it must still be the next expected
    /// one at this instant, and the counter advances before the lock is
    /// released.
    pub fn consume(&self, sender: Address, key: U256, sequence: u64) -> Result<(), DispatchError> {
        let mut nonces = self.nonces.lock();
        let counter = nonces.entry((sender, key)).or_default();
        if sequence != *counter {
            return Err(DispatchError::InvalidNonce {
                expected: *counter,
                actual: sequence,
            });
        }
        *counter += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn sequences_advance_one_at_a_time() {
        let nonces = NonceManager::new();
        let sender = Address::repeat_byte(1);
        let key = U256::ZERO;

        for sequence in 0..5 {
            nonces.check(sender, key, sequence).unwrap();
            nonces.consume(sender, key, sequence).unwrap();
        }
        assert_eq!(nonces.get(sender, key), 5);
    }

    #[test]
    fn consumed_sequence_is_rejected() {
        let nonces = NonceManager::new();
        let sender = Address::repeat_byte(1);
        let key = U256::ZERO;

        nonces.consume(sender, key, 0).unwrap();
        let err = nonces.consume(sender, key, 0).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidNonce {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn gaps_are_rejected() {
        let nonces = NonceManager::new();
        let sender = Address::repeat_byte(1);
        let err = nonces.consume(sender, U256::ZERO, 2).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidNonce {
                expected: 0,
                actual: 2
            }
        ));
    }

    #[test]
    fn keys_have_independent_counters() {
        let nonces = NonceManager::new();
        let sender = Address::repeat_byte(1);
        nonces.consume(sender, U256::ZERO, 0).unwrap();
        nonces.consume(sender, U256::from(1), 0).unwrap();
        assert_eq!(nonces.get(sender, U256::ZERO), 1);
        assert_eq!(nonces.get(sender, U256::from(1)), 1);
    }

    #[test]
    fn concurrent_racers_see_one_winner() {
        let nonces = Arc::new(NonceManager::new());
        let sender = Address::repeat_byte(1);
        let key = U256::ZERO;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let nonces = nonces.clone();
                std::thread::spawn(move || nonces.consume(sender, key, 0).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(nonces.get(sender, key), 1);
    }
}
