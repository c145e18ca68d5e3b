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

//! Rolling-window spending caps.

use std::time::Duration;

use alloy_primitives::U256;

use crate::{PolicyError, Timestamp};

/// Length of the rolling spending window.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A spending cap over a rolling 24-hour window.
///
/// The window does not tick on its own: the first spend attempted at or
/// after `window_start + 24h` resets the spent amount to zero and
/// restarts the window at that moment. After every accepted spend,
/// `used <= limit` holds within the current window.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DailyQuota {
    limit: U256,
    used: U256,
    window_start: Timestamp,
}

impl DailyQuota {
    /// Create a quota with the given limit, starting its window at `now`.
    pub fn new(limit: U256, now: Timestamp) -> Self {
        Self {
            limit,
            used: U256::ZERO,
            window_start: now,
        }
    }

    /// The configured window limit.
    pub fn limit(&self) -> U256 {
        self.limit
    }

    /// Amount spent in the window active at `now`.
    pub fn used(&self, now: Timestamp) -> U256 {
        if self.window_expired(now) {
            U256::ZERO
        } else {
            self.used
        }
    }

    /// Amount still spendable in the window active at `now`.
    pub fn remaining(&self, now: Timestamp) -> U256 {
        self.limit - self.used(now)
    }

    /// Reserve `amount` against the window active at `now`.
    ///
    /// Rolls the window first if it has lapsed, then fails with
    /// [`PolicyError::QuotaExceeded`] without recording anything if the
    /// amount does not fit.
    pub fn try_reserve(&mut self, amount: U256, now: Timestamp) -> Result<(), PolicyError> {
        self.roll(now);
        let remaining = self.limit - self.used;
        if amount > remaining {
            return Err(PolicyError::QuotaExceeded {
                requested: amount,
                remaining,
            });
        }
        self.used += amount;
        Ok(())
    }

    /// Release a previously reserved amount, e.g. after a failed call.
    pub fn refund(&mut self, amount: U256) {
        self.used = self.used.saturating_sub(amount);
    }

    fn window_expired(&self, now: Timestamp) -> bool {
        now >= self.window_start + QUOTA_WINDOW
    }

    fn roll(&mut self, now: Timestamp) {
        if self.window_expired(now) {
            self.used = U256::ZERO;
            self.window_start = now;
        }
    }
}
