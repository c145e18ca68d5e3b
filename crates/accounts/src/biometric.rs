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

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use parking_lot::RwLock;
use warden_ledger::{CallOutcome, Ledger, LedgerCall};
use warden_types::{Clock, DailyQuota, Operation, PolicyError};

use crate::{ensure_owner_or_dispatcher, AccountKind, AccountPolicy, Caller};

/// Domain separator for device signing digests.
const DEVICE_DIGEST_DOMAIN: &[u8] = b"WARDEN_BIOMETRIC_V1";

/// Seconds per device-digest time bucket.
const HOUR_BUCKET_SECS: u64 = 3600;

/// A registered device with its own spending quota.
#[derive(Clone, Debug)]
pub struct Device {
    /// Address the device's signatures verify against.
    pub key: Address,
    /// Rolling daily spending quota.
    pub quota: DailyQuota,
    /// Whether the device may currently spend.
    pub active: bool,
}

/// Account operated by registered devices under per-device daily quotas.
///
/// Device spends go through [`BiometricAuthAccount::execute_biometric`]
/// and are bounded by the device's quota. The plain `execute` path is
/// the owner's emergency surface and bypasses device quotas entirely.
pub struct BiometricAuthAccount {
    address: Address,
    owner: Address,
    min_active_devices: usize,
    devices: RwLock<HashMap<String, Device>>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl BiometricAuthAccount {
    /// Create a biometric account with no devices.
    pub fn new(
        address: Address,
        owner: Address,
        min_active_devices: usize,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            owner,
            min_active_devices,
            devices: RwLock::new(HashMap::new()),
            ledger,
            clock,
        }
    }

    /// The account owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Snapshot of a device.
    pub fn device(&self, device_id: &str) -> Result<Device, PolicyError> {
        self.devices
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownDevice(device_id.to_string()))
    }

    /// Register a device. Owner-only; ids are unique.
    pub fn register_device(
        &self,
        caller: Address,
        device_id: &str,
        key: Address,
        daily_limit: U256,
    ) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        let mut devices = self.devices.write();
        if devices.contains_key(device_id) {
            return Err(PolicyError::DeviceExists(device_id.to_string()));
        }
        devices.insert(
            device_id.to_string(),
            Device {
                key,
                quota: DailyQuota::new(daily_limit, self.clock.now()),
                active: true,
            },
        );
        Ok(())
    }

    /// Deactivate a device. Blocked when it would drop the active count
    /// below the configured minimum.
    pub fn deactivate_device(&self, caller: Address, device_id: &str) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        let mut devices = self.devices.write();
        Self::ensure_removable(&devices, device_id, self.min_active_devices)?;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| PolicyError::UnknownDevice(device_id.to_string()))?;
        device.active = false;
        Ok(())
    }

    /// Reactivate a deactivated device.
    pub fn reactivate_device(&self, caller: Address, device_id: &str) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        let mut devices = self.devices.write();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| PolicyError::UnknownDevice(device_id.to_string()))?;
        device.active = true;
        Ok(())
    }

    /// Remove a device. Blocked when removing an active device would
    /// drop the active count below the configured minimum.
    pub fn remove_device(&self, caller: Address, device_id: &str) -> Result<(), PolicyError> {
        self.ensure_owner(caller)?;
        let mut devices = self.devices.write();
        if !devices.contains_key(device_id) {
            return Err(PolicyError::UnknownDevice(device_id.to_string()));
        }
        Self::ensure_removable(&devices, device_id, self.min_active_devices)?;
        devices.remove(device_id);
        Ok(())
    }

    /// The digest a device must sign to spend in the current hour.
    ///
    /// Domain-separated over the account, the device id, the hour
    /// bucket, and the call; a signature cannot be replayed for another
    /// device, account, hour or call.
    pub fn device_digest(
        &self,
        device_id: &str,
        hour_bucket: u64,
        target: Address,
        value: U256,
        data: &Bytes,
    ) -> B256 {
        let mut packed = Vec::with_capacity(160);
        packed.extend_from_slice(DEVICE_DIGEST_DOMAIN);
        packed.extend_from_slice(self.address.as_slice());
        packed.extend_from_slice(keccak256(device_id.as_bytes()).as_slice());
        packed.extend_from_slice(&hour_bucket.to_be_bytes());
        packed.extend_from_slice(target.as_slice());
        packed.extend_from_slice(&value.to_be_bytes::<32>());
        packed.extend_from_slice(keccak256(data).as_slice());
        keccak256(&packed)
    }

    /// The hour bucket device digests currently bind to.
    pub fn current_hour_bucket(&self) -> u64 {
        self.clock.now().seconds_since_epoch() / HOUR_BUCKET_SECS
    }

    /// Spend from a device: the device must be active, the value must
    /// fit its quota, and the signature must verify against the
    /// current-hour digest.
    ///
    /// The quota is reserved before the call and released if the call
    /// fails; a rejected spend never touches it.
    pub async fn execute_biometric(
        &self,
        device_id: &str,
        target: Address,
        value: U256,
        data: Bytes,
        device_signature: &Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        let key = {
            let devices = self.devices.read();
            let device = devices
                .get(device_id)
                .ok_or_else(|| PolicyError::UnknownDevice(device_id.to_string()))?;
            if !device.active {
                return Err(PolicyError::DeviceInactive(device_id.to_string()));
            }
            device.key
        };

        let digest =
            self.device_digest(device_id, self.current_hour_bucket(), target, value, &data);
        if !self
            .ledger
            .verify_signature(key, digest, device_signature)
            .await?
        {
            return Err(PolicyError::InvalidSignature);
        }

        {
            let now = self.clock.now();
            let mut devices = self.devices.write();
            let device = devices
                .get_mut(device_id)
                .ok_or_else(|| PolicyError::UnknownDevice(device_id.to_string()))?;
            if !device.active {
                return Err(PolicyError::DeviceInactive(device_id.to_string()));
            }
            device.quota.try_reserve(value, now)?;
        }

        let result = self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: target,
                value,
                data,
            })
            .await;

        match result {
            Ok(outcome) if outcome.success => Ok(outcome),
            Ok(outcome) => {
                self.refund(device_id, value);
                Ok(outcome)
            }
            Err(err) => {
                self.refund(device_id, value);
                Err(err.into())
            }
        }
    }

    fn refund(&self, device_id: &str, value: U256) {
        if let Some(device) = self.devices.write().get_mut(device_id) {
            device.quota.refund(value);
        }
    }

    fn ensure_owner(&self, caller: Address) -> Result<(), PolicyError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(PolicyError::Unauthorized(format!(
                "{caller} is not the account owner"
            )))
        }
    }

    fn ensure_removable(
        devices: &HashMap<String, Device>,
        device_id: &str,
        minimum: usize,
    ) -> Result<(), PolicyError> {
        let is_active = devices.get(device_id).is_some_and(|d| d.active);
        if !is_active {
            return Ok(());
        }
        let active = devices.values().filter(|d| d.active).count();
        if active <= minimum {
            return Err(PolicyError::MinimumDevices { minimum });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountPolicy for BiometricAuthAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::Biometric
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        if self
            .ledger
            .verify_signature(self.owner, op_hash, &op.signature)
            .await?
        {
            Ok(())
        } else {
            Err(PolicyError::InvalidSignature)
        }
    }

    // Emergency path: no device, no quota.
    async fn execute(
        &self,
        caller: Caller,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<CallOutcome, PolicyError> {
        ensure_owner_or_dispatcher(caller, self.owner)?;
        Ok(self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: target,
                value,
                data,
            })
            .await?)
    }
}
