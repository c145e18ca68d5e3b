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

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use warden_ledger::{CallOutcome, Ledger, LedgerCall};
use warden_types::{Operation, PolicyError};

use crate::{ensure_owner_or_dispatcher, AccountKind, AccountPolicy, Caller};

/// Single-owner account: an operation is permitted iff the owner signed
/// its hash.
pub struct SimpleAccount {
    address: Address,
    owner: Address,
    ledger: Arc<dyn Ledger>,
}

impl SimpleAccount {
    /// Create a single-owner account.
    pub fn new(address: Address, owner: Address, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            address,
            owner,
            ledger,
        }
    }

    /// The account owner.
    pub fn owner(&self) -> Address {
        self.owner
    }
}

#[async_trait::async_trait]
impl AccountPolicy for SimpleAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::Simple
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

#[cfg(test)]
mod tests {
    use warden_ledger::SimLedger;

    use super::*;

    fn account() -> (SimpleAccount, Arc<SimLedger>) {
        let ledger = Arc::new(SimLedger::new());
        let account = SimpleAccount::new(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(1),
            ledger.clone(),
        );
        (account, ledger)
    }

    #[tokio::test]
    async fn validates_owner_signature() {
        let (account, _) = account();
        let hash = B256::repeat_byte(7);
        let op = Operation {
            signature: SimLedger::sign(account.owner(), hash),
            ..Default::default()
        };
        account.validate(&op, hash).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_foreign_signature() {
        let (account, _) = account();
        let hash = B256::repeat_byte(7);
        let op = Operation {
            signature: SimLedger::sign(Address::repeat_byte(2), hash),
            ..Default::default()
        };
        let err = account.validate(&op, hash).await.unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSignature));
    }

    #[tokio::test]
    async fn owner_executes_directly() {
        let (account, ledger) = account();
        ledger.set_balance(account.address(), U256::from(100));
        let target = Address::repeat_byte(9);

        let outcome = account
            .execute(
                Caller::Direct(account.owner()),
                target,
                U256::from(30),
                Bytes::new(),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(ledger.balance_of(target).await.unwrap(), U256::from(30));
    }

    #[tokio::test]
    async fn stranger_cannot_execute() {
        let (account, _) = account();
        let err = account
            .execute(
                Caller::Direct(Address::repeat_byte(5)),
                Address::repeat_byte(9),
                U256::ZERO,
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Unauthorized(_)));
    }
}
