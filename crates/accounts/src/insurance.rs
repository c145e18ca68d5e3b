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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::info;
use warden_ledger::{CallOutcome, Ledger, LedgerCall, PriceOracle};
use warden_types::{Operation, PolicyError};

use crate::{ensure_owner_or_dispatcher, AccountKind, AccountPolicy, Caller};

/// Liquidation triggers below this percentage of the creation-time price.
pub const TRIGGER_PERCENT: u32 = 80;

/// Account that sweeps its funds to a rescue destination when the
/// observed price drops strictly below the trigger.
///
/// The trigger is fixed at creation as 80% of the price observed then.
/// Liquidation is one-shot: the `liquidated` flag moves false to true
/// exactly once and is never reset, and every mutating surface is dead
/// afterwards.
pub struct DeFiInsuranceAccount {
    address: Address,
    owner: Address,
    rescue_destination: Address,
    trigger_price: U256,
    liquidated: AtomicBool,
    oracle: Arc<dyn PriceOracle>,
    ledger: Arc<dyn Ledger>,
}

impl DeFiInsuranceAccount {
    /// Create an insurance account with a precomputed trigger price.
    pub fn new(
        address: Address,
        owner: Address,
        rescue_destination: Address,
        trigger_price: U256,
        oracle: Arc<dyn PriceOracle>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            address,
            owner,
            rescue_destination,
            trigger_price,
            liquidated: AtomicBool::new(false),
            oracle,
            ledger,
        }
    }

    /// The account owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Where a liquidation sweeps the funds.
    pub fn rescue_destination(&self) -> Address {
        self.rescue_destination
    }

    /// The fixed liquidation trigger price.
    pub fn trigger_price(&self) -> U256 {
        self.trigger_price
    }

    /// Whether the account has been liquidated.
    pub fn is_liquidated(&self) -> bool {
        self.liquidated.load(Ordering::SeqCst)
    }

    /// Read the oracle and report whether liquidation would trigger,
    /// along with the observed price.
    ///
    /// Strict inequality: a price exactly at the trigger does not
    /// qualify, and an invalid reading never does.
    pub async fn can_be_liquidated(&self) -> Result<(bool, U256), PolicyError> {
        let reading = self.oracle.fetch_price().await?;
        if !reading.is_valid {
            return Ok((false, reading.price));
        }
        Ok((reading.price < self.trigger_price, reading.price))
    }

    /// Sweep the full balance to the rescue destination, once.
    pub async fn execute_liquidation(&self, caller: Caller) -> Result<CallOutcome, PolicyError> {
        ensure_owner_or_dispatcher(caller, self.owner)?;
        if self.is_liquidated() {
            return Err(PolicyError::AlreadyLiquidated);
        }

        let reading = self.oracle.fetch_price().await?;
        if !reading.is_valid {
            return Err(PolicyError::OracleUnavailable);
        }
        if reading.price >= self.trigger_price {
            return Err(PolicyError::PriceAboveTrigger {
                price: reading.price,
                trigger: self.trigger_price,
            });
        }

        // claim the one-shot flag before touching funds; it never resets
        if self
            .liquidated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PolicyError::AlreadyLiquidated);
        }

        let balance = self.ledger.balance_of(self.address).await?;
        let outcome = self
            .ledger
            .call(LedgerCall {
                from: self.address,
                to: self.rescue_destination,
                value: balance,
                data: Bytes::new(),
            })
            .await?;
        info!(
            account = %self.address,
            destination = %self.rescue_destination,
            %balance,
            price = %reading.price,
            "account liquidated"
        );
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl AccountPolicy for DeFiInsuranceAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> AccountKind {
        AccountKind::Insurance
    }

    async fn validate(&self, op: &Operation, op_hash: B256) -> Result<(), PolicyError> {
        if self.is_liquidated() {
            return Err(PolicyError::AlreadyLiquidated);
        }
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
        if self.is_liquidated() {
            return Err(PolicyError::AlreadyLiquidated);
        }
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
    use warden_ledger::{SimLedger, SimOracle};
    use warden_types::math::uint_percent;

    use super::*;

    fn setup(creation_price: u64) -> (DeFiInsuranceAccount, Arc<SimLedger>, Arc<SimOracle>) {
        let ledger = Arc::new(SimLedger::new());
        let oracle = Arc::new(SimOracle::new(U256::from(creation_price)));
        let account = DeFiInsuranceAccount::new(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(1),
            Address::repeat_byte(0xbb),
            uint_percent(U256::from(creation_price), TRIGGER_PERCENT),
            oracle.clone(),
            ledger.clone(),
        );
        (account, ledger, oracle)
    }

    #[tokio::test]
    async fn trigger_comparison_is_strict() {
        let (account, _, oracle) = setup(2_000);
        assert_eq!(account.trigger_price(), U256::from(1_600));

        oracle.set_price(U256::from(1_601));
        assert_eq!(
            account.can_be_liquidated().await.unwrap(),
            (false, U256::from(1_601))
        );

        oracle.set_price(U256::from(1_600));
        assert_eq!(
            account.can_be_liquidated().await.unwrap(),
            (false, U256::from(1_600))
        );

        oracle.set_price(U256::from(1_599));
        assert_eq!(
            account.can_be_liquidated().await.unwrap(),
            (true, U256::from(1_599))
        );
    }

    #[tokio::test]
    async fn invalid_reading_never_liquidates() {
        let (account, _, oracle) = setup(2_000);
        oracle.set_price(U256::from(1));
        oracle.set_valid(false);
        assert_eq!(
            account.can_be_liquidated().await.unwrap(),
            (false, U256::from(1))
        );
        let err = account
            .execute_liquidation(Caller::Direct(account.owner()))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::OracleUnavailable));
    }

    #[tokio::test]
    async fn liquidation_sweeps_once() {
        let (account, ledger, oracle) = setup(2_000);
        ledger.set_balance(account.address(), U256::from(5_000));
        oracle.set_price(U256::from(1_599));

        let outcome = account
            .execute_liquidation(Caller::Direct(account.owner()))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            ledger.balance_of(account.rescue_destination()).await.unwrap(),
            U256::from(5_000)
        );
        assert_eq!(
            ledger.balance_of(account.address()).await.unwrap(),
            U256::ZERO
        );

        let err = account
            .execute_liquidation(Caller::Direct(account.owner()))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::AlreadyLiquidated));
    }

    #[tokio::test]
    async fn price_at_or_above_trigger_blocks_liquidation() {
        let (account, _, oracle) = setup(2_000);
        oracle.set_price(U256::from(1_600));
        let err = account
            .execute_liquidation(Caller::Direct(account.owner()))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::PriceAboveTrigger { .. }));
        assert!(!account.is_liquidated());
    }

    #[tokio::test]
    async fn mutating_surfaces_die_after_liquidation() {
        let (account, ledger, oracle) = setup(2_000);
        ledger.set_balance(account.address(), U256::from(100));
        oracle.set_price(U256::from(1_000));
        account
            .execute_liquidation(Caller::Dispatcher)
            .await
            .unwrap();

        let err = account
            .execute(
                Caller::Direct(account.owner()),
                Address::repeat_byte(9),
                U256::ZERO,
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::AlreadyLiquidated));

        let op = Operation::default();
        let err = account.validate(&op, B256::ZERO).await.unwrap_err();
        assert!(matches!(err, PolicyError::AlreadyLiquidated));

        // reads still answer
        assert!(account.is_liquidated());
        assert!(account.can_be_liquidated().await.is_ok());
    }

    #[tokio::test]
    async fn only_owner_or_dispatcher_may_liquidate() {
        let (account, _, oracle) = setup(2_000);
        oracle.set_price(U256::from(1_000));
        let err = account
            .execute_liquidation(Caller::Direct(Address::repeat_byte(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Unauthorized(_)));
    }
}
