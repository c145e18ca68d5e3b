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

//! End-to-end dispatch scenarios over the sim ledger.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use warden_accounts::{AccountFactory, AccountParams, AccountRegistry};
use warden_dispatch::EntryPoint;
use warden_ledger::{Ledger, SimLedger, SimOracle};
use warden_paymaster::{PaymasterConfig, PaymasterRegistry, SponsoringPaymaster};
use warden_types::{Operation, SimClock, Timestamp};

const MAX_COST: u64 = 36_000; // (10k + 5k + 21k) gas at fee 1

struct Engine {
    ledger: Arc<SimLedger>,
    clock: Arc<SimClock>,
    oracle: Arc<SimOracle>,
    accounts: Arc<AccountRegistry>,
    paymasters: Arc<PaymasterRegistry>,
    factory: AccountFactory,
    entry_point: EntryPoint,
}

fn engine() -> Engine {
    let ledger = Arc::new(SimLedger::new());
    let clock = Arc::new(SimClock::new(Timestamp::new(1_700_000_000)));
    let oracle = Arc::new(SimOracle::new(U256::from(2_000)));
    let accounts = Arc::new(AccountRegistry::new());
    let paymasters = Arc::new(PaymasterRegistry::new());
    let factory = AccountFactory::new(
        Address::repeat_byte(0xfa),
        accounts.clone(),
        ledger.clone(),
        clock.clone(),
        oracle.clone(),
    );
    let entry_point = EntryPoint::new(
        Address::repeat_byte(0xee),
        31_337,
        accounts.clone(),
        paymasters.clone(),
        ledger.clone(),
    );
    Engine {
        ledger,
        clock,
        oracle,
        accounts,
        paymasters,
        factory,
        entry_point,
    }
}

fn owner() -> Address {
    Address::repeat_byte(1)
}

fn beneficiary() -> Address {
    Address::repeat_byte(0xbe)
}

async fn simple_account(engine: &Engine, balance: u64) -> Address {
    let address = engine
        .factory
        .create_account(AccountParams::Simple { owner: owner() }, B256::ZERO)
        .await
        .unwrap();
    engine.ledger.set_balance(address, U256::from(balance));
    address
}

fn signed_op(
    entry_point: &EntryPoint,
    sender: Address,
    signer: Address,
    sequence: u64,
    target: Address,
    value: U256,
) -> Operation {
    let mut op = Operation {
        sender,
        nonce: U256::from(sequence),
        target,
        value,
        call_gas_limit: 10_000,
        verification_gas_limit: 5_000,
        pre_verification_gas: 21_000,
        max_fee_per_gas: 1,
        ..Default::default()
    };
    op.signature = SimLedger::sign(signer, entry_point.op_hash(&op));
    op
}

#[tokio::test]
async fn nonces_are_monotonic_and_replay_is_rejected() {
    let engine = engine();
    let sender = simple_account(&engine, 10_000_000).await;
    let target = Address::repeat_byte(9);

    let ops: Vec<_> = (0..3)
        .map(|seq| signed_op(&engine.entry_point, sender, owner(), seq, target, U256::from(10)))
        .collect();
    let results = engine.entry_point.handle_ops(ops, beneficiary()).await;
    assert!(results.iter().all(|r| r.success));
    assert_eq!(engine.entry_point.get_nonce(sender, U256::ZERO), 3);

    // any consumed sequence is dead
    let replay = signed_op(&engine.entry_point, sender, owner(), 1, target, U256::from(10));
    let results = engine
        .entry_point
        .handle_ops(vec![replay], beneficiary())
        .await;
    assert!(!results[0].success);
    assert_eq!(
        results[0].reason.as_deref(),
        Some("invalid nonce: expected 3, got 1")
    );
    assert_eq!(engine.entry_point.get_nonce(sender, U256::ZERO), 3);
}

#[tokio::test]
async fn one_bad_op_never_aborts_its_siblings() {
    let engine = engine();
    let sender = simple_account(&engine, 10_000_000).await;
    let target = Address::repeat_byte(9);

    let good0 = signed_op(&engine.entry_point, sender, owner(), 0, target, U256::from(10));
    // signed by a stranger
    let bad = signed_op(
        &engine.entry_point,
        sender,
        Address::repeat_byte(0x66),
        1,
        target,
        U256::from(10),
    );
    let good1 = signed_op(&engine.entry_point, sender, owner(), 1, target, U256::from(10));

    let results = engine
        .entry_point
        .handle_ops(vec![good0, bad, good1], beneficiary())
        .await;
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].reason.as_deref(), Some("invalid signature"));
    // the rejected op left its nonce unconsumed, so the third op's
    // sequence 1 was still fresh
    assert!(results[2].success);
}

#[tokio::test]
async fn unknown_sender_is_reported_per_op() {
    let engine = engine();
    let ghost = Address::repeat_byte(0x77);
    let op = signed_op(
        &engine.entry_point,
        ghost,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(!results[0].success);
    assert!(results[0]
        .reason
        .as_deref()
        .unwrap()
        .starts_with("unknown sender"));
}

#[tokio::test]
async fn self_funded_op_requires_a_deposit() {
    let engine = engine();
    // balance below the 36k max cost
    let sender = simple_account(&engine, 1_000).await;
    let op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(!results[0].success);
    assert!(results[0]
        .reason
        .as_deref()
        .unwrap()
        .starts_with("insufficient deposit"));
    // rejected before the nonce was touched
    assert_eq!(engine.entry_point.get_nonce(sender, U256::ZERO), 0);
}

#[tokio::test]
async fn fees_move_from_sender_to_beneficiary() {
    let engine = engine();
    let sender = simple_account(&engine, 10_000_000).await;
    let op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(results[0].success);
    assert!(results[0].gas_cost > U256::ZERO);
    assert!(results[0].gas_cost <= U256::from(MAX_COST));
    assert_eq!(
        engine.ledger.balance_of(beneficiary()).await.unwrap(),
        results[0].gas_cost
    );
}

#[tokio::test]
async fn execution_revert_consumes_the_nonce() {
    let engine = engine();
    // enough for fees, not enough for the transfer below
    let sender = simple_account(&engine, 50_000).await;
    let op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::from(1_000_000),
    );
    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(!results[0].success);
    assert_eq!(results[0].reason.as_deref(), Some("execution reverted"));
    // replay protection outlives the failed execution
    assert_eq!(engine.entry_point.get_nonce(sender, U256::ZERO), 1);
    // the failed attempt still paid its fee
    assert!(results[0].gas_cost > U256::ZERO);
}

#[tokio::test]
async fn sponsored_op_charges_the_paymaster() {
    let engine = engine();
    let sender = simple_account(&engine, 0).await;
    let paymaster_owner = Address::repeat_byte(0x0f);
    let paymaster = Arc::new(SponsoringPaymaster::new(
        Address::repeat_byte(0xcc),
        paymaster_owner,
        PaymasterConfig {
            daily_limit: U256::from(1_000_000u64),
            tx_limit: U256::from(100_000u64),
        },
        engine.ledger.clone(),
        engine.clock.clone(),
    ));
    engine
        .ledger
        .set_balance(paymaster.address(), U256::from(500_000u64));
    paymaster.sponsor(paymaster_owner, sender).unwrap();
    engine.paymasters.insert(paymaster.clone());

    let mut op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    op.paymaster_and_data = Bytes::from(paymaster.address().to_vec());
    // re-sign: the paymaster field is part of the hash
    op.signature = SimLedger::sign(owner(), engine.entry_point.op_hash(&op));

    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(results[0].success);

    let fee = results[0].gas_cost;
    assert_eq!(
        engine.ledger.balance_of(beneficiary()).await.unwrap(),
        fee
    );
    assert_eq!(
        engine.ledger.balance_of(paymaster.address()).await.unwrap(),
        U256::from(500_000u64) - fee
    );
    // the sender paid nothing
    assert_eq!(engine.ledger.balance_of(sender).await.unwrap(), U256::ZERO);
}

#[tokio::test]
async fn unsponsored_sender_is_rejected_by_the_paymaster() {
    let engine = engine();
    let sender = simple_account(&engine, 0).await;
    let paymaster = Arc::new(SponsoringPaymaster::new(
        Address::repeat_byte(0xcc),
        Address::repeat_byte(0x0f),
        PaymasterConfig {
            daily_limit: U256::from(1_000_000u64),
            tx_limit: U256::from(100_000u64),
        },
        engine.ledger.clone(),
        engine.clock.clone(),
    ));
    engine
        .ledger
        .set_balance(paymaster.address(), U256::from(500_000u64));
    engine.paymasters.insert(paymaster.clone());

    let mut op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    op.paymaster_and_data = Bytes::from(paymaster.address().to_vec());
    op.signature = SimLedger::sign(owner(), engine.entry_point.op_hash(&op));

    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(!results[0].success);
    assert_eq!(results[0].reason.as_deref(), Some("not sponsored"));
}

#[tokio::test]
async fn unknown_paymaster_is_rejected() {
    let engine = engine();
    let sender = simple_account(&engine, 10_000_000).await;
    let mut op = signed_op(
        &engine.entry_point,
        sender,
        owner(),
        0,
        Address::repeat_byte(9),
        U256::ZERO,
    );
    op.paymaster_and_data = Bytes::from(Address::repeat_byte(0xdd).to_vec());
    op.signature = SimLedger::sign(owner(), engine.entry_point.op_hash(&op));

    let results = engine.entry_point.handle_ops(vec![op], beneficiary()).await;
    assert!(!results[0].success);
    assert!(results[0]
        .reason
        .as_deref()
        .unwrap()
        .starts_with("unknown paymaster"));
}

#[tokio::test]
async fn insurance_account_liquidates_through_the_engine() {
    let engine = engine();
    let rescue = Address::repeat_byte(0xb0);
    let address = engine
        .factory
        .create_account(
            AccountParams::Insurance {
                owner: owner(),
                rescue_destination: rescue,
            },
            B256::ZERO,
        )
        .await
        .unwrap();
    engine.ledger.set_balance(address, U256::from(77_000u64));

    let account = engine.accounts.get(address).unwrap();
    let insurance = account.as_insurance().unwrap();

    engine.oracle.set_price(U256::from(1_599));
    let (liquidatable, _) = insurance.can_be_liquidated().await.unwrap();
    assert!(liquidatable);

    insurance
        .execute_liquidation(warden_accounts::Caller::Direct(owner()))
        .await
        .unwrap();
    assert_eq!(
        engine.ledger.balance_of(rescue).await.unwrap(),
        U256::from(77_000u64)
    );
    assert_eq!(
        engine.ledger.balance_of(address).await.unwrap(),
        U256::ZERO
    );
}
