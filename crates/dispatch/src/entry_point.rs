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

use alloy_primitives::{Address, B256, U256};
use metrics::Counter;
use metrics_derive::Metrics;
use tokio::sync::broadcast;
use tracing::{info, warn};
use warden_accounts::{AccountPolicy, AccountRegistry, Caller};
use warden_ledger::Ledger;
use warden_paymaster::{PaymasterRegistry, SponsoringPaymaster, SponsorshipContext};
use warden_types::{DispatchError, OpResult, Operation};

use crate::{DispatchEvent, NonceManager};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The dispatcher: accepts operation batches, asks each sender's policy
/// whether the operation is permitted, and executes permitted calls.
///
/// Batches run strictly sequentially per invocation; across concurrent
/// invocations, nonce consumption serializes on one lock so a given
/// `(sender, key, sequence)` is applied at most once. One operation's
/// failure never aborts its batch siblings, and the nonce stays
/// consumed when execution fails after validation.
pub struct EntryPoint {
    address: Address,
    chain_id: u64,
    accounts: Arc<AccountRegistry>,
    paymasters: Arc<PaymasterRegistry>,
    ledger: Arc<dyn Ledger>,
    nonces: NonceManager,
    event_sender: broadcast::Sender<DispatchEvent>,
    metrics: DispatchMetrics,
}

impl EntryPoint {
    /// Create a dispatcher over the given registries and ledger.
    pub fn new(
        address: Address,
        chain_id: u64,
        accounts: Arc<AccountRegistry>,
        paymasters: Arc<PaymasterRegistry>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            address,
            chain_id,
            accounts,
            paymasters,
            ledger,
            nonces: NonceManager::new(),
            event_sender,
            metrics: DispatchMetrics::default(),
        }
    }

    /// The dispatcher's own address; operation hashes bind to it.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Subscribe to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_sender.subscribe()
    }

    /// The next expected sequence for `(sender, key)`.
    pub fn get_nonce(&self, sender: Address, key: U256) -> u64 {
        self.nonces.get(sender, key)
    }

    /// The hash this dispatcher assigns to `op`.
    pub fn op_hash(&self, op: &Operation) -> B256 {
        op.hash(self.address, self.chain_id)
    }

    /// Process a batch. Every operation gets its own result; fees for
    /// executed operations are credited to `beneficiary`.
    pub async fn handle_ops(&self, ops: Vec<Operation>, beneficiary: Address) -> Vec<OpResult> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(self.handle_op(op, beneficiary).await);
        }
        results
    }

    async fn handle_op(&self, op: Operation, beneficiary: Address) -> OpResult {
        let op_hash = self.op_hash(&op);
        self.metrics.ops_received.increment(1);
        self.emit(DispatchEvent::OpReceived {
            op_hash,
            sender: op.sender,
        });

        match self.run_op(&op, op_hash, beneficiary).await {
            Ok(result) => result,
            Err(err) => {
                let reason = err.to_string();
                self.metrics.ops_rejected.increment(1);
                warn!(%op_hash, sender = %op.sender, %reason, "operation rejected");
                self.emit(DispatchEvent::OpRejected {
                    op_hash,
                    reason: reason.clone(),
                });
                OpResult {
                    op_hash,
                    success: false,
                    reason: Some(reason),
                    gas_cost: U256::ZERO,
                }
            }
        }
    }

    async fn run_op(
        &self,
        op: &Operation,
        op_hash: B256,
        beneficiary: Address,
    ) -> Result<OpResult, DispatchError> {
        let account = self
            .accounts
            .get(op.sender)
            .ok_or(DispatchError::UnknownSender(op.sender))?;

        let key = op.nonce_key();
        let sequence = op.nonce_sequence();
        self.nonces.check(op.sender, key, sequence)?;

        account
            .validate(op, op_hash)
            .await
            .map_err(DispatchError::Policy)?;

        let max_cost = op.max_gas_cost();
        let sponsorship = self.fund_op(op, max_cost).await?;

        // Replay protection: consumed here and never rolled back, even
        // if execution fails below.
        if let Err(err) = self.nonces.consume(op.sender, key, sequence) {
            if let Some((paymaster, context)) = sponsorship {
                paymaster.post_op(context, U256::ZERO);
            }
            return Err(err);
        }

        let (success, reason, gas_used) = match account
            .execute(Caller::Dispatcher, op.target, op.value, op.call_data.clone())
            .await
        {
            Ok(outcome) if outcome.success => (true, None, outcome.gas_used),
            Ok(outcome) => (false, Some("execution reverted".to_string()), outcome.gas_used),
            Err(err) => (false, Some(err.to_string()), 0),
        };

        let charged_gas = op.pre_verification_gas.saturating_add(gas_used);
        let gas_cost = (U256::from(charged_gas) * U256::from(op.max_fee_per_gas)).min(max_cost);

        let payer = match &sponsorship {
            Some((paymaster, _)) => paymaster.address(),
            None => op.sender,
        };
        if let Some((paymaster, context)) = sponsorship {
            paymaster.post_op(context, gas_cost);
        }
        if let Err(err) = self
            .ledger
            .transfer_deposit(payer, beneficiary, gas_cost)
            .await
        {
            warn!(%op_hash, %err, "fee settlement failed");
        }

        if success {
            self.metrics.ops_executed.increment(1);
        } else {
            self.metrics.ops_reverted.increment(1);
        }
        info!(%op_hash, sender = %op.sender, success, %gas_cost, "operation executed");
        self.emit(DispatchEvent::OpExecuted {
            op_hash,
            success,
            gas_cost,
        });

        Ok(OpResult {
            op_hash,
            success,
            reason,
            gas_cost,
        })
    }

    /// Resolve how the operation's fee is funded: a paymaster
    /// sponsorship, or the sender's own deposit.
    async fn fund_op(
        &self,
        op: &Operation,
        max_cost: U256,
    ) -> Result<Option<(Arc<SponsoringPaymaster>, SponsorshipContext)>, DispatchError> {
        match op.paymaster() {
            Some(paymaster_address) => {
                let paymaster = self
                    .paymasters
                    .get(paymaster_address)
                    .ok_or(DispatchError::UnknownPaymaster(paymaster_address))?;
                let context = paymaster
                    .validate_sponsorship(op)
                    .await
                    .map_err(DispatchError::Policy)?;
                Ok(Some((paymaster, context)))
            }
            None => {
                let available = self.ledger.balance_of(op.sender).await?;
                if available < max_cost {
                    return Err(DispatchError::InsufficientDeposit {
                        needed: max_cost,
                        available,
                    });
                }
                Ok(None)
            }
        }
    }

    fn emit(&self, event: DispatchEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[derive(Metrics)]
#[metrics(scope = "warden_dispatch")]
struct DispatchMetrics {
    #[metric(describe = "the number of operations received")]
    ops_received: Counter,
    #[metric(describe = "the number of operations rejected during validation")]
    ops_rejected: Counter,
    #[metric(describe = "the number of operations executed successfully")]
    ops_executed: Counter,
    #[metric(describe = "the number of executed operations that reverted")]
    ops_reverted: Counter,
}
