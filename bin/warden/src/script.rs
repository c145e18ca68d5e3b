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

//! Script interpreter: thin wrappers mapping JSON commands onto the
//! engine's core methods.

use std::{
    io::Read,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use warden_accounts::{
    Account, AccountFactory, AccountParams, AccountRegistry, Caller,
};
use warden_dispatch::EntryPoint;
use warden_ledger::{Ledger, SimLedger, SimOracle};
use warden_paymaster::{PaymasterConfig, PaymasterRegistry, SponsoringPaymaster};
use warden_types::{Clock, Operation, SimClock, Timestamp};

use crate::RunArgs;

/// Initial oracle price before any `set-price` command.
const DEFAULT_ORACLE_PRICE: u64 = 2_000;

#[derive(Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
enum ScriptCommand {
    #[serde(rename_all = "camelCase")]
    CreateAccount { params: AccountParams, salt: B256 },
    #[serde(rename_all = "camelCase")]
    GetAddress { params: AccountParams, salt: B256 },
    #[serde(rename_all = "camelCase")]
    Deposit { address: Address, amount: U256 },
    #[serde(rename_all = "camelCase")]
    Balance { address: Address },
    #[serde(rename_all = "camelCase")]
    GetNonce {
        sender: Address,
        #[serde(default)]
        key: U256,
    },
    #[serde(rename_all = "camelCase")]
    RegisterDevice {
        account: Address,
        caller: Address,
        device_id: String,
        key: Address,
        daily_limit: U256,
    },
    #[serde(rename_all = "camelCase")]
    RemoveDevice {
        account: Address,
        caller: Address,
        device_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ExecuteBiometric {
        account: Address,
        device_id: String,
        target: Address,
        value: U256,
    },
    #[serde(rename_all = "camelCase")]
    Propose {
        account: Address,
        signer: Address,
        dest: Address,
        value: U256,
    },
    #[serde(rename_all = "camelCase")]
    Confirm {
        account: Address,
        signer: Address,
        index: u64,
    },
    #[serde(rename_all = "camelCase")]
    ExecuteProposal {
        account: Address,
        signer: Address,
        index: u64,
    },
    #[serde(rename_all = "camelCase")]
    ConfigureGuardians {
        account: Address,
        caller: Address,
        guardians: Vec<Address>,
        threshold: usize,
        delay_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    InitiateRecovery {
        account: Address,
        caller: Address,
        #[serde(default)]
        new_owner: Option<Address>,
        #[serde(default)]
        new_signers: Option<Vec<Address>>,
    },
    #[serde(rename_all = "camelCase")]
    ApproveRecovery { account: Address, caller: Address },
    #[serde(rename_all = "camelCase")]
    ExecuteRecovery { account: Address, caller: Address },
    #[serde(rename_all = "camelCase")]
    CreatePaymaster {
        address: Address,
        owner: Address,
        daily_limit: U256,
        tx_limit: U256,
    },
    #[serde(rename_all = "camelCase")]
    Sponsor {
        paymaster: Address,
        caller: Address,
        address: Address,
    },
    #[serde(rename_all = "camelCase")]
    SponsorApp {
        paymaster: Address,
        caller: Address,
        app: Address,
    },
    #[serde(rename_all = "camelCase")]
    SubmitOps {
        ops: Vec<OpSpec>,
        beneficiary: Address,
    },
    #[serde(rename_all = "camelCase")]
    Liquidate { account: Address, caller: Address },
    #[serde(rename_all = "camelCase")]
    CanBeLiquidated { account: Address },
    #[serde(rename_all = "camelCase")]
    SetPrice {
        price: U256,
        #[serde(default = "default_true")]
        valid: bool,
    },
    #[serde(rename_all = "camelCase")]
    AdvanceClock { seconds: u64 },
}

fn default_true() -> bool {
    true
}

/// An operation to build, sign with the sim scheme, and submit.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpSpec {
    sender: Address,
    signer: Address,
    target: Address,
    value: U256,
    #[serde(default)]
    sequence: Option<u64>,
    #[serde(default)]
    paymaster: Option<Address>,
}

struct Engine {
    ledger: Arc<SimLedger>,
    clock: Arc<SimClock>,
    oracle: Arc<SimOracle>,
    accounts: Arc<AccountRegistry>,
    paymasters: Arc<PaymasterRegistry>,
    factory: AccountFactory,
    entry_point: EntryPoint,
}

impl Engine {
    fn new(chain_id: u64) -> Self {
        let ledger = Arc::new(SimLedger::new());
        let clock = Arc::new(SimClock::new(Timestamp::now()));
        let oracle = Arc::new(SimOracle::new(U256::from(DEFAULT_ORACLE_PRICE)));
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
            chain_id,
            accounts.clone(),
            paymasters.clone(),
            ledger.clone(),
        );
        Self {
            ledger,
            clock,
            oracle,
            accounts,
            paymasters,
            factory,
            entry_point,
        }
    }

    fn account(&self, address: Address) -> anyhow::Result<Account> {
        self.accounts
            .get(address)
            .with_context(|| format!("no account registered at {address}"))
    }

    fn paymaster(&self, address: Address) -> anyhow::Result<Arc<SponsoringPaymaster>> {
        self.paymasters
            .get(address)
            .with_context(|| format!("no paymaster registered at {address}"))
    }

    fn build_op(&self, spec: &OpSpec) -> Operation {
        let sequence = spec
            .sequence
            .unwrap_or_else(|| self.entry_point.get_nonce(spec.sender, U256::ZERO));
        let mut op = Operation {
            sender: spec.sender,
            nonce: U256::from(sequence),
            target: spec.target,
            value: spec.value,
            call_gas_limit: 100_000,
            verification_gas_limit: 50_000,
            pre_verification_gas: 21_000,
            max_fee_per_gas: 1,
            max_priority_fee_per_gas: 1,
            ..Default::default()
        };
        if let Some(paymaster) = spec.paymaster {
            op.paymaster_and_data = Bytes::from(paymaster.to_vec());
        }
        op.signature = SimLedger::sign(spec.signer, self.entry_point.op_hash(&op));
        op
    }

    async fn apply(&self, command: ScriptCommand) -> anyhow::Result<Value> {
        match command {
            ScriptCommand::CreateAccount { params, salt } => {
                let kind = params.kind();
                let address = self.factory.create_account(params, salt).await?;
                Ok(json!({ "address": address, "kind": kind }))
            }
            ScriptCommand::GetAddress { params, salt } => {
                Ok(json!({ "address": self.factory.get_address(&params, salt) }))
            }
            ScriptCommand::Deposit { address, amount } => {
                self.ledger.deposit_to(address, amount).await?;
                Ok(json!({ "balance": self.ledger.balance_of(address).await? }))
            }
            ScriptCommand::Balance { address } => {
                Ok(json!({ "balance": self.ledger.balance_of(address).await? }))
            }
            ScriptCommand::GetNonce { sender, key } => {
                Ok(json!({ "nonce": self.entry_point.get_nonce(sender, key) }))
            }
            ScriptCommand::RegisterDevice {
                account,
                caller,
                device_id,
                key,
                daily_limit,
            } => {
                let account = self.account(account)?;
                let biometric = account
                    .as_biometric()
                    .context("not a biometric account")?;
                biometric.register_device(caller, &device_id, key, daily_limit)?;
                Ok(json!({ "registered": device_id }))
            }
            ScriptCommand::RemoveDevice {
                account,
                caller,
                device_id,
            } => {
                let account = self.account(account)?;
                let biometric = account
                    .as_biometric()
                    .context("not a biometric account")?;
                biometric.remove_device(caller, &device_id)?;
                Ok(json!({ "removed": device_id }))
            }
            ScriptCommand::ExecuteBiometric {
                account,
                device_id,
                target,
                value,
            } => {
                let account = self.account(account)?;
                let biometric = account
                    .as_biometric()
                    .context("not a biometric account")?;
                let device = biometric.device(&device_id)?;
                let digest = biometric.device_digest(
                    &device_id,
                    biometric.current_hour_bucket(),
                    target,
                    value,
                    &Bytes::new(),
                );
                let signature = SimLedger::sign(device.key, digest);
                let outcome = biometric
                    .execute_biometric(&device_id, target, value, Bytes::new(), &signature)
                    .await?;
                Ok(json!({ "success": outcome.success, "gasUsed": outcome.gas_used }))
            }
            ScriptCommand::Propose {
                account,
                signer,
                dest,
                value,
            } => {
                let index = match self.account(account)? {
                    Account::MultiSig(a) => {
                        a.propose_transaction(signer, dest, value, Bytes::new())?
                    }
                    Account::Corporate(a) => {
                        a.propose_transaction(signer, dest, value, Bytes::new())?
                    }
                    _ => bail!("account has no proposal workflow"),
                };
                Ok(json!({ "index": index }))
            }
            ScriptCommand::Confirm {
                account,
                signer,
                index,
            } => {
                let confirmations = match self.account(account)? {
                    Account::MultiSig(a) => a.confirm_transaction(signer, index)?,
                    Account::Corporate(a) => a.confirm_transaction(signer, index)?,
                    _ => bail!("account has no proposal workflow"),
                };
                Ok(json!({ "confirmations": confirmations }))
            }
            ScriptCommand::ExecuteProposal {
                account,
                signer,
                index,
            } => {
                let outcome = match self.account(account)? {
                    Account::MultiSig(a) => a.execute_transaction(signer, index).await?,
                    Account::Corporate(a) => a.execute_transaction(signer, index).await?,
                    _ => bail!("account has no proposal workflow"),
                };
                Ok(json!({ "success": outcome.success, "gasUsed": outcome.gas_used }))
            }
            ScriptCommand::ConfigureGuardians {
                account,
                caller,
                guardians,
                threshold,
                delay_secs,
            } => {
                let account = self.account(account)?;
                let social = account
                    .as_social_recovery()
                    .context("not a social recovery account")?;
                social.configure_guardians(
                    caller,
                    guardians,
                    threshold,
                    Duration::from_secs(delay_secs),
                )?;
                Ok(json!({ "guardians": social.guardians().signers() }))
            }
            ScriptCommand::InitiateRecovery {
                account,
                caller,
                new_owner,
                new_signers,
            } => {
                match self.account(account)? {
                    Account::SocialRecovery(a) => {
                        let new_owner =
                            new_owner.context("social recovery needs newOwner")?;
                        a.initiate_recovery(caller, new_owner)?;
                    }
                    Account::Corporate(a) => {
                        let new_signers =
                            new_signers.context("corporate recovery needs newSigners")?;
                        a.initiate_recovery(caller, new_signers)?;
                    }
                    _ => bail!("account has no recovery workflow"),
                }
                Ok(json!({ "initiated": true }))
            }
            ScriptCommand::ApproveRecovery { account, caller } => {
                let approvals = match self.account(account)? {
                    Account::SocialRecovery(a) => a.approve_recovery(caller)?,
                    Account::Corporate(a) => a.approve_recovery(caller)?,
                    _ => bail!("account has no recovery workflow"),
                };
                Ok(json!({ "approvals": approvals }))
            }
            ScriptCommand::ExecuteRecovery { account, caller } => match self.account(account)? {
                Account::SocialRecovery(a) => {
                    let new_owner = a.execute_recovery(caller)?;
                    Ok(json!({ "newOwner": new_owner }))
                }
                Account::Corporate(a) => {
                    a.recover_access(caller)?;
                    Ok(json!({ "signers": a.signers().signers() }))
                }
                _ => bail!("account has no recovery workflow"),
            },
            ScriptCommand::CreatePaymaster {
                address,
                owner,
                daily_limit,
                tx_limit,
            } => {
                self.paymasters.insert(Arc::new(SponsoringPaymaster::new(
                    address,
                    owner,
                    PaymasterConfig {
                        daily_limit,
                        tx_limit,
                    },
                    self.ledger.clone(),
                    self.clock.clone(),
                )));
                Ok(json!({ "paymaster": address }))
            }
            ScriptCommand::Sponsor {
                paymaster,
                caller,
                address,
            } => {
                self.paymaster(paymaster)?.sponsor(caller, address)?;
                Ok(json!({ "sponsored": address }))
            }
            ScriptCommand::SponsorApp {
                paymaster,
                caller,
                app,
            } => {
                self.paymaster(paymaster)?.sponsor_app(caller, app)?;
                Ok(json!({ "sponsored": app }))
            }
            ScriptCommand::SubmitOps { ops, beneficiary } => {
                let ops: Vec<Operation> = ops.iter().map(|spec| self.build_op(spec)).collect();
                let results = self.entry_point.handle_ops(ops, beneficiary).await;
                Ok(serde_json::to_value(results)?)
            }
            ScriptCommand::Liquidate { account, caller } => {
                let account = self.account(account)?;
                let insurance = account
                    .as_insurance()
                    .context("not an insurance account")?;
                let outcome = insurance.execute_liquidation(Caller::Direct(caller)).await?;
                Ok(json!({ "success": outcome.success }))
            }
            ScriptCommand::CanBeLiquidated { account } => {
                let account = self.account(account)?;
                let insurance = account
                    .as_insurance()
                    .context("not an insurance account")?;
                let (liquidatable, price) = insurance.can_be_liquidated().await?;
                Ok(json!({ "liquidatable": liquidatable, "price": price }))
            }
            ScriptCommand::SetPrice { price, valid } => {
                self.oracle.set_price(price);
                self.oracle.set_valid(valid);
                Ok(json!({ "price": price, "valid": valid }))
            }
            ScriptCommand::AdvanceClock { seconds } => {
                self.clock.advance(Duration::from_secs(seconds));
                Ok(json!({ "now": self.clock.now().seconds_since_epoch() }))
            }
        }
    }
}

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<()> {
    let input = match &args.script {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let engine = Engine::new(args.chain_id);
    for (line_number, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: ScriptCommand = serde_json::from_str(line)
            .with_context(|| format!("parsing command on line {}", line_number + 1))?;
        debug!(line = line_number + 1, "applying command");
        let result = engine
            .apply(command)
            .await
            .with_context(|| format!("command on line {} failed", line_number + 1))?;
        println!("{result}");
    }
    Ok(())
}
