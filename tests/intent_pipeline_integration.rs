//! End-to-end pipeline runs against an in-process chain.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};
use pretty_assertions::assert_eq;

use intentbot::chain::{ChainClient, CommandPreview, ReceiptStatus, TxReceipt};
use intentbot::config::{ApprovalPolicy, ChainConfig};
use intentbot::error::{ChainError, FundsImpact, PipelineError};
use intentbot::pipeline::{IntentPipeline, PipelineState};
use intentbot::vault::{Account, AccountStore, InMemoryAccountStore, UserId};

const EXPLORER: &str = "https://basescan.org/tx/";

fn native_sentinel() -> Address {
    Address::from_str("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE").unwrap()
}

fn command_contract() -> Address {
    Address::from_str("1e00cE4800dE0D0000640070006dfc5F93dD0ff9").unwrap()
}

fn usdc() -> Address {
    Address::from_str("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap()
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Command {
        intent: String,
        value: U256,
    },
}

/// A minimal chain: one preview answer, a fixed allowance, scripted receipts.
struct FakeChain {
    preview: Result<CommandPreview, ChainError>,
    allowance: U256,
    command_status: ReceiptStatus,
    allowance_reads: Mutex<u32>,
    sent: Mutex<Vec<Sent>>,
    nonce: Mutex<u8>,
}

impl FakeChain {
    fn new(preview: Result<CommandPreview, ChainError>) -> Self {
        Self {
            preview,
            allowance: U256::zero(),
            command_status: ReceiptStatus::Success,
            allowance_reads: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
            nonce: Mutex::new(0),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn next_hash(&self) -> TxHash {
        let mut nonce = self.nonce.lock().unwrap();
        *nonce += 1;
        TxHash::repeat_byte(*nonce)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn preview_command(&self, _intent: &str) -> Result<CommandPreview, ChainError> {
        self.preview.clone()
    }

    async fn allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, ChainError> {
        *self.allowance_reads.lock().unwrap() += 1;
        Ok(self.allowance)
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        Ok(U256::zero())
    }

    async fn send_approve(
        &self,
        _signer: &Account,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.sent.lock().unwrap().push(Sent::Approve {
            token,
            spender,
            amount,
        });
        Ok(self.next_hash())
    }

    async fn send_command(
        &self,
        _signer: &Account,
        intent: &str,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        self.sent.lock().unwrap().push(Sent::Command {
            intent: intent.to_string(),
            value,
        });
        Ok(self.next_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let is_command = matches!(self.sent().last(), Some(Sent::Command { .. }));
        Ok(TxReceipt {
            transaction_hash: tx_hash,
            status: if is_command {
                self.command_status
            } else {
                ReceiptStatus::Success
            },
            block_number: Some(12_345_678),
        })
    }
}

fn chain_config() -> ChainConfig {
    ChainConfig {
        rpc_url: "http://127.0.0.1:8545".to_string(),
        chain_id: 8453,
        command_contract: command_contract(),
        native_token: native_sentinel(),
        native_symbol: "ETH".to_string(),
        explorer_tx_url: EXPLORER.to_string(),
        rpc_timeout: Duration::from_secs(2),
        confirmation_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        approval_policy: ApprovalPolicy::Unlimited,
    }
}

fn preview(token: Address, amount: U256) -> CommandPreview {
    CommandPreview {
        to: Address::repeat_byte(0x42),
        amount,
        min_amount_out: U256::zero(),
        token,
        call_data: Bytes::default(),
        execute_call_data: Bytes::default(),
    }
}

fn pipeline(chain: Arc<FakeChain>) -> IntentPipeline {
    IntentPipeline::new(
        chain,
        Arc::new(InMemoryAccountStore::new()),
        &chain_config(),
    )
}

#[tokio::test]
async fn scenario_a_native_payment() {
    let amount = U256::from(1_000_000_000_000_000u64);
    let chain = Arc::new(FakeChain::new(Ok(preview(native_sentinel(), amount))));
    let pipeline = pipeline(chain.clone());

    let report = pipeline
        .run(&UserId::from("1001"), "send 0.001 ETH to 0x42")
        .await;

    assert_eq!(
        chain.sent(),
        vec![Sent::Command {
            intent: "send 0.001 ETH to 0x42".to_string(),
            value: amount,
        }]
    );
    assert_eq!(*chain.allowance_reads.lock().unwrap(), 0);

    let receipt = report.outcome.as_ref().expect("confirmed");
    let hash = format!("{:#x}", receipt.transaction_hash);
    let text = pipeline.render(&report);
    assert!(text.contains(&format!("Transaction successful: {hash}")));
    assert!(text.contains(&format!("{EXPLORER}{hash}")));
    assert_eq!(report.final_state(), PipelineState::Confirmed);
}

#[tokio::test]
async fn scenario_b_token_with_zero_allowance() {
    let chain = Arc::new(FakeChain::new(Ok(preview(usdc(), U256::from(500u64)))));
    let pipeline = pipeline(chain.clone());

    let report = pipeline.run(&UserId::from("1002"), "swap 500 usdc").await;

    assert!(report.succeeded());
    assert_eq!(
        chain.sent(),
        vec![
            Sent::Approve {
                token: usdc(),
                spender: command_contract(),
                amount: U256::MAX,
            },
            Sent::Command {
                intent: "swap 500 usdc".to_string(),
                value: U256::zero(),
            },
        ]
    );
    assert!(report.approval.is_some());
}

#[tokio::test]
async fn sufficient_allowance_sends_only_the_command() {
    let mut chain = FakeChain::new(Ok(preview(usdc(), U256::from(500u64))));
    chain.allowance = U256::from(10_000u64);
    let chain = Arc::new(chain);

    let report = pipeline(chain.clone())
        .run(&UserId::from("1003"), "swap 500 usdc")
        .await;

    assert!(report.succeeded());
    assert_eq!(chain.sent().len(), 1);
    assert!(matches!(chain.sent()[0], Sent::Command { .. }));
}

#[tokio::test]
async fn scenario_c_preview_rejects_intent() {
    let chain = Arc::new(FakeChain::new(Err(ChainError::Reverted(
        "unknown command".to_string(),
    ))));
    let pipeline = pipeline(chain.clone());

    let report = pipeline.run(&UserId::from("1004"), "make me rich").await;

    assert!(matches!(
        report.outcome,
        Err(PipelineError::PreviewFailed(ref reason)) if reason == "unknown command"
    ));
    assert!(chain.sent().is_empty());

    let text = pipeline.render(&report);
    assert!(text.contains("PreviewFailed"));
    assert!(text.contains("unknown command"));
    assert!(text.contains("No transaction was sent"));
}

#[tokio::test]
async fn scenario_d_execution_reverts_after_approval() {
    let mut chain = FakeChain::new(Ok(preview(usdc(), U256::from(500u64))));
    chain.command_status = ReceiptStatus::Reverted;
    let chain = Arc::new(chain);
    let pipeline = pipeline(chain.clone());

    let report = pipeline.run(&UserId::from("1005"), "swap 500 usdc").await;

    assert!(matches!(
        report.outcome,
        Err(PipelineError::ExecutionReverted { .. })
    ));
    assert_eq!(report.funds_impact(), Some(FundsImpact::GasSpent));

    let approval = report.approval.as_ref().expect("approval confirmed");
    let text = pipeline.render(&report);
    assert!(text.contains(&format!(
        "Approval confirmed: {:#x}",
        approval.transaction_hash
    )));
    assert!(text.contains("ExecutionReverted"));
    assert!(!text.contains("Transaction successful"));
}

#[tokio::test]
async fn concurrent_account_creation_is_idempotent() {
    let store = Arc::new(InMemoryAccountStore::new());
    let user = UserId::from("2001");

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create(&user).await.unwrap().address()
        }));
    }

    let mut addresses = Vec::new();
    for handle in handles {
        addresses.push(handle.await.unwrap());
    }

    assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len().await, 1);
    assert_eq!(
        store.get(&user).await.map(|a| a.address()),
        Some(addresses[0])
    );
}

#[tokio::test]
async fn different_users_get_different_accounts() {
    let chain = Arc::new(FakeChain::new(Ok(preview(
        native_sentinel(),
        U256::from(1u64),
    ))));
    let pipeline = Arc::new(pipeline(chain));

    let a = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(&UserId::from("a"), "x").await })
    };
    let b = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(&UserId::from("b"), "y").await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.succeeded() && b.succeeded());
    assert_ne!(a.account, b.account);
}
