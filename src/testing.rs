//! Test doubles shared by unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};

use crate::chain::{ChainClient, CommandPreview, ReceiptStatus, TxReceipt};
use crate::error::ChainError;
use crate::vault::Account;

pub(crate) const NATIVE: Address = Address::repeat_byte(0xee);
pub(crate) const CONTRACT: Address = Address::repeat_byte(0x1e);
pub(crate) const TOKEN: Address = Address::repeat_byte(0x70);

pub(crate) fn approve_hash() -> TxHash {
    TxHash::repeat_byte(0xa1)
}

pub(crate) fn command_hash() -> TxHash {
    TxHash::repeat_byte(0xc1)
}

pub(crate) fn preview(token: Address, amount: u64) -> CommandPreview {
    CommandPreview {
        to: Address::repeat_byte(0x05),
        amount: U256::from(amount),
        min_amount_out: U256::from(amount / 2),
        token,
        call_data: Bytes::from(vec![0x12, 0x34]),
        execute_call_data: Bytes::default(),
    }
}

/// Every call the pipeline made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainCall {
    Preview(String),
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
    },
    NativeBalance(Address),
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Command {
        intent: String,
        value: U256,
    },
    WaitReceipt(TxHash),
}

/// Calls interleaved with receipt resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainEvent {
    Called(ChainCall),
    ReceiptResolved(TxHash),
}

#[derive(Debug, Clone)]
pub(crate) enum ReceiptBehavior {
    Success,
    Reverted,
    /// Never resolves; the caller's deadline fires.
    Hang,
    Drop,
    Fail(ChainError),
}

/// Scriptable [`ChainClient`] that records calls.
pub(crate) struct RecordingChain {
    calls: Mutex<Vec<ChainCall>>,
    timeline: Mutex<Vec<ChainEvent>>,
    pub preview: Result<CommandPreview, ChainError>,
    pub allowance: Result<U256, ChainError>,
    pub balance: U256,
    pub approve: Result<(), ChainError>,
    pub command: Result<(), ChainError>,
    pub approve_receipt: ReceiptBehavior,
    pub command_receipt: ReceiptBehavior,
    pub hang_preview: bool,
    pub hang_command_broadcast: bool,
    /// Delay before any receipt resolves.
    pub receipt_delay: Duration,
}

impl RecordingChain {
    pub fn new(preview: CommandPreview) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            timeline: Mutex::new(Vec::new()),
            preview: Ok(preview),
            allowance: Ok(U256::zero()),
            balance: U256::zero(),
            approve: Ok(()),
            command: Ok(()),
            approve_receipt: ReceiptBehavior::Success,
            command_receipt: ReceiptBehavior::Success,
            hang_preview: false,
            hang_command_broadcast: false,
            receipt_delay: Duration::ZERO,
        }
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn timeline(&self) -> Vec<ChainEvent> {
        self.timeline.lock().expect("timeline lock").clone()
    }

    pub fn approvals(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChainCall::Approve { .. }))
            .count()
    }

    pub fn commands(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChainCall::Command { .. }))
            .count()
    }

    fn record(&self, call: ChainCall) {
        self.calls.lock().expect("calls lock").push(call.clone());
        self.timeline
            .lock()
            .expect("timeline lock")
            .push(ChainEvent::Called(call));
    }

    async fn receipt(behavior: &ReceiptBehavior, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let status = match behavior {
            ReceiptBehavior::Success => ReceiptStatus::Success,
            ReceiptBehavior::Reverted => ReceiptStatus::Reverted,
            ReceiptBehavior::Hang => std::future::pending().await,
            ReceiptBehavior::Drop => return Err(ChainError::Dropped(tx_hash)),
            ReceiptBehavior::Fail(e) => return Err(e.clone()),
        };
        Ok(TxReceipt {
            transaction_hash: tx_hash,
            status,
            block_number: Some(100),
        })
    }
}

#[async_trait]
impl ChainClient for RecordingChain {
    async fn preview_command(&self, intent: &str) -> Result<CommandPreview, ChainError> {
        self.record(ChainCall::Preview(intent.to_string()));
        if self.hang_preview {
            std::future::pending::<()>().await;
        }
        self.preview.clone()
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        self.record(ChainCall::Allowance {
            token,
            owner,
            spender,
        });
        self.allowance.clone()
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.record(ChainCall::NativeBalance(owner));
        Ok(self.balance)
    }

    async fn send_approve(
        &self,
        _signer: &Account,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(ChainCall::Approve {
            token,
            spender,
            amount,
        });
        self.approve.clone().map(|()| approve_hash())
    }

    async fn send_command(
        &self,
        _signer: &Account,
        intent: &str,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(ChainCall::Command {
            intent: intent.to_string(),
            value,
        });
        if self.hang_command_broadcast {
            std::future::pending::<()>().await;
        }
        self.command.clone().map(|()| command_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        self.record(ChainCall::WaitReceipt(tx_hash));
        if !self.receipt_delay.is_zero() {
            tokio::time::sleep(self.receipt_delay).await;
        }
        let behavior = if tx_hash == approve_hash() {
            &self.approve_receipt
        } else {
            &self.command_receipt
        };
        let receipt = Self::receipt(behavior, tx_hash).await;
        self.timeline
            .lock()
            .expect("timeline lock")
            .push(ChainEvent::ReceiptResolved(tx_hash));
        receipt
    }
}
