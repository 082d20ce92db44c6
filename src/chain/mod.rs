//! Chain access for the intent pipeline.
//!
//! [`ChainClient`] is the seam between the pipeline stages and the network:
//! the production implementation talks JSON-RPC through ethers, tests swap
//! in a recording fake.

mod bindings;
mod evm;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};
use serde::Serialize;

use crate::error::ChainError;
use crate::vault::Account;

pub use self::evm::EvmChainClient;

/// Decoded output of the command contract's `previewCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPreview {
    pub to: Address,
    /// Amount the command will pull from the sender, in `token` base units.
    pub amount: U256,
    pub min_amount_out: U256,
    /// Payment token, or the native sentinel.
    pub token: Address,
    pub call_data: Bytes,
    pub execute_call_data: Bytes,
}

impl CommandPreview {
    /// Amount that must be covered by allowance or attached value.
    pub fn required_amount(&self) -> U256 {
        self.amount
    }

    pub fn payment_token(&self) -> Address {
        self.token
    }
}

impl From<(Address, U256, U256, Address, Bytes, Bytes)> for CommandPreview {
    fn from(
        (to, amount, min_amount_out, token, call_data, execute_call_data): (
            Address,
            U256,
            U256,
            Address,
            Bytes,
            Bytes,
        ),
    ) -> Self {
        Self {
            to,
            amount,
            min_amount_out,
            token,
            call_data,
            execute_call_data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// The subset of a mined receipt the pipeline reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Network operations the pipeline depends on.
///
/// Implementations do not retry and do not impose their own deadlines;
/// callers bound every call.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Read-only evaluation of an intent by the command contract.
    async fn preview_command(&self, intent: &str) -> Result<CommandPreview, ChainError>;

    /// ERC-20 `allowance(owner, spender)`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;

    /// Native currency balance of `owner`.
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    /// Sign and broadcast `approve(spender, amount)` on `token`.
    async fn send_approve(
        &self,
        signer: &Account,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// Sign and broadcast `command(intent)` with `value` attached.
    async fn send_command(
        &self,
        signer: &Account,
        intent: &str,
        value: U256,
    ) -> Result<TxHash, ChainError>;

    /// Block until the transaction is mined and return its receipt.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError>;
}
