use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};

use super::reader::ChainReader;
use super::{WaitFailure, chain_message, wait_for_confirmation};
use crate::chain::{ChainClient, TxReceipt};
use crate::config::ApprovalPolicy;
use crate::error::PipelineError;
use crate::vault::Account;

/// Amount to approve when the current allowance is short.
pub fn approval_amount(policy: ApprovalPolicy, required: U256) -> U256 {
    match policy {
        ApprovalPolicy::Unlimited => U256::MAX,
        ApprovalPolicy::Exact => required,
    }
}

/// Makes sure the command contract may pull the previewed amount.
pub struct AllowanceReconciler {
    client: Arc<dyn ChainClient>,
    reader: ChainReader,
    native_token: Address,
    policy: ApprovalPolicy,
    rpc_timeout: Duration,
    confirmation_timeout: Duration,
}

impl AllowanceReconciler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        reader: ChainReader,
        native_token: Address,
        policy: ApprovalPolicy,
        rpc_timeout: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            reader,
            native_token,
            policy,
            rpc_timeout,
            confirmation_timeout,
        }
    }

    /// Approve `spender` for `token` if the signer's allowance is below `required`.
    ///
    /// Returns the approval receipt when an approval was sent and confirmed,
    /// `None` when nothing was needed. Native payments never touch the chain.
    pub async fn ensure(
        &self,
        token: Address,
        spender: Address,
        required: U256,
        signer: &Account,
    ) -> Result<Option<TxReceipt>, PipelineError> {
        if token == self.native_token {
            tracing::debug!("native payment, no approval needed");
            return Ok(None);
        }

        let owner = signer.address();
        let current = self.reader.allowance_of(token, owner, spender).await?;
        if current >= required {
            tracing::debug!(%current, %required, "allowance sufficient");
            return Ok(None);
        }

        let amount = approval_amount(self.policy, required);
        tracing::info!(
            token = %format!("{token:#x}"),
            %current,
            %required,
            policy = self.policy.as_str(),
            "allowance short, sending approval"
        );

        let tx_hash = match tokio::time::timeout(
            self.rpc_timeout,
            self.client.send_approve(signer, token, spender, amount),
        )
        .await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => return Err(PipelineError::ApprovalSubmissionFailed(chain_message(&e))),
            Err(_) => {
                return Err(PipelineError::ApprovalSubmissionFailed(format!(
                    "approval broadcast timed out after {:?}",
                    self.rpc_timeout
                )));
            }
        };

        match wait_for_confirmation(self.client.as_ref(), tx_hash, self.confirmation_timeout).await
        {
            Ok(receipt) if receipt.succeeded() => {
                tracing::info!(tx_hash = %format!("{tx_hash:#x}"), "approval confirmed");
                Ok(Some(receipt))
            }
            Ok(_) => Err(PipelineError::ApprovalNotConfirmed {
                tx_hash,
                reason: "approval transaction reverted".to_string(),
            }),
            Err(WaitFailure::TimedOut) => Err(PipelineError::ApprovalNotConfirmed {
                tx_hash,
                reason: format!(
                    "not confirmed within {:?}",
                    self.confirmation_timeout
                ),
            }),
            Err(WaitFailure::Chain(e)) => Err(PipelineError::ApprovalNotConfirmed {
                tx_hash,
                reason: chain_message(&e),
            }),
        }
    }
}
