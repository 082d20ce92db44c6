use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;

use super::{WaitFailure, chain_message, wait_for_confirmation};
use crate::chain::{ChainClient, TxReceipt};
use crate::error::PipelineError;
use crate::vault::Account;

/// Sends the `command` transaction and waits for its receipt.
pub struct IntentSubmitter {
    client: Arc<dyn ChainClient>,
    rpc_timeout: Duration,
    confirmation_timeout: Duration,
}

impl IntentSubmitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        rpc_timeout: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            rpc_timeout,
            confirmation_timeout,
        }
    }

    /// Returns only a receipt with success status.
    pub async fn execute(
        &self,
        intent: &str,
        value: U256,
        signer: &Account,
    ) -> Result<TxReceipt, PipelineError> {
        let tx_hash = match tokio::time::timeout(
            self.rpc_timeout,
            self.client.send_command(signer, intent, value),
        )
        .await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                let broadcast_uncertain = !e.is_definite_rejection();
                if broadcast_uncertain {
                    tracing::warn!(error = %e, "command broadcast failed in transport; outcome unknown");
                }
                return Err(PipelineError::SubmissionFailed {
                    reason: chain_message(&e),
                    broadcast_uncertain,
                });
            }
            Err(_) => {
                tracing::warn!("command broadcast timed out; outcome unknown");
                return Err(PipelineError::SubmissionFailed {
                    reason: format!("broadcast timed out after {:?}", self.rpc_timeout),
                    broadcast_uncertain: true,
                });
            }
        };
        tracing::info!(tx_hash = %format!("{tx_hash:#x}"), %value, "command submitted");

        match wait_for_confirmation(self.client.as_ref(), tx_hash, self.confirmation_timeout).await
        {
            Ok(receipt) if receipt.succeeded() => Ok(receipt),
            Ok(_) => Err(PipelineError::ExecutionReverted { tx_hash }),
            Err(WaitFailure::TimedOut) => Err(PipelineError::ConfirmationTimeout {
                tx_hash,
                timeout: self.confirmation_timeout,
                reason: "deadline elapsed".to_string(),
            }),
            Err(WaitFailure::Chain(e)) => Err(PipelineError::ConfirmationTimeout {
                tx_hash,
                timeout: self.confirmation_timeout,
                reason: chain_message(&e),
            }),
        }
    }
}
