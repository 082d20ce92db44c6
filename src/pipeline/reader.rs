use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};

use super::chain_message;
use crate::chain::{ChainClient, CommandPreview};
use crate::error::{ChainError, PipelineError};

/// Read-only access to the command and token contracts, bounded by the RPC timeout.
#[derive(Clone)]
pub struct ChainReader {
    client: Arc<dyn ChainClient>,
    rpc_timeout: Duration,
}

impl ChainReader {
    pub fn new(client: Arc<dyn ChainClient>, rpc_timeout: Duration) -> Self {
        Self {
            client,
            rpc_timeout,
        }
    }

    /// Ask the command contract what `intent` would do.
    pub async fn preview(&self, intent: &str) -> Result<CommandPreview, PipelineError> {
        match tokio::time::timeout(self.rpc_timeout, self.client.preview_command(intent)).await {
            Ok(Ok(preview)) => Ok(preview),
            Ok(Err(e)) => Err(PipelineError::PreviewFailed(chain_message(&e))),
            Err(_) => Err(PipelineError::PreviewFailed(format!(
                "preview timed out after {:?}",
                self.rpc_timeout
            ))),
        }
    }

    pub async fn allowance_of(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, PipelineError> {
        match tokio::time::timeout(
            self.rpc_timeout,
            self.client.allowance(token, owner, spender),
        )
        .await
        {
            Ok(Ok(amount)) => Ok(amount),
            Ok(Err(e)) => Err(PipelineError::AllowanceCheckFailed(chain_message(&e))),
            Err(_) => Err(PipelineError::AllowanceCheckFailed(format!(
                "allowance read timed out after {:?}",
                self.rpc_timeout
            ))),
        }
    }

    pub async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        tokio::time::timeout(self.rpc_timeout, self.client.native_balance(owner))
            .await
            .map_err(|_| {
                ChainError::Rpc(format!("balance read timed out after {:?}", self.rpc_timeout))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChainCall, NATIVE, RecordingChain, TOKEN, preview};

    #[tokio::test]
    async fn revert_reason_is_kept_verbatim() {
        let mut chain = RecordingChain::new(preview(NATIVE, 1));
        chain.preview = Err(ChainError::Reverted("unknown command".to_string()));
        let reader = ChainReader::new(Arc::new(chain), Duration::from_secs(1));

        let err = reader.preview("fly to the moon").await.unwrap_err();
        assert!(matches!(err, PipelineError::PreviewFailed(ref m) if m == "unknown command"));
    }

    #[tokio::test]
    async fn preview_times_out() {
        let mut chain = RecordingChain::new(preview(NATIVE, 1));
        chain.hang_preview = true;
        let reader = ChainReader::new(Arc::new(chain), Duration::from_millis(50));

        let err = reader.preview("swap 1 eth").await.unwrap_err();
        assert!(matches!(err, PipelineError::PreviewFailed(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn allowance_failure_has_its_own_kind() {
        let mut chain = RecordingChain::new(preview(TOKEN, 1));
        chain.allowance = Err(ChainError::Rpc("connection reset".to_string()));
        let chain = Arc::new(chain);
        let reader = ChainReader::new(chain.clone(), Duration::from_secs(1));

        let err = reader
            .allowance_of(TOKEN, Address::repeat_byte(1), Address::repeat_byte(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AllowanceCheckFailed");
        assert_eq!(
            chain.calls(),
            vec![ChainCall::Allowance {
                token: TOKEN,
                owner: Address::repeat_byte(1),
                spender: Address::repeat_byte(2),
            }]
        );
    }
}
