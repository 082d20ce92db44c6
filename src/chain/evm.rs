//! JSON-RPC chain client backed by ethers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider, RpcError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TxHash, U64, U256};

use super::bindings::{Erc20Token, IntentsEngine};
use super::{ChainClient, CommandPreview, ReceiptStatus, TxReceipt};
use crate::config::ChainConfig;
use crate::error::{ChainError, ConfigError};
use crate::vault::Account;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Chain client for an EVM JSON-RPC endpoint.
pub struct EvmChainClient {
    provider: Provider<Http>,
    command_contract: Address,
    chain_id: u64,
    poll_interval: Duration,
}

impl EvmChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, ConfigError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| ConfigError::InvalidValue {
                key: "RPC_URL".to_string(),
                message: e.to_string(),
            })?
            .interval(config.poll_interval);

        Ok(Self {
            provider,
            command_contract: config.command_contract,
            chain_id: config.chain_id,
            poll_interval: config.poll_interval,
        })
    }

    fn reader(&self) -> Arc<Provider<Http>> {
        Arc::new(self.provider.clone())
    }

    fn signer_client(&self, signer: &Account) -> Arc<SignerClient> {
        let wallet = signer.wallet().clone().with_chain_id(self.chain_id);
        Arc::new(SignerMiddleware::new(self.provider.clone(), wallet))
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn preview_command(&self, intent: &str) -> Result<CommandPreview, ChainError> {
        let engine = IntentsEngine::new(self.command_contract, self.reader());
        let output = engine
            .preview_command(intent.to_string())
            .call()
            .await
            .map_err(contract_error)?;
        Ok(CommandPreview::from(output))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        Erc20Token::new(token, self.reader())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(owner, None)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn send_approve(
        &self,
        signer: &Account,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let contract = Erc20Token::new(token, self.signer_client(signer));
        let call = contract.approve(spender, amount);
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = *pending;
        tracing::debug!(tx_hash = %format!("{tx_hash:#x}"), token = %format!("{token:#x}"), "approval broadcast");
        Ok(tx_hash)
    }

    async fn send_command(
        &self,
        signer: &Account,
        intent: &str,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        let engine = IntentsEngine::new(self.command_contract, self.signer_client(signer));
        let call = engine.command(intent.to_string()).value(value);
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = *pending;
        tracing::debug!(tx_hash = %format!("{tx_hash:#x}"), %value, "command broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let receipt = PendingTransaction::new(tx_hash, &self.provider)
            .interval(self.poll_interval)
            .confirmations(1)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or(ChainError::Dropped(tx_hash))?;

        let status = if receipt.status == Some(U64::from(1)) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Reverted
        };

        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            status,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}

/// Keep revert reasons verbatim; everything else is a transport failure.
fn contract_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    if let Some(reason) = err.decode_revert::<String>() {
        return ChainError::Reverted(reason);
    }
    if err.is_revert() {
        return ChainError::Reverted("execution reverted".to_string());
    }
    if let Some(response) = err.as_provider_error().and_then(|e| e.as_error_response()) {
        return ChainError::Rejected(response.message.clone());
    }
    match err {
        ContractError::DecodingError(e) => ChainError::InvalidResponse(e.to_string()),
        ContractError::AbiError(e) => ChainError::InvalidResponse(e.to_string()),
        other => ChainError::Rpc(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApprovalPolicy;

    fn config(rpc_url: &str) -> ChainConfig {
        ChainConfig {
            rpc_url: rpc_url.to_string(),
            chain_id: 8453,
            command_contract: Address::repeat_byte(0x1e),
            native_token: Address::repeat_byte(0xee),
            native_symbol: "ETH".to_string(),
            explorer_tx_url: "https://basescan.org/tx/".to_string(),
            rpc_timeout: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
            approval_policy: ApprovalPolicy::Unlimited,
        }
    }

    #[test]
    fn builds_from_valid_rpc_url() {
        let client = EvmChainClient::new(&config("http://127.0.0.1:8545")).expect("client");
        assert_eq!(client.chain_id, 8453);
        assert_eq!(client.command_contract, Address::repeat_byte(0x1e));
    }

    #[test]
    fn rejects_unparseable_rpc_url() {
        let err = EvmChainClient::new(&config("not a url")).err().expect("error");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RPC_URL"));
    }

    #[test]
    fn json_rpc_error_response_is_a_rejection() {
        use ethers::providers::{HttpClientError, JsonRpcError, ProviderError};

        let err = ContractError::<Provider<Http>>::ProviderError {
            e: ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(
                JsonRpcError {
                    code: -32000,
                    message: "insufficient funds for gas * price + value".to_string(),
                    data: None,
                },
            ))),
        };

        let mapped = contract_error(err);
        assert!(
            matches!(mapped, ChainError::Rejected(ref m) if m.starts_with("insufficient funds")),
            "{mapped:?}"
        );
        assert!(mapped.is_definite_rejection());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_rpc_error() {
        // Port 9 (discard) is not an RPC server; connection is refused.
        let client = EvmChainClient::new(&config("http://127.0.0.1:9")).expect("client");
        let err = client
            .native_balance(Address::repeat_byte(0x01))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rpc(_)));
        assert!(!err.is_definite_rejection());
    }
}
