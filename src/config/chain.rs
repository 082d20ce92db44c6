use std::str::FromStr;
use std::time::Duration;

use ethers::types::Address;

use crate::config::helpers::{normalize_variant, optional_env, optional_positive_u64};
use crate::error::ConfigError;
use crate::settings::Settings;

/// How much allowance to grant when the current one falls short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Approve the maximum uint256 once so later intents skip approval.
    Unlimited,
    /// Approve exactly the previewed amount on every shortfall.
    Exact,
}

impl ApprovalPolicy {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "unlimited" | "max" | "infinite" => Ok(Self::Unlimited),
            "exact" => Ok(Self::Exact),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'unlimited' or 'exact', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unlimited => "unlimited",
            Self::Exact => "exact",
        }
    }
}

/// Chain endpoint, contract addresses, and execution timeouts.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Contract exposing `previewCommand` and `command`.
    pub command_contract: Address,
    /// Sentinel token address meaning "pay in native currency".
    pub native_token: Address,
    pub native_symbol: String,
    /// Block explorer prefix; the transaction hash is appended verbatim.
    pub explorer_tx_url: String,
    /// Bound on each read call and each broadcast.
    pub rpc_timeout: Duration,
    /// Bound on each receipt wait.
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub approval_policy: ApprovalPolicy,
}

impl ChainConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let chain = &settings.chain;

        let rpc_url = optional_env("RPC_URL")?
            .or_else(|| chain.rpc_url.clone())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "RPC_URL".to_string(),
                hint: "Set RPC_URL to a JSON-RPC endpoint for the target chain.".to_string(),
            })?;
        url::Url::parse(&rpc_url).map_err(|e| ConfigError::InvalidValue {
            key: "RPC_URL".to_string(),
            message: format!("must be a valid URL: {e}"),
        })?;

        let chain_id = optional_env("CHAIN_ID")?
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CHAIN_ID".to_string(),
                message: format!("must be a valid integer: {e}"),
            })?
            .unwrap_or(chain.chain_id);

        let command_contract = parse_address(
            "COMMAND_CONTRACT_ADDRESS",
            optional_env("COMMAND_CONTRACT_ADDRESS")?.unwrap_or_else(|| chain.command_contract.clone()),
        )?;
        let native_token = parse_address(
            "NATIVE_TOKEN_ADDRESS",
            optional_env("NATIVE_TOKEN_ADDRESS")?.unwrap_or_else(|| chain.native_token.clone()),
        )?;

        let native_symbol =
            optional_env("NATIVE_SYMBOL")?.unwrap_or_else(|| chain.native_symbol.clone());

        let explorer_tx_url =
            optional_env("EXPLORER_TX_URL")?.unwrap_or_else(|| chain.explorer_tx_url.clone());
        url::Url::parse(&explorer_tx_url).map_err(|e| ConfigError::InvalidValue {
            key: "EXPLORER_TX_URL".to_string(),
            message: format!("must be a valid URL: {e}"),
        })?;

        let rpc_timeout_ms =
            optional_positive_u64("RPC_TIMEOUT_MS")?.unwrap_or(chain.rpc_timeout_ms);
        let confirmation_timeout_ms = optional_positive_u64("CONFIRMATION_TIMEOUT_MS")?
            .unwrap_or(chain.confirmation_timeout_ms);
        let poll_interval_ms =
            optional_positive_u64("POLL_INTERVAL_MS")?.unwrap_or(chain.poll_interval_ms);

        for (key, value) in [
            ("chain.rpc_timeout_ms", rpc_timeout_ms),
            ("chain.confirmation_timeout_ms", confirmation_timeout_ms),
            ("chain.poll_interval_ms", poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be > 0".to_string(),
                });
            }
        }

        let approval_policy = match optional_env("APPROVAL_POLICY")? {
            Some(value) => ApprovalPolicy::parse(&value, "APPROVAL_POLICY")?,
            None => ApprovalPolicy::parse(&chain.approval_policy, "chain.approval_policy")?,
        };

        Ok(Self {
            rpc_url,
            chain_id,
            command_contract,
            native_token,
            native_symbol,
            explorer_tx_url,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            confirmation_timeout: Duration::from_millis(confirmation_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            approval_policy,
        })
    }
}

fn parse_address(key: &str, value: String) -> Result<Address, ConfigError> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != 40 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a 20-byte hex address, got '{value}'"),
        });
    }
    Address::from_str(hex).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a 20-byte hex address: {e}"),
    })
}
