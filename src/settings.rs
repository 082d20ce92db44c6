//! Operator settings loaded from a TOML file.
//!
//! Settings sit below env vars in priority: env var > config.toml > default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default command contract (Base mainnet intents engine).
pub const DEFAULT_COMMAND_CONTRACT: &str = "0x1e00cE4800dE0D0000640070006dfc5F93dD0ff9";

/// Placeholder address meaning "pay with the chain's native currency".
pub const DEFAULT_NATIVE_TOKEN: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Operator settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Chain and contract settings.
    #[serde(default)]
    pub chain: ChainSettings,

    /// Channel settings.
    #[serde(default)]
    pub channels: ChannelSettings,
}

/// Chain connection and execution policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainSettings {
    /// JSON-RPC endpoint. Usually supplied through `RPC_URL` instead.
    #[serde(default)]
    pub rpc_url: Option<String>,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_command_contract")]
    pub command_contract: String,

    #[serde(default = "default_native_token")]
    pub native_token: String,

    /// Ticker shown next to native balances.
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,

    /// Prefix that a transaction hash is appended to.
    #[serde(default = "default_explorer_tx_url")]
    pub explorer_tx_url: String,

    /// Timeout for read calls and broadcasts in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Timeout for a single receipt wait in milliseconds.
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    /// Receipt polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Token approval policy: "unlimited" or "exact".
    #[serde(default = "default_approval_policy")]
    pub approval_policy: String,
}

fn default_chain_id() -> u64 {
    8453
}

fn default_command_contract() -> String {
    DEFAULT_COMMAND_CONTRACT.to_string()
}

fn default_native_token() -> String {
    DEFAULT_NATIVE_TOKEN.to_string()
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_explorer_tx_url() -> String {
    "https://basescan.org/tx/".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}

fn default_confirmation_timeout_ms() -> u64 {
    120_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_approval_policy() -> String {
    "unlimited".to_string()
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            chain_id: default_chain_id(),
            command_contract: default_command_contract(),
            native_token: default_native_token(),
            native_symbol: default_native_symbol(),
            explorer_tx_url: default_explorer_tx_url(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            approval_policy: default_approval_policy(),
        }
    }
}

/// Channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSettings {
    /// Whether the local REPL channel is enabled.
    #[serde(default = "default_true")]
    pub repl_enabled: bool,

    /// Telegram Bot API base URL.
    #[serde(default = "default_telegram_api_base_url")]
    pub telegram_api_base_url: String,

    /// Long-poll timeout for `getUpdates` in seconds.
    #[serde(default = "default_telegram_poll_timeout_secs")]
    pub telegram_poll_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_poll_timeout_secs() -> u64 {
    30
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            repl_enabled: default_true(),
            telegram_api_base_url: default_telegram_api_base_url(),
            telegram_poll_timeout_secs: default_telegram_poll_timeout_secs(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.intentbot/config.toml).
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::intentbot_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Merge values from `other` into `self`, preferring `other` for
    /// fields that differ from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let default_json = match serde_json::to_value(Self::default()) {
            Ok(v) => v,
            Err(_) => return,
        };
        let other_json = match serde_json::to_value(other) {
            Ok(v) => v,
            Err(_) => return,
        };
        let mut self_json = match serde_json::to_value(&*self) {
            Ok(v) => v,
            Err(_) => return,
        };

        merge_non_default(&mut self_json, &other_json, &default_json);

        if let Ok(merged) = serde_json::from_value(self_json) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}
