//! Error types for intentbot.

use std::time::Duration;

use ethers::types::TxHash;
use serde::Serialize;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Channel {0} not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors surfaced by the chain client (RPC transport and contract calls).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Contract call reverted: {0}")]
    Reverted(String),

    /// The node answered with a JSON-RPC error instead of accepting the request.
    #[error("Request rejected by node: {0}")]
    Rejected(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction {0:#x} was dropped before confirmation")]
    Dropped(TxHash),

    #[error("Invalid contract response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Whether this error, returned by a broadcast, proves the transaction
    /// never reached the network. Transport failures do not: the request may
    /// have been accepted before the connection died.
    pub fn is_definite_rejection(&self) -> bool {
        matches!(self, Self::Reverted(_) | Self::Rejected(_) | Self::Signing(_))
    }
}

/// Ephemeral account custody errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VaultError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// What a failed run did to the user's funds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FundsImpact {
    /// No value-moving transaction was sent.
    Untouched,
    /// An approval was confirmed but nothing was executed.
    ApprovalOnly,
    /// A transaction may or may not have landed.
    Uncertain,
    /// The execution transaction was mined and reverted.
    GasSpent,
}

/// Stage failures of the intent pipeline.
///
/// Each variant is produced by exactly one stage and carries the underlying
/// message verbatim. None of them are retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Account creation failed: {0}")]
    AccountCreationFailed(String),

    #[error("Preview failed: {0}")]
    PreviewFailed(String),

    #[error("Allowance check failed: {0}")]
    AllowanceCheckFailed(String),

    #[error("Approval submission failed: {0}")]
    ApprovalSubmissionFailed(String),

    #[error("Approval {tx_hash:#x} not confirmed: {reason}")]
    ApprovalNotConfirmed { tx_hash: TxHash, reason: String },

    #[error("Submission failed: {reason}")]
    SubmissionFailed {
        reason: String,
        /// The broadcast call itself timed out, so the transaction may exist.
        broadcast_uncertain: bool,
    },

    #[error("Execution reverted in transaction {tx_hash:#x}")]
    ExecutionReverted { tx_hash: TxHash },

    #[error("Confirmation of {tx_hash:#x} failed after {timeout:?}: {reason}")]
    ConfirmationTimeout {
        tx_hash: TxHash,
        timeout: Duration,
        reason: String,
    },
}

impl PipelineError {
    /// Kind name shown to users.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountCreationFailed(_) => "AccountCreationFailed",
            Self::PreviewFailed(_) => "PreviewFailed",
            Self::AllowanceCheckFailed(_) => "AllowanceCheckFailed",
            Self::ApprovalSubmissionFailed(_) => "ApprovalSubmissionFailed",
            Self::ApprovalNotConfirmed { .. } => "ApprovalNotConfirmed",
            Self::SubmissionFailed { .. } => "SubmissionFailed",
            Self::ExecutionReverted { .. } => "ExecutionReverted",
            Self::ConfirmationTimeout { .. } => "ConfirmationTimeout",
        }
    }

    /// Stable machine-readable code for logs and status payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountCreationFailed(_) => "vault.account_creation_failed",
            Self::PreviewFailed(_) => "preview.failed",
            Self::AllowanceCheckFailed(_) => "allowance.check_failed",
            Self::ApprovalSubmissionFailed(_) => "approval.submission_failed",
            Self::ApprovalNotConfirmed { .. } => "approval.not_confirmed",
            Self::SubmissionFailed { .. } => "execution.submission_failed",
            Self::ExecutionReverted { .. } => "execution.reverted",
            Self::ConfirmationTimeout { .. } => "execution.confirmation_timeout",
        }
    }

    /// Whether value may have left the account, independent of any approval.
    ///
    /// Never returns [`FundsImpact::ApprovalOnly`]; that needs run context.
    pub fn funds_impact(&self) -> FundsImpact {
        match self {
            Self::AccountCreationFailed(_)
            | Self::PreviewFailed(_)
            | Self::AllowanceCheckFailed(_)
            | Self::ApprovalSubmissionFailed(_)
            | Self::ApprovalNotConfirmed { .. } => FundsImpact::Untouched,
            Self::SubmissionFailed {
                broadcast_uncertain,
                ..
            } => {
                if *broadcast_uncertain {
                    FundsImpact::Uncertain
                } else {
                    FundsImpact::Untouched
                }
            }
            Self::ExecutionReverted { .. } => FundsImpact::GasSpent,
            Self::ConfirmationTimeout { .. } => FundsImpact::Uncertain,
        }
    }

    /// Hash of the transaction this failure refers to, when one was broadcast.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::ApprovalNotConfirmed { tx_hash, .. }
            | Self::ExecutionReverted { tx_hash }
            | Self::ConfirmationTimeout { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    /// Structured payload for status consumers.
    pub fn to_error_payload(&self) -> PipelineErrorPayload {
        PipelineErrorPayload {
            kind: self.kind(),
            code: self.code(),
            funds_impact: self.funds_impact(),
            tx_hash: self.tx_hash().map(|hash| format!("{hash:#x}")),
            message: self.to_string(),
        }
    }
}

/// Structured failure payload emitted alongside the human-readable result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PipelineErrorPayload {
    pub kind: &'static str,
    pub code: &'static str,
    pub funds_impact: FundsImpact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub message: String,
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_before_broadcast_leave_funds_untouched() {
        let cases = [
            PipelineError::AccountCreationFailed("entropy".to_string()),
            PipelineError::PreviewFailed("unknown command".to_string()),
            PipelineError::AllowanceCheckFailed("rpc down".to_string()),
            PipelineError::ApprovalSubmissionFailed("rejected".to_string()),
            PipelineError::SubmissionFailed {
                reason: "insufficient funds for gas".to_string(),
                broadcast_uncertain: false,
            },
        ];

        for err in cases {
            assert_eq!(err.funds_impact(), FundsImpact::Untouched, "{}", err.kind());
            assert!(err.tx_hash().is_none());
        }
    }

    #[test]
    fn broadcast_failures_are_not_reported_as_untouched() {
        let hash = TxHash::repeat_byte(0xab);

        let timeout = PipelineError::ConfirmationTimeout {
            tx_hash: hash,
            timeout: Duration::from_secs(120),
            reason: "deadline elapsed".to_string(),
        };
        assert_eq!(timeout.funds_impact(), FundsImpact::Uncertain);
        assert_eq!(timeout.tx_hash(), Some(hash));

        let reverted = PipelineError::ExecutionReverted { tx_hash: hash };
        assert_eq!(reverted.funds_impact(), FundsImpact::GasSpent);

        let uncertain = PipelineError::SubmissionFailed {
            reason: "broadcast timed out".to_string(),
            broadcast_uncertain: true,
        };
        assert_eq!(uncertain.funds_impact(), FundsImpact::Uncertain);
    }

    #[test]
    fn serializes_error_payload() {
        let err = PipelineError::ExecutionReverted {
            tx_hash: TxHash::repeat_byte(0x11),
        };
        let value = serde_json::to_value(err.to_error_payload()).expect("valid json");

        assert_eq!(value["kind"], "ExecutionReverted");
        assert_eq!(value["code"], "execution.reverted");
        assert_eq!(value["funds_impact"], "gas_spent");
        assert_eq!(
            value["tx_hash"],
            format!("0x{}", "11".repeat(32)).as_str()
        );
    }

    #[test]
    fn wraps_stage_errors_in_top_level_error() {
        let err = Error::from(PipelineError::PreviewFailed("unknown command".to_string()));
        assert_eq!(
            err.to_string(),
            "Pipeline error: Preview failed: unknown command"
        );
    }
}
