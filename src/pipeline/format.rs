//! Human-readable rendering of a pipeline run.

use ethers::types::TxHash;
use ethers::utils::to_checksum;

use super::PipelineReport;
use crate::chain::CommandPreview;
use crate::error::{FundsImpact, PipelineError};

/// Renders run reports into chat replies.
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    explorer_tx_url: String,
}

impl ResultFormatter {
    pub fn new(explorer_tx_url: impl Into<String>) -> Self {
        Self {
            explorer_tx_url: explorer_tx_url.into(),
        }
    }

    pub fn explorer_link(&self, tx_hash: TxHash) -> String {
        format!("{}{tx_hash:#x}", self.explorer_tx_url)
    }

    pub fn render(&self, report: &PipelineReport) -> String {
        let mut lines = Vec::new();

        if let Some(preview) = &report.preview {
            lines.push(format!("Preview: {}", render_preview(preview)));
        }
        if let Some(approval) = &report.approval {
            lines.push(format!(
                "Approval confirmed: {:#x}",
                approval.transaction_hash
            ));
        }

        match &report.outcome {
            Ok(receipt) => {
                lines.push(format!(
                    "Transaction successful: {:#x}",
                    receipt.transaction_hash
                ));
                lines.push(format!(
                    "View on explorer: {}",
                    self.explorer_link(receipt.transaction_hash)
                ));
            }
            Err(err) => {
                lines.push(format!("Error ({}): {}", err.kind(), err));
                lines.push(funds_statement(err, report.funds_impact()));
                if let Some(tx_hash) = err.tx_hash() {
                    lines.push(format!("Transaction: {}", self.explorer_link(tx_hash)));
                }
            }
        }

        lines.join("\n")
    }
}

/// Preview fields in contract order: checksummed addresses, decimal amounts, hex bytes.
pub fn render_preview(preview: &CommandPreview) -> String {
    let fields = [
        to_checksum(&preview.to, None),
        preview.amount.to_string(),
        preview.min_amount_out.to_string(),
        to_checksum(&preview.token, None),
        preview.call_data.to_string(),
        preview.execute_call_data.to_string(),
    ];
    serde_json::to_string(&fields).unwrap_or_else(|_| format!("{fields:?}"))
}

fn funds_statement(err: &PipelineError, impact: Option<FundsImpact>) -> String {
    match (impact, err) {
        (_, PipelineError::ApprovalNotConfirmed { .. }) => {
            "The approval was sent but not confirmed, so nothing was executed. \
             No funds left your account."
                .to_string()
        }
        (Some(FundsImpact::ApprovalOnly), _) => {
            "An approval completed but nothing was executed. No funds left your account."
                .to_string()
        }
        (Some(FundsImpact::Uncertain), PipelineError::SubmissionFailed { .. }) => {
            "The transaction may have been broadcast. Check your account on the explorer \
             before trying again."
                .to_string()
        }
        (Some(FundsImpact::Uncertain), _) => {
            "A transaction was sent but could not be confirmed. Check the explorer before \
             trying again."
                .to_string()
        }
        (Some(FundsImpact::GasSpent), _) => {
            "The transaction was sent but failed. The payment was not transferred; \
             only gas was spent."
                .to_string()
        }
        (Some(FundsImpact::Untouched), _) | (None, _) => {
            "No transaction was sent. No funds left your account.".to_string()
        }
    }
}
