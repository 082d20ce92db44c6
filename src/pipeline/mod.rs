//! The intent execution pipeline.
//!
//! A run moves strictly forward through
//! `Idle -> Previewing -> Reconciling -> Submitting -> Confirmed | Failed`.
//! The first stage failure ends the run; nothing is retried and nothing
//! already sent is compensated.

mod allowance;
mod format;
mod reader;
mod submitter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::chain::{ChainClient, CommandPreview, TxReceipt};
use crate::config::ChainConfig;
use crate::error::{ChainError, FundsImpact, PipelineError};
use crate::vault::{AccountStore, UserId};

pub use self::allowance::{AllowanceReconciler, approval_amount};
pub use self::format::{ResultFormatter, render_preview};
pub use self::reader::ChainReader;
pub use self::submitter::IntentSubmitter;

/// Stage of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Previewing,
    Reconciling,
    Submitting,
    Confirmed,
    Failed,
}

/// Everything a run observed, in the order it happened.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub user_id: UserId,
    pub account: Option<Address>,
    pub preview: Option<CommandPreview>,
    pub approval: Option<TxReceipt>,
    /// Visited states, starting at `Idle` and ending at `Confirmed` or `Failed`.
    pub states: Vec<PipelineState>,
    pub outcome: Result<TxReceipt, PipelineError>,
}

impl PipelineReport {
    pub fn final_state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Funds impact of a failed run, accounting for a completed approval.
    pub fn funds_impact(&self) -> Option<FundsImpact> {
        let err = self.outcome.as_ref().err()?;
        match err.funds_impact() {
            FundsImpact::Untouched if self.approval.is_some() => Some(FundsImpact::ApprovalOnly),
            impact => Some(impact),
        }
    }

    /// Structured run summary for logs and status consumers.
    pub fn to_status_payload(&self) -> serde_json::Value {
        let mut error = self.outcome.as_ref().err().map(|e| e.to_error_payload());
        if let (Some(payload), Some(impact)) = (error.as_mut(), self.funds_impact()) {
            payload.funds_impact = impact;
        }

        serde_json::json!({
            "kind": "pipeline_status",
            "run_id": self.run_id.to_string(),
            "user_id": self.user_id.as_str(),
            "account": self.account.map(|a| format!("{a:#x}")),
            "states": self.states,
            "approval_tx": self.approval.as_ref().map(|r| format!("{:#x}", r.transaction_hash)),
            "tx_hash": self.outcome.as_ref().ok().map(|r| format!("{:#x}", r.transaction_hash)),
            "error": error,
        })
    }
}

/// Serializes runs per user while letting different users proceed in parallel.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(user_id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Composes account custody, chain reads, allowance reconciliation, and
/// submission into one run per intent.
pub struct IntentPipeline {
    accounts: Arc<dyn AccountStore>,
    reader: ChainReader,
    reconciler: AllowanceReconciler,
    submitter: IntentSubmitter,
    formatter: ResultFormatter,
    command_contract: Address,
    native_token: Address,
    locks: UserLocks,
}

impl IntentPipeline {
    pub fn new(
        client: Arc<dyn ChainClient>,
        accounts: Arc<dyn AccountStore>,
        config: &ChainConfig,
    ) -> Self {
        let reader = ChainReader::new(Arc::clone(&client), config.rpc_timeout);
        let reconciler = AllowanceReconciler::new(
            Arc::clone(&client),
            reader.clone(),
            config.native_token,
            config.approval_policy,
            config.rpc_timeout,
            config.confirmation_timeout,
        );
        let submitter = IntentSubmitter::new(
            client,
            config.rpc_timeout,
            config.confirmation_timeout,
        );

        Self {
            accounts,
            reader,
            reconciler,
            submitter,
            formatter: ResultFormatter::new(config.explorer_tx_url.clone()),
            command_contract: config.command_contract,
            native_token: config.native_token,
            locks: UserLocks::default(),
        }
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    pub fn reader(&self) -> &ChainReader {
        &self.reader
    }

    pub fn formatter(&self) -> &ResultFormatter {
        &self.formatter
    }

    /// Execute one intent for `user_id`, creating their account on first use.
    ///
    /// Runs for the same user are serialized for their whole duration.
    pub async fn run(&self, user_id: &UserId, intent: &str) -> PipelineReport {
        let _guard = self.locks.acquire(user_id).await;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("intent_run", %run_id, user_id = %user_id);

        async {
            let mut trace = RunTrace::default();
            let outcome = self.drive(user_id, intent, &mut trace).await;

            match &outcome {
                Ok(receipt) => {
                    trace.states.push(PipelineState::Confirmed);
                    tracing::info!(
                        tx_hash = %format!("{:#x}", receipt.transaction_hash),
                        "intent confirmed"
                    );
                }
                Err(err) => {
                    trace.states.push(PipelineState::Failed);
                    tracing::warn!(
                        kind = err.kind(),
                        code = err.code(),
                        error = %err,
                        "intent failed"
                    );
                }
            }

            PipelineReport {
                run_id,
                user_id: user_id.clone(),
                account: trace.account,
                preview: trace.preview,
                approval: trace.approval,
                states: trace.states,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    pub fn render(&self, report: &PipelineReport) -> String {
        self.formatter.render(report)
    }

    /// [`run`](Self::run) followed by [`render`](Self::render).
    pub async fn run_and_render(&self, user_id: &UserId, intent: &str) -> String {
        let report = self.run(user_id, intent).await;
        self.render(&report)
    }

    async fn drive(
        &self,
        user_id: &UserId,
        intent: &str,
        trace: &mut RunTrace,
    ) -> Result<TxReceipt, PipelineError> {
        let account = self
            .accounts
            .get_or_create(user_id)
            .await
            .map_err(|e| PipelineError::AccountCreationFailed(e.to_string()))?;
        trace.account = Some(account.address());

        trace.states.push(PipelineState::Previewing);
        let preview = self.reader.preview(intent).await?;
        trace.preview = Some(preview.clone());

        let token = preview.payment_token();
        let required = preview.required_amount();
        tracing::debug!(
            stage = "preview",
            token = %format!("{token:#x}"),
            %required,
            "intent previewed"
        );

        trace.states.push(PipelineState::Reconciling);
        trace.approval = self
            .reconciler
            .ensure(token, self.command_contract, required, &account)
            .await?;

        trace.states.push(PipelineState::Submitting);
        let value = if token == self.native_token {
            required
        } else {
            U256::zero()
        };
        self.submitter.execute(intent, value, &account).await
    }
}

struct RunTrace {
    account: Option<Address>,
    preview: Option<CommandPreview>,
    approval: Option<TxReceipt>,
    states: Vec<PipelineState>,
}

impl Default for RunTrace {
    fn default() -> Self {
        Self {
            account: None,
            preview: None,
            approval: None,
            states: vec![PipelineState::Idle],
        }
    }
}

/// Why a receipt wait did not produce a receipt.
pub(crate) enum WaitFailure {
    TimedOut,
    Chain(ChainError),
}

pub(crate) async fn wait_for_confirmation(
    client: &dyn ChainClient,
    tx_hash: TxHash,
    timeout: Duration,
) -> Result<TxReceipt, WaitFailure> {
    match tokio::time::timeout(timeout, client.wait_for_receipt(tx_hash)).await {
        Ok(Ok(receipt)) => Ok(receipt),
        Ok(Err(e)) => Err(WaitFailure::Chain(e)),
        Err(_) => Err(WaitFailure::TimedOut),
    }
}

/// Revert reasons are surfaced as-is; other chain errors keep their context.
pub(crate) fn chain_message(err: &ChainError) -> String {
    match err {
        ChainError::Reverted(reason) => reason.clone(),
        other => other.to_string(),
    }
}
