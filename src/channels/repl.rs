//! Interactive REPL channel with line editing.
//!
//! Lets an operator drive the bot from a terminal as user `default`.
//! Uses rustyline for line editing, history, and tab-completion.
//!
//! ## Commands
//!
//! - `/help` - Show available commands
//! - `/quit` or `/exit` - Exit the REPL
//! - `/debug` - Toggle debug mode (verbose status output)
//! - `/start`, `/createaccount`, `/wallet` - Same as on Telegram
//! - anything else is sent as an intent

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use regex::Regex;
use rustyline::completion::Completer;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::truncate_for_preview;
use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Max characters for thinking/status messages in the terminal.
const CLI_STATUS_MAX: usize = 200;

/// User id for every REPL message.
const REPL_USER_ID: &str = "default";

/// Slash commands available in the REPL.
const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/quit",
    "/exit",
    "/debug",
    "/start",
    "/createaccount",
    "/account",
    "/wallet",
];

/// Kind label of pipeline run summaries sent over `StatusUpdate::Status`.
const PIPELINE_STATUS_KIND: &str = "pipeline_status";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct PipelineStatusPayload {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    states: Vec<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    approval_tx: Option<String>,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    error: Option<PipelineStatusError>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct PipelineStatusError {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    funds_impact: String,
    #[serde(default)]
    message: String,
}

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

/// REPL channel with line editing.
pub struct ReplChannel {
    /// Debug mode flag (shared with input thread).
    debug_mode: Arc<AtomicBool>,
}

impl ReplChannel {
    pub fn new() -> Self {
        Self {
            debug_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_debug(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }
}

impl Default for ReplChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn print_help() {
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}intentbot REPL{r}");
    println!();
    println!("  {h}Commands{r}");
    println!("  {c}/help{r}              {d}show this help{r}");
    println!("  {c}/debug{r}             {d}toggle verbose status output{r}");
    println!("  {c}/quit{r} {c}/exit{r}        {d}exit the repl{r}");
    println!();
    println!("  {h}Account{r}");
    println!("  {c}/createaccount{r}     {d}create or show your account{r}");
    println!("  {c}/wallet{r}            {d}address and native balance{r}");
    println!();
    println!("  {h}Intents{r}");
    println!("  {d}any other text is previewed and executed on-chain{r}");
    println!();
}

/// Decode `StatusUpdate::Status` JSON payloads for pipeline runs.
fn parse_pipeline_status(msg: &str) -> Option<PipelineStatusPayload> {
    let payload: PipelineStatusPayload = serde_json::from_str(msg).ok()?;
    if payload.kind == PIPELINE_STATUS_KIND {
        Some(payload)
    } else {
        None
    }
}

fn state_style(state: &str) -> (&'static str, &'static str) {
    match state {
        "confirmed" => ("\u{25CF}", "\x1b[32m"),
        "failed" => ("\u{2717}", "\x1b[31m"),
        _ => ("\u{25CB}", "\x1b[33m"),
    }
}

fn funds_label(funds_impact: &str) -> String {
    match funds_impact {
        "untouched" => "untouched".to_string(),
        "approval_only" => "approval only".to_string(),
        "uncertain" => "uncertain, check explorer".to_string(),
        "gas_spent" => "gas spent".to_string(),
        other => other.replace('_', " "),
    }
}

fn redact_sensitive_preview(raw: &str) -> String {
    let mut value = raw.to_string();

    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|secret|password|private[_\-]?key|mnemonic)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
        (r"\b\d{6,}:[A-Za-z0-9_\-]{30,}\b", "[REDACTED]"),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}

fn build_pipeline_status_lines(payload: &PipelineStatusPayload) -> Vec<String> {
    let mut lines = Vec::new();
    let last = payload.states.last().map(String::as_str).unwrap_or("idle");
    let (icon, color) = state_style(last);
    lines.push(format!(
        "  {color}{icon} {}\x1b[0m",
        payload.states.join(" \u{2192} ")
    ));

    if let Some(account) = &payload.account {
        lines.push(format!("    \x1b[90maccount:\x1b[0m {account}"));
    }
    if let Some(approval) = &payload.approval_tx {
        lines.push(format!("    \x1b[90mapproval:\x1b[0m {approval}"));
    }
    if let Some(tx_hash) = &payload.tx_hash {
        lines.push(format!("    \x1b[90mtx:\x1b[0m {tx_hash}"));
    }

    if let Some(error) = &payload.error {
        let code = if error.code.trim().is_empty() {
            "pipeline.unclassified"
        } else {
            error.code.as_str()
        };
        let message = truncate_for_preview(&redact_sensitive_preview(&error.message), CLI_STATUS_MAX);
        lines.push(format!("  \x1b[31m\u{26A0} {}\x1b[0m", error.kind));
        lines.push(format!("    \x1b[90mcode:\x1b[0m {code}"));
        lines.push(format!(
            "    \x1b[90mfunds:\x1b[0m {}",
            funds_label(&error.funds_impact)
        ));
        lines.push(format!("    \x1b[90mmessage:\x1b[0m {message}"));
    }

    lines
}

/// Get the history file path (~/.intentbot/history).
fn history_path() -> std::path::PathBuf {
    crate::bootstrap::intentbot_dir().join("history")
}

fn separator() -> String {
    let width = crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80);
    format!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(width.min(80)))
}

#[async_trait]
impl Channel for ReplChannel {
    fn name(&self) -> &str {
        "repl"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let debug_mode = Arc::clone(&self.debug_mode);

        std::thread::spawn(move || {
            let builder = match Config::builder().history_ignore_dups(true) {
                Ok(builder) => builder,
                Err(e) => {
                    eprintln!("Failed to configure line editor: {e}");
                    return;
                }
            };
            let config = builder
                .auto_add_history(true)
                .completion_type(CompletionType::List)
                .build();

            let mut rl = match Editor::with_config(config) {
                Ok(editor) => editor,
                Err(e) => {
                    eprintln!("Failed to initialize line editor: {e}");
                    return;
                }
            };

            rl.set_helper(Some(ReplHelper));

            let hist_path = history_path();
            if let Some(parent) = hist_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = rl.load_history(&hist_path);

            println!("\x1b[1mintentbot\x1b[0m  /help for commands, /quit to exit");
            println!();

            loop {
                let prompt = if debug_mode.load(Ordering::Relaxed) {
                    "\x1b[33m[debug]\x1b[0m \x1b[1;36m\u{203A}\x1b[0m "
                } else {
                    "\x1b[1;36m\u{203A}\x1b[0m "
                };

                match rl.readline(prompt) {
                    Ok(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match line.to_lowercase().as_str() {
                            "/quit" | "/exit" => {
                                let msg = IncomingMessage::new("repl", REPL_USER_ID, "/quit");
                                let _ = tx.blocking_send(msg);
                                break;
                            }
                            "/help" => {
                                print_help();
                                continue;
                            }
                            "/debug" => {
                                let current = debug_mode.load(Ordering::Relaxed);
                                debug_mode.store(!current, Ordering::Relaxed);
                                if !current {
                                    println!("\x1b[90mdebug mode on\x1b[0m");
                                } else {
                                    println!("\x1b[90mdebug mode off\x1b[0m");
                                }
                                continue;
                            }
                            _ => {}
                        }

                        let msg = IncomingMessage::new("repl", REPL_USER_ID, line);
                        if tx.blocking_send(msg).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                        // Ctrl+C / Ctrl+D: let the agent loop run graceful shutdown
                        let msg = IncomingMessage::new("repl", REPL_USER_ID, "/quit");
                        let _ = tx.blocking_send(msg);
                        break;
                    }
                    Err(e) => {
                        eprintln!("Input error: {e}");
                        break;
                    }
                }
            }

            let _ = rl.save_history(&history_path());
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        eprintln!("{}", separator());
        println!("{}", response.content);
        println!();
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Thinking(msg) => {
                let display = truncate_for_preview(&msg, CLI_STATUS_MAX);
                eprintln!("  \x1b[90m\u{25CB} {display}\x1b[0m");
            }
            StatusUpdate::Status(msg) => {
                if let Some(payload) = parse_pipeline_status(&msg) {
                    for line in build_pipeline_status_lines(&payload) {
                        eprintln!("{line}");
                    }
                } else if self.is_debug() {
                    let display =
                        truncate_for_preview(&redact_sensitive_preview(&msg), CLI_STATUS_MAX);
                    eprintln!("  \x1b[90m{display}\x1b[0m");
                }
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
