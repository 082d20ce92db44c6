//! Agent loop: receives chat messages, routes them, and replies.

pub mod commands;
mod router;

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::error::Error;
use crate::pipeline::IntentPipeline;
use crate::vault::UserId;

pub use self::router::{MessageIntent, Router};

/// Truncate `text` to at most `max` characters, marking the cut.
pub fn truncate_for_preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Shared state for message handlers.
struct Handler {
    channels: Arc<ChannelManager>,
    pipeline: Arc<IntentPipeline>,
    native_symbol: String,
    shutdown: Arc<Notify>,
}

impl Handler {
    async fn reply(&self, msg: &IncomingMessage, text: impl Into<String>) {
        if let Err(e) = self.channels.respond(msg, OutgoingResponse::text(text)).await {
            tracing::warn!(channel = %msg.channel, error = %e, "failed to send reply");
        }
    }

    async fn status(&self, msg: &IncomingMessage, status: StatusUpdate) {
        if let Err(e) = self.channels.send_status(msg, status).await {
            tracing::debug!(channel = %msg.channel, error = %e, "failed to send status");
        }
    }

    async fn handle(&self, msg: IncomingMessage, intent: MessageIntent) {
        let user_id = UserId::new(msg.user_id.clone());
        tracing::debug!(
            channel = %msg.channel,
            user_id = %user_id,
            intent = %intent.status_label(),
            "handling message"
        );

        match intent {
            MessageIntent::Start => self.reply(&msg, commands::WELCOME_TEXT).await,
            MessageIntent::Help => self.reply(&msg, commands::HELP_TEXT).await,
            MessageIntent::CreateAccount => {
                let text = commands::create_account(&self.pipeline, &user_id).await;
                self.reply(&msg, text).await;
            }
            MessageIntent::Wallet => {
                let text = commands::wallet(&self.pipeline, &user_id, &self.native_symbol).await;
                self.reply(&msg, text).await;
            }
            MessageIntent::Quit => {
                tracing::info!(channel = %msg.channel, "quit requested");
                self.shutdown.notify_one();
            }
            MessageIntent::Unknown { command } => {
                self.reply(&msg, commands::unknown_command(&command)).await;
            }
            MessageIntent::Intent { text } => {
                self.reply(&msg, commands::PROCESSING_TEXT).await;
                self.status(&msg, StatusUpdate::Thinking(commands::PROCESSING_TEXT.to_string()))
                    .await;

                let report = self.pipeline.run(&user_id, &text).await;

                self.status(
                    &msg,
                    StatusUpdate::Status(report.to_status_payload().to_string()),
                )
                .await;
                self.reply(&msg, self.pipeline.render(&report)).await;
            }
        }
    }
}

/// Drives all channels and dispatches each message on its own task.
pub struct Agent {
    router: Router,
    handler: Arc<Handler>,
}

impl Agent {
    pub fn new(
        channels: Arc<ChannelManager>,
        pipeline: Arc<IntentPipeline>,
        native_symbol: impl Into<String>,
    ) -> Self {
        Self {
            router: Router::new(),
            handler: Arc::new(Handler {
                channels,
                pipeline,
                native_symbol: native_symbol.into(),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// Handle for requesting shutdown from outside the loop.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.handler.shutdown)
    }

    /// Run until Ctrl-C, `/quit`, or every stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run until `stop` resolves, `/quit`, or every stream ends.
    ///
    /// `stop` is polled for the whole loop, so a signal that fires while a
    /// message is being dispatched is still observed.
    pub async fn run_until<F>(self, stop: F) -> Result<(), Error>
    where
        F: Future,
    {
        let mut stream = self.handler.channels.start_all().await?;
        let mut tasks = JoinSet::new();
        let shutdown = Arc::clone(&self.handler.shutdown);
        tokio::pin!(stop);

        tracing::info!(channels = ?self.handler.channels.names(), "agent started");

        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("stop signal received, shutting down");
                    break;
                }
                _ = shutdown.notified() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "message handler panicked");
                    }
                }
                next = stream.next() => {
                    let Some(msg) = next else {
                        tracing::info!("all channel streams ended");
                        break;
                    };
                    let Some(intent) = self.router.route(&msg) else {
                        continue;
                    };
                    // Each message runs on its own task so an in-flight
                    // transaction is never dropped with the caller.
                    let handler = Arc::clone(&self.handler);
                    tasks.spawn(async move { handler.handle(msg, intent).await });
                }
            }
        }

        if !tasks.is_empty() {
            tracing::info!(in_flight = tasks.len(), "waiting for in-flight runs");
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "message handler panicked");
                }
            }
        }

        self.handler.channels.shutdown_all().await;
        Ok(())
    }
}
