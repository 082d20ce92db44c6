//! Telegram Bot API channel using long polling.
//!
//! The chat id is the user id, so each Telegram chat owns one account.
//! The bot token is part of every request URL; request errors are stripped
//! of their URL before they are logged or returned.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";

/// Telegram rejects messages longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

/// Thin Bot API client shared by the poller and the reply path.
#[derive(Clone)]
struct BotApi {
    http: reqwest::Client,
    base_url: String,
    token: secrecy::SecretString,
}

impl BotApi {
    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.without_url().to_string()))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.without_url().to_string()))?;

        into_result(method, parsed)
    }
}

fn into_result<T>(method: &str, response: ApiResponse<T>) -> Result<T, ChannelError> {
    match (response.ok, response.result) {
        (true, Some(result)) => Ok(result),
        (_, _) => Err(ChannelError::SendFailed {
            name: CHANNEL_NAME.to_string(),
            reason: format!(
                "{method}: {}",
                response
                    .description
                    .unwrap_or_else(|| "request rejected".to_string())
            ),
        }),
    }
}

/// Telegram long-poll channel.
pub struct TelegramChannel {
    api: BotApi,
    poll_timeout_secs: u64,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            api: BotApi {
                http,
                base_url: config.api_base_url.clone(),
                token: config.bot_token.clone(),
            },
            poll_timeout_secs: config.poll_timeout_secs,
            poller: Mutex::new(None),
        })
    }
}

/// Turn a text update into an inbound message; other updates are skipped.
fn to_incoming(update: Update) -> Option<IncomingMessage> {
    let message = update.message?;
    let text = message.text?;
    let chat_id = message.chat.id;
    let username = message.from.and_then(|u| u.username);

    Some(
        IncomingMessage::new(CHANNEL_NAME, chat_id.to_string(), text).with_metadata(
            serde_json::json!({
                "chat_id": chat_id,
                "update_id": update.update_id,
                "username": username,
            }),
        ),
    )
}

fn chat_id_of(msg: &IncomingMessage) -> Result<i64, ChannelError> {
    msg.metadata
        .get("chat_id")
        .and_then(serde_json::Value::as_i64)
        .or_else(|| msg.user_id.parse().ok())
        .ok_or_else(|| ChannelError::InvalidMessage(format!("no chat id for message {}", msg.id)))
}

/// Split `text` into chunks Telegram accepts, preferring line breaks.
fn chunk_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > MAX_MESSAGE_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > MAX_MESSAGE_CHARS {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(MAX_MESSAGE_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn poll_updates(api: BotApi, poll_timeout_secs: u64, tx: mpsc::Sender<IncomingMessage>) {
    let mut offset: i64 = 0;

    loop {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": poll_timeout_secs,
            "allowed_updates": ["message"],
        });

        match api.call::<Vec<Update>>("getUpdates", body).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(msg) = to_incoming(update)
                        && tx.send(msg).await.is_err()
                    {
                        tracing::debug!("telegram receiver dropped, stopping poller");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "telegram poll failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let me: BotUser = self
            .api
            .call("getMe", serde_json::json!({}))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(
            bot = me.username.as_deref().unwrap_or("unknown"),
            "telegram bot connected"
        );

        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(poll_updates(self.api.clone(), self.poll_timeout_secs, tx));

        if let Ok(mut poller) = self.poller.lock()
            && let Some(previous) = poller.replace(handle)
        {
            previous.abort();
        }

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id_of(msg)?;
        for chunk in chunk_message(&response.content) {
            let _: serde_json::Value = self
                .api
                .call(
                    "sendMessage",
                    serde_json::json!({ "chat_id": chat_id, "text": chunk }),
                )
                .await?;
        }
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let StatusUpdate::Thinking(_) = status else {
            return Ok(());
        };
        let Some(chat_id) = metadata.get("chat_id").and_then(serde_json::Value::as_i64) else {
            return Ok(());
        };

        let _: bool = self
            .api
            .call(
                "sendChatAction",
                serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let _: BotUser = self.api.call("getMe", serde_json::json!({})).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        if let Ok(mut poller) = self.poller.lock()
            && let Some(handle) = poller.take()
        {
            handle.abort();
        }
        Ok(())
    }
}
