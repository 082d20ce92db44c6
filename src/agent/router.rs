//! Message routing to appropriate handlers.
//!
//! Messages starting with the command prefix are bot commands; every other
//! non-empty message is an intent for the pipeline.

use crate::channels::IncomingMessage;

/// What an incoming message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageIntent {
    /// Welcome text.
    Start,
    Help,
    /// Get or create the sender's account and show its address.
    CreateAccount,
    /// Address plus native balance.
    Wallet,
    /// Stop the bot (REPL only).
    Quit,
    /// A `/command` the bot does not know.
    Unknown { command: String },
    /// Free-form text for the intent pipeline.
    Intent { text: String },
}

impl MessageIntent {
    /// Short label for logs.
    pub fn status_label(&self) -> String {
        match self {
            Self::Start => "command.start".to_string(),
            Self::Help => "command.help".to_string(),
            Self::CreateAccount => "command.createaccount".to_string(),
            Self::Wallet => "command.wallet".to_string(),
            Self::Quit => "command.quit".to_string(),
            Self::Unknown { command } => format!("command.unknown.{command}"),
            Self::Intent { .. } => "intent".to_string(),
        }
    }
}

/// Routes messages to handlers based on explicit commands.
pub struct Router {
    /// Command prefix (e.g., "/" or "!")
    command_prefix: String,
}

impl Router {
    pub fn new() -> Self {
        Self {
            command_prefix: "/".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn is_command(&self, message: &IncomingMessage) -> bool {
        message.content.trim().starts_with(&self.command_prefix)
    }

    /// Classify a message. Returns `None` for blank messages.
    pub fn route(&self, message: &IncomingMessage) -> Option<MessageIntent> {
        let content = message.content.trim();
        if content.is_empty() {
            return None;
        }

        if content.starts_with(&self.command_prefix) {
            Some(self.parse_command(content))
        } else {
            Some(MessageIntent::Intent {
                text: content.to_string(),
            })
        }
    }

    fn parse_command(&self, content: &str) -> MessageIntent {
        let without_prefix = content
            .strip_prefix(&self.command_prefix)
            .unwrap_or(content);
        let first = without_prefix.split_whitespace().next().unwrap_or_default();
        // Telegram group chats address commands as `/start@botname`.
        let command = first
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match command.as_str() {
            "start" => MessageIntent::Start,
            "help" => MessageIntent::Help,
            "createaccount" | "account" => MessageIntent::CreateAccount,
            "wallet" => MessageIntent::Wallet,
            "quit" | "exit" => MessageIntent::Quit,
            _ => MessageIntent::Unknown { command },
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
