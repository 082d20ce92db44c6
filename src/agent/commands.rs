//! Bot command handlers.
//!
//! Each handler returns the reply text; sending it is the agent loop's job.

use ethers::utils::{format_ether, to_checksum};

use crate::pipeline::IntentPipeline;
use crate::vault::UserId;

pub const WELCOME_TEXT: &str = "Welcome! Send an intent in plain text (for example \
\"swap 10 USDC for ETH\") and I will preview it, approve the payment token if needed, \
and execute it on-chain.\nUse /createaccount to see your account address first.";

pub const HELP_TEXT: &str = "Commands:\n\
/start - welcome message\n\
/createaccount - create or show your account\n\
/wallet - your address and balance\n\
/help - this message\n\n\
Any other message is treated as an intent.";

pub const PROCESSING_TEXT: &str = "Processing your request...";

/// Show the sender's account, creating it if this is their first contact.
///
/// An existing account is never replaced.
pub async fn create_account(pipeline: &IntentPipeline, user_id: &UserId) -> String {
    let accounts = pipeline.accounts();
    if let Some(existing) = accounts.get(user_id).await {
        return format!(
            "You already have an account.\nAddress: {}",
            to_checksum(&existing.address(), None)
        );
    }

    match accounts.get_or_create(user_id).await {
        Ok(account) => format!(
            "New account created!\nAddress: {}\n\nFund it before sending intents.",
            to_checksum(&account.address(), None)
        ),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "account creation failed");
            format!("Could not create an account: {e}")
        }
    }
}

/// Address and native balance of the sender's account.
pub async fn wallet(pipeline: &IntentPipeline, user_id: &UserId, native_symbol: &str) -> String {
    let account = match pipeline.accounts().get_or_create(user_id).await {
        Ok(account) => account,
        Err(e) => return format!("Could not create an account: {e}"),
    };
    let address = to_checksum(&account.address(), None);

    match pipeline.reader().native_balance(account.address()).await {
        Ok(balance) => format!(
            "Your wallet address: {address}\n\
             {native_symbol} Balance: {} {native_symbol}\n\n\
             Use this address for transactions within the bot.",
            format_ether(balance)
        ),
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "balance lookup failed");
            format!("Your wallet address: {address}\nBalance unavailable: {e}")
        }
    }
}

pub fn unknown_command(command: &str) -> String {
    format!("Unknown command: /{command}. Use /help to see what I can do.")
}
