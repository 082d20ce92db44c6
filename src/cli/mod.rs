//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::chain::EvmChainClient;
use crate::config::Config;
use crate::pipeline::{ChainReader, render_preview};

#[derive(Parser, Debug)]
#[command(name = "intentbot", version, about = "Execute on-chain intents from chat")]
pub struct Cli {
    /// TOML config file (default: ~/.intentbot/config.toml)
    #[arg(long, global = true, env = "INTENTBOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the bot on every configured channel (default)
    Run {
        /// Do not start the terminal REPL
        #[arg(long)]
        no_repl: bool,

        /// Do not start Telegram even if a bot token is set
        #[arg(long)]
        no_telegram: bool,
    },

    /// Preview an intent against the command contract without sending anything
    Preview {
        /// Intent text, e.g. "swap 10 USDC for ETH"
        #[arg(required = true, num_args = 1..)]
        intent: Vec<String>,
    },
}

impl Cli {
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run {
            no_repl: false,
            no_telegram: false,
        })
    }
}

/// `intentbot preview`: read-only, no account involved.
pub async fn run_preview_command(config: &Config, intent: &str) -> anyhow::Result<()> {
    let client = Arc::new(EvmChainClient::new(&config.chain)?);
    let reader = ChainReader::new(client, config.chain.rpc_timeout);

    let preview = reader.preview(intent).await?;
    println!("Preview: {}", render_preview(&preview));
    if preview.payment_token() == config.chain.native_token {
        println!(
            "Payment: {} {} attached as value",
            ethers::utils::format_ether(preview.required_amount()),
            config.chain.native_symbol
        );
    } else {
        println!(
            "Payment: {} base units of {}",
            preview.required_amount(),
            ethers::utils::to_checksum(&preview.payment_token(), None)
        );
    }
    Ok(())
}
