use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intentbot::agent::Agent;
use intentbot::chain::EvmChainClient;
use intentbot::channels::{ChannelManager, ReplChannel, TelegramChannel};
use intentbot::cli::{Cli, Command, run_preview_command};
use intentbot::config::{ApprovalPolicy, Config};
use intentbot::pipeline::IntentPipeline;
use intentbot::vault::InMemoryAccountStore;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "intentbot=info".into()),
    );
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr so REPL output on stdout stays readable.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Env files first so RUST_LOG and LOG_FORMAT from them apply, then the
    // subscriber, so config resolution is logged.
    let _ = dotenvy::dotenv();
    intentbot::bootstrap::load_intentbot_env();
    init_tracing();

    let config = Config::from_env_with_toml(cli.config.as_deref())?;

    match cli.resolved_command() {
        Command::Preview { intent } => run_preview_command(&config, &intent.join(" ")).await,
        Command::Run {
            no_repl,
            no_telegram,
        } => run_bot(config, no_repl, no_telegram).await,
    }
}

async fn run_bot(config: Config, no_repl: bool, no_telegram: bool) -> anyhow::Result<()> {
    if config.chain.approval_policy == ApprovalPolicy::Unlimited {
        tracing::warn!(
            "approval policy is 'unlimited': token shortfalls are approved for the maximum \
             amount. Set APPROVAL_POLICY=exact to approve only the previewed amount."
        );
    }

    let client = Arc::new(EvmChainClient::new(&config.chain)?);
    let accounts = Arc::new(InMemoryAccountStore::new());
    let pipeline = Arc::new(IntentPipeline::new(client, accounts, &config.chain));

    let mut channels = ChannelManager::new();
    if let Some(telegram) = config.channels.telegram.as_ref().filter(|_| !no_telegram) {
        channels.add(Arc::new(TelegramChannel::new(telegram)?));
    }
    if config.channels.repl_enabled && !no_repl {
        channels.add(Arc::new(ReplChannel::new()));
    }
    if channels.is_empty() {
        anyhow::bail!(
            "no channels enabled: set BOT_TOKEN for Telegram or enable the REPL (CLI_ENABLED=true)"
        );
    }

    tracing::info!(
        chain_id = config.chain.chain_id,
        contract = %format!("{:#x}", config.chain.command_contract),
        policy = config.chain.approval_policy.as_str(),
        "intentbot starting"
    );

    Agent::new(
        Arc::new(channels),
        pipeline,
        config.chain.native_symbol.clone(),
    )
    .run()
    .await?;
    Ok(())
}
