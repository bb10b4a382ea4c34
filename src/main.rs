use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur_gateway::daemon::{telegram_channel, webhook_reconciler};
use murmur_gateway::supervisor::ReconcileOutcome;
use murmur_gateway::{Config, Daemon, ModelProvider, ResponseSynthesizer};

/// Murmur - messaging bot gateway for casual chat replies
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Port to listen on (overrides PORT and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Config file (default: ~/.config/murmur/config.toml)
    #[arg(short, long, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Generate one reply and print it
    Generate {
        /// Message to answer
        prompt: String,
    },
    /// Run one Telegram webhook reconciliation pass
    ReconcileWebhook,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,murmur_gateway=info",
        1 => "info,murmur_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(port = config.server.port, "starting murmur gateway");
            Daemon::new(config).run().await?;
        }
        Command::Generate { prompt } => generate(config, &prompt).await?,
        Command::ReconcileWebhook => reconcile_webhook(&config).await?,
    }

    Ok(())
}

async fn generate(config: Config, prompt: &str) -> anyhow::Result<()> {
    let provider = Arc::new(ModelProvider::from_config(&config.model)?);
    let handle = provider.ensure_ready().await?;
    tracing::info!(model = handle.id(), origin = handle.origin().as_str(), "model ready");

    let synthesizer = ResponseSynthesizer::new(provider, config.generation);
    let request = synthesizer.request(prompt);
    let generation = synthesizer.generate_request(&request).await;

    tracing::info!(
        style = request.style.as_str(),
        attempts = generation.attempts,
        source = ?generation.source,
        "reply generated"
    );
    println!("{}", generation.text);
    Ok(())
}

async fn reconcile_webhook(config: &Config) -> anyhow::Result<()> {
    let telegram_config = config
        .telegram
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;

    let telegram = telegram_channel(telegram_config).await;
    let reconciler = webhook_reconciler(telegram_config, telegram)
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_WEBHOOK_URL is not set"))?;

    match reconciler.reconcile_once().await? {
        ReconcileOutcome::Verified => {
            println!("webhook verified: {}", reconciler.expected_url());
        }
        ReconcileOutcome::Repaired { previous } => {
            println!(
                "webhook repaired: {} (was {})",
                reconciler.expected_url(),
                previous.as_deref().unwrap_or("unset")
            );
        }
    }
    Ok(())
}
