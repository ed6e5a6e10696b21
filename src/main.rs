use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};

use guildcore::config::ClientConfig;
use guildcore::entities::PermissionContainer;
use guildcore::logging;
use guildcore::permissions::{AccessValidator, Permissions};
use guildcore::state::{create_shared_registry, SnapshotPayload};
use guildcore::Client;

/// Inspect cached permissions and run channel actions against the API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// State snapshot (JSON) to load into the cache
    #[arg(long, short = 's')]
    snapshot: Option<String>,

    /// Client config file (JSON); environment variables are used otherwise
    #[arg(long, short = 'c')]
    config: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the effective permissions of a member in a channel
    Resolve { channel_id: u64, member_id: u64 },
    /// Publish a news channel message to its followers
    Crosspost { channel_id: u64, message_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_buffer = logging::create_log_buffer(500);
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(logging::LogCaptureLayer::new(log_buffer.clone()))
            .init();
    }

    let config = match &args.config {
        Some(path) => ClientConfig::load_from_file(path)?,
        None => ClientConfig::from_env(),
    };

    let snapshot = match &args.snapshot {
        Some(path) => {
            info!("Loading snapshot from {}", path);
            Some(SnapshotPayload::load(path).await?)
        }
        None => None,
    };

    match args.command {
        Cmd::Resolve {
            channel_id,
            member_id,
        } => {
            let registry = create_shared_registry();
            let payload = snapshot.context("resolve needs a --snapshot")?;
            registry.apply_payload(payload)?;

            let channel = registry
                .channel(channel_id)
                .with_context(|| format!("channel {} is not in the snapshot", channel_id))?;
            let validator = AccessValidator::new(registry.clone());
            let effective = validator.effective_permissions(member_id, channel_id)?;

            println!("#{} ({})", channel.name(), channel_id);
            println!("effective: {}", effective);
            for name in Permissions::from_bits_truncate(effective).names() {
                println!("  {}", name);
            }
            match validator.check_access(member_id, channel_id) {
                Ok(()) => println!("access: yes"),
                Err(e) => println!("access: no ({})", e),
            }
        }
        Cmd::Crosspost {
            channel_id,
            message_id,
        } => {
            let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;
            let client = Client::new(&token, &config)?;
            if let Some(payload) = snapshot {
                client.registry().apply_payload(payload)?;
            }

            match client
                .channels()
                .crosspost_message_by_id(channel_id, &message_id)?
                .complete()
                .await
            {
                Ok(message) => info!("Crossposted message {} in {}", message.id, message.channel_id),
                Err(e) => {
                    error!("Crosspost failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
