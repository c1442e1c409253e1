//! Private disclosure CLI
//!
//! Thin wrapper around disclosure-core for sealing and opening envelopes by
//! hand and for exercising the fetch pipeline against an in-memory service.
//!
//! ## Usage
//!
//! ```bash
//! # Generate and store a recipient key pair
//! disclosure keygen --identity did:plc:alice
//!
//! # Print the stored public key (base64)
//! disclosure public-key
//!
//! # Seal attributes for a recipient
//! disclosure seal --recipient-key <BASE64> --name "Alice" --pronouns she/her
//!
//! # Open an envelope addressed to the stored key
//! disclosure open <ENVELOPE>
//!
//! # Run several consumers over the same identities
//! disclosure simulate --consumers 4 --identities 20
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use disclosure_core::identity::{load_session_keys, save_session_keys};
use disclosure_core::{
    generate_recipient_keypair, profile_identities, DisclosureConfig, DisclosureSession, Envelope, Identity,
    InMemoryDisclosureApi, InMemoryResultSets, MemoryTelemetry, Notice, Overlay, PassOutcome,
    PrivateAttributes, ProfileView, Pronouns, QueryKey, RecipientKeyPair, RecipientPublicKey,
    SessionKeys,
};
use tracing::info;

const SESSION_FILE: &str = "session.json";

/// Simulated service round-trip, long enough for consumers to overlap.
const SIMULATED_LATENCY: Duration = Duration::from_millis(25);

/// Private profile disclosure - seal, open and simulate
#[derive(Parser)]
#[command(name = "disclosure")]
#[command(version = "0.1.0")]
#[command(about = "Private profile disclosure - seal, open and simulate")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.disclosure)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a recipient key pair and store it in the data directory
    Keygen {
        /// Identity to bind the keys to (default: did:key derived from the public key)
        #[arg(short, long)]
        identity: Option<String>,
        /// Replace existing keys
        #[arg(long)]
        force: bool,
    },

    /// Print the stored public key (base64)
    PublicKey,

    /// Seal private attributes for one recipient
    Seal {
        /// Recipient public key (base64)
        #[arg(short, long)]
        recipient_key: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        banner: Option<String>,
        #[arg(long)]
        pronouns: Option<String>,
    },

    /// Open an envelope with the stored key pair
    Open {
        /// Envelope (base64)
        envelope: String,
    },

    /// Run the fetch pipeline against an in-memory service
    Simulate {
        /// Consumers mounting concurrently
        #[arg(long, default_value_t = 3)]
        consumers: usize,
        /// Identities shown by every consumer (every other one has disclosed)
        #[arg(long, default_value_t = 10)]
        identities: usize,
        /// Make the service fail every request
        #[arg(long)]
        fail: bool,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.disclosure)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".disclosure")
}

fn load_config(path: Option<&Path>) -> Result<DisclosureConfig> {
    match path {
        Some(path) => DisclosureConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(DisclosureConfig::default()),
    }
}

fn require_session_keys(data_dir: &Path) -> Result<SessionKeys> {
    let path = data_dir.join(SESSION_FILE);
    load_session_keys(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .ok_or_else(|| anyhow::anyhow!("No keys in {}. Run `disclosure keygen` first.", data_dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen { identity, force } => {
            let path = data_dir.join(SESSION_FILE);
            if path.exists() && !force {
                anyhow::bail!(
                    "Keys already exist at {}. Use --force to replace them.",
                    path.display()
                );
            }

            let keypair = generate_recipient_keypair();
            let public = keypair.public_key();
            let identity = match identity {
                Some(raw) => Identity::parse(&raw)?,
                None => Identity::from_public_key(&public),
            };

            save_session_keys(&path, &SessionKeys::new(identity.clone(), keypair))
                .context("Failed to save keys")?;
            info!(identity = %identity, "Generated recipient keys");

            println!("Generated recipient keys.");
            println!("  Identity: {}", identity);
            println!("  Public key: {}", public.to_base64());
        }

        Commands::PublicKey => {
            let keys = require_session_keys(&data_dir)?;
            println!("{}", keys.keypair().public_key().to_base64());
        }

        Commands::Seal {
            recipient_key,
            name,
            description,
            avatar,
            banner,
            pronouns,
        } => {
            let recipient = RecipientPublicKey::from_base64(&recipient_key)
                .context("Invalid recipient key")?;
            let attrs = PrivateAttributes {
                display_name: name,
                description,
                avatar,
                banner,
                pronouns: pronouns.map(Pronouns::Flat),
            };

            let envelope = Envelope::seal(&attrs.to_json()?, &recipient)?;
            println!("{}", envelope.to_base64()?);
        }

        Commands::Open { envelope } => {
            let keys = require_session_keys(&data_dir)?;
            let plaintext = Envelope::from_base64(&envelope)
                .and_then(|envelope| envelope.open(keys.keypair()))
                .context("Failed to open envelope")?;
            let attrs = PrivateAttributes::from_json(&plaintext)?;

            println!("{}", serde_json::to_string_pretty(&attrs)?);
        }

        Commands::Simulate {
            consumers,
            identities,
            fail,
        } => {
            simulate(config, consumers, identities, fail).await?;
        }
    }

    Ok(())
}

async fn simulate(config: DisclosureConfig, consumers: usize, identities: usize, fail: bool) -> Result<()> {
    info!(consumers, identities, fail, "Starting simulation");
    let keypair = RecipientKeyPair::generate();
    let me = Identity::from_public_key(&keypair.public_key());
    let my_public = keypair.public_key();

    let api = Arc::new(InMemoryDisclosureApi::new());
    api.set_latency(SIMULATED_LATENCY);

    let mut profiles = Vec::with_capacity(identities);
    for i in 0..identities {
        let identity = Identity::parse(&format!("did:plc:sim{:04}", i))?;
        if i % 2 == 0 {
            let attrs = PrivateAttributes {
                display_name: Some(format!("Private {}", i)),
                ..Default::default()
            };
            api.publish(&identity, &attrs, &[(me.clone(), my_public.clone())])?;
        }
        profiles.push(ProfileView::new(identity, format!("user{}.example", i)).with_display_name(format!("Public {}", i)));
    }
    if fail {
        api.fail_with("simulated outage");
    }

    let telemetry = Arc::new(MemoryTelemetry::new());
    let session = DisclosureSession::login(
        config,
        SessionKeys::new(me, keypair),
        api.clone(),
        telemetry.clone(),
    )?;

    let result_sets = Arc::new(InMemoryResultSets::new());
    let mut passes = Vec::with_capacity(consumers);
    for c in 0..consumers {
        let query = QueryKey::new(format!("feed:sim{}", c));
        result_sets.push_page(&query, profiles.clone());
        let mut consumer = session.consumer(query, result_sets.clone(), profile_identities);
        passes.push(consumer.on_mount().spawn());
    }

    let (mut completed, mut skipped, mut failed) = (0, 0, 0);
    for pass in passes {
        match pass.await.context("Fetch pass panicked")? {
            PassOutcome::Completed(_) => completed += 1,
            PassOutcome::Skipped => skipped += 1,
            PassOutcome::Failed(_) => failed += 1,
        }
    }

    let cache = session.cache();
    let snapshot = cache.snapshot();
    let checked = profiles.iter().filter(|p| cache.is_checked(&p.identity)).count();

    println!("Simulated {} consumers over {} identities", consumers, identities);
    println!("  Remote calls: {}", api.call_count());
    println!("  Passes: {} completed, {} skipped, {} failed", completed, skipped, failed);
    println!("  Disclosed: {}", snapshot.len());
    println!("  Checked: {}", checked);

    let notices = telemetry.notices();
    if notices.is_empty() {
        println!("  Notices: none");
    } else {
        println!("  Notices ({}):", notices.len());
        for notice in notices {
            match notice {
                Notice::ServiceDegraded { reason } => println!("    service degraded: {}", reason),
                Notice::RecordRejected { identity, reason } => {
                    println!("    record rejected: {} ({})", identity, reason)
                }
            }
        }
    }

    println!("  Merged view:");
    for profile in profiles.overlay(&snapshot).iter().take(4) {
        println!("    {} -> {}", profile.handle, profile.label());
    }

    Ok(())
}
