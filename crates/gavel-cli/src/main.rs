// Gavel entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr; stdout carries only command output)
// 2. Load config
// 3. Open the local store and build the remote client
// 4. Dispatch the subcommand
// 5. Cleanup: give a pending copy-forward a bounded window to finish

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use gavel_core::config::{self, Config};
use gavel_core::purge::purge_cache;
use gavel_core::recovery::{NothingToRecover, Recovery, RecoveryOutcome};
use gavel_core::session::{CopyForwardOutcome, SessionContext};
use gavel_core::store::{HttpRemoteStore, RemoteStore, SqliteStore};

/// How long to wait for the copy-forward before exiting.
const COPY_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Resume a live auction on this device", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild an auction from the remote snapshot and rotate to a new session id.
    Resume {
        /// Auction to resume; defaults to this device's current auction.
        auction_id: Option<String>,
    },
    /// Print this device's current auction id.
    Current,
    /// Remove every cached auction record from this device.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Initialize tracing
    init_tracing()?;

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        remote = %config.remote.base_url,
        collection = %config.remote.collection,
        "config loaded"
    );

    // 3. Open the local store
    let local = open_local_store(&config)?;

    // 4. Dispatch
    match cli.command {
        Command::Current => {
            match SessionContext::load(&local).current_id() {
                Some(id) => println!("{id}"),
                None => println!("no current auction"),
            }
            Ok(())
        }
        Command::Purge => {
            let removed = purge_cache(&local).context("cache purge failed")?;
            println!("removed {removed} cached auction record(s)");
            Ok(())
        }
        Command::Resume { auction_id } => resume(&config, &local, auction_id).await,
    }
}

async fn resume(
    config: &Config,
    local: &SqliteStore,
    requested: Option<String>,
) -> anyhow::Result<()> {
    let context = SessionContext::load(local);
    let Some(auction_id) = requested.or_else(|| context.current_id().map(String::from)) else {
        println!("no recoverable auction found; start a new auction");
        return Ok(());
    };

    let remote: Arc<dyn RemoteStore> = Arc::new(
        HttpRemoteStore::new(&config.remote).context("failed to build remote store client")?,
    );
    let mut rng = StdRng::from_os_rng();

    let outcome = Recovery::new(local, local, remote)
        .with_id_length(config.session.id_length)
        .recover(&context, &auction_id, &mut rng)
        .await;

    let recovered = match outcome {
        RecoveryOutcome::Resumed(recovered) => recovered,
        RecoveryOutcome::NothingToRecover(reason) => {
            match reason {
                NothingToRecover::Absent { auction_id } => {
                    info!(%auction_id, "nothing stored under this id")
                }
                NothingToRecover::FetchFailed {
                    auction_id,
                    message,
                } => warn!(%auction_id, "remote unavailable: {message}"),
            }
            println!("no recoverable auction found; start a new auction");
            return Ok(());
        }
    };

    let json = serde_json::to_string_pretty(&recovered.handoff)
        .context("failed to serialize setup handoff")?;
    println!("{json}");

    // 5. Cleanup: the process exiting would abandon the copy-forward.
    match tokio::time::timeout(COPY_FORWARD_TIMEOUT, recovered.copy_forward.outcome()).await {
        Ok(CopyForwardOutcome::Written { auction_id }) => {
            info!(%auction_id, "snapshot copied forward")
        }
        Ok(CopyForwardOutcome::Failed {
            auction_id,
            message,
        }) => warn!(%auction_id, "copy-forward failed: {message}"),
        Ok(CopyForwardOutcome::Abandoned { auction_id }) => {
            warn!(%auction_id, "copy-forward abandoned")
        }
        Err(_) => warn!(
            "copy-forward still pending after {}s; exiting anyway",
            COPY_FORWARD_TIMEOUT.as_secs()
        ),
    }

    Ok(())
}

fn open_local_store(config: &Config) -> anyhow::Result<SqliteStore> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create data directory {}", parent.display())
        })?;
    }
    let path = config.db_path.to_string_lossy();
    let store = SqliteStore::open(&path).context("failed to open local store")?;
    info!("local store opened at {path}");
    Ok(store)
}

/// Initialize tracing to stderr so stdout stays machine-readable.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gavel=info,gavel_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
