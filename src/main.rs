//! # Listing Rotor
//!
//! Visits a rotating set of listing pages with headless Chromium, extracts
//! job cards, drops anything published in the last seven days and replaces
//! the published working set with what is left.
//!
//! ## Usage
//!
//! ```sh
//! listing_rotor --targets-file targets.yaml run
//! listing_rotor --targets-file targets.yaml -j ./json watch
//! listing_rotor list
//! ```
//!
//! ## Architecture
//!
//! Each trigger runs one cycle:
//! 1. **Rotation**: pick the next target and persist the advanced index
//! 2. **Session**: drive a browser page under a retry supervisor
//! 3. **Novelty**: drop candidates whose fingerprint is in the ledger
//! 4. **Publish**: clear the working set, upsert novel listings, record fingerprints

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod browser;
mod cli;
mod config;
mod error;
mod extract;
mod models;
mod notify;
mod novelty;
mod orchestrator;
mod outputs;
mod rotation;
mod session;
mod store;
mod supervisor;
#[cfg(test)]
mod testing;
mod transform;
mod utils;
mod writer;

use browser::chrome::ChromeLauncher;
use cli::{Cli, Command, ProfileArg};
use models::Target;
use notify::AlertLog;
use orchestrator::{Orchestrator, WatchSchedule};
use session::AutomationSession;
use session::profile::SessionProfile;
use store::Store;
use store::json::JsonStore;
use store::memory::MemoryStore;
use supervisor::SupervisorPolicy;
use transform::TemplateRewriter;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("listing_rotor starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, store_dir = %args.store_dir.display(), ephemeral = args.ephemeral, "Parsed CLI arguments");

    let result = execute(&args).await;
    if let Some(body) = failure_body(&args.command, &result) {
        println!("{body}");
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "listing_rotor finished"
    );
    result
}

/// The `{"message": ...}` body `run` prints when it fails at any stage,
/// setup included.
fn failure_body(command: &Command, result: &Result<(), Box<dyn Error>>) -> Option<String> {
    match (command, result) {
        (Command::Run, Err(e)) => Some(serde_json::json!({ "message": e.to_string() }).to_string()),
        _ => None,
    }
}

/// Set up targets, browser and store, then run the subcommand.
async fn execute(args: &Cli) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let targets =
        config::load_targets(args.targets_file.as_deref(), args.source_urls.as_deref()).await?;
    let launcher = ChromeLauncher {
        executable: args.chrome_path.clone(),
        headful: args.headful,
    };
    let session = AutomationSession::new(profile_for(args), args.debug_dir.clone());

    match &args.command {
        // Preview never touches stored state.
        Command::Preview => dispatch(args, MemoryStore::new(), launcher, session, targets).await,
        _ if args.ephemeral => dispatch(args, MemoryStore::new(), launcher, session, targets).await,
        _ => {
            let store = JsonStore::open(&args.store_dir).await?;
            dispatch(args, store, launcher, session, targets).await
        }
    }
}

/// `watch` defaults to the list-scanning profile, everything else to the
/// card-clicking one.
fn profile_for(args: &Cli) -> SessionProfile {
    match (args.profile, &args.command) {
        (Some(ProfileArg::Interactive), _) => SessionProfile::interactive(),
        (Some(ProfileArg::Continuous), _) => SessionProfile::continuous(),
        (None, Command::Watch { .. }) => SessionProfile::continuous(),
        (None, _) => SessionProfile::interactive(),
    }
}

#[instrument(level = "info", skip_all, fields(command = ?args.command))]
async fn dispatch<S: Store>(
    args: &Cli,
    store: S,
    launcher: ChromeLauncher,
    session: AutomationSession,
    targets: Vec<Target>,
) -> Result<(), Box<dyn Error>> {
    let policy = match args.command {
        Command::Watch { .. } => SupervisorPolicy::continuous(),
        _ => SupervisorPolicy::manual(),
    };
    let orchestrator = Orchestrator::new(store, launcher, TemplateRewriter, targets, session, policy)
        .with_json_output(args.json_output_dir.clone())
        .with_notifier(AlertLog::new(args.alerts_file.clone()));

    match &args.command {
        Command::Run => {
            let report = orchestrator.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Watch {
            interval_secs,
            error_pause_secs,
            max_cycles,
        } => {
            let schedule = WatchSchedule {
                interval: Duration::from_secs(*interval_secs),
                error_pause: Duration::from_secs(*error_pause_secs),
            };
            let cycles = orchestrator.watch(schedule, *max_cycles).await?;
            info!(cycles, "Watch loop finished");
        }
        Command::List => {
            let listings = orchestrator.published().await?;
            println!("{}", serde_json::to_string_pretty(&listings)?);
        }
        Command::Preview => {
            let candidates = orchestrator.preview().await?;
            info!(count = candidates.len(), "Preview complete");
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        }
    }
    Ok(())
}
