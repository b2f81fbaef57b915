//! Command handlers

use alloy::primitives::U256;
use se7en_chain::{ChainConfig, GatewayMode};
use se7en_core::{ContractAddressSet, CoreError};
use se7en_store::{IndexerStore, MemoryStore, SledStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::IndexerApp;
use crate::arming::ArmRequest;
use crate::commands::{Cli, Commands};
use crate::config::IndexerConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::subscriber::TickOutcome;

/// Run the CLI
pub async fn run(cli: Cli) -> IndexerResult<()> {
    let mut config = IndexerConfig::from_env();
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    if cli.stub {
        config.gateway_mode = GatewayMode::Stub;
    }

    let addresses = ContractAddressSet::from_env();
    for (module, raw) in addresses.rejected() {
        warn!(module = %module, value = %raw, "Ignoring malformed contract address");
    }

    match config.data_dir.clone() {
        Some(dir) => {
            let store = Arc::new(SledStore::open(&dir)?);
            info!(data_dir = %dir.display(), "Opened sled store");
            let result = execute(cli.command, config, addresses, store.clone()).await;
            store.flush()?;
            result
        }
        None => execute(cli.command, config, addresses, Arc::new(MemoryStore::new())).await,
    }
}

async fn execute<S: IndexerStore + 'static>(
    command: Commands,
    config: IndexerConfig,
    addresses: ContractAddressSet,
    store: Arc<S>,
) -> IndexerResult<()> {
    let app = IndexerApp::build(config, ChainConfig::from_env(), Arc::new(addresses), store)?;

    match command {
        Commands::Run => handle_run(&app).await,
        Commands::Tick => {
            match app.subscriber().tick().await? {
                TickOutcome::NoAddresses => println!("No contract addresses configured"),
                TickOutcome::UpToDate { cursor, head } => {
                    println!("Up to date (cursor {}, head {})", cursor, head)
                }
                TickOutcome::Advanced(summary) => print_json(&summary)?,
            }
            Ok(())
        }
        Commands::Reconcile => print_json(&app.reconciler().run_pass().await?),
        Commands::Status => print_json(&app.status().await?),
        Commands::Dossier { attestation_id } => match app.dossier(&attestation_id).await? {
            Some(dossier) => print_json(&dossier),
            None => Err(IndexerError::NotFound(format!("attestation {}", attestation_id))),
        },
        Commands::Arm {
            note_id,
            tenor_days,
            rate_bps,
        } => {
            let request = ArmRequest::new(U256::from(note_id), tenor_days, rate_bps).with_actor("cli");
            print_json(&app.arming().arm(&request).await?)
        }
    }
}

async fn handle_run<S: IndexerStore + 'static>(app: &IndexerApp<S>) -> IndexerResult<()> {
    let missing = app.guard().missing_modules();
    if !missing.is_empty() {
        warn!(
            missing = ?missing.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            "Running with unconfigured contract modules"
        );
    }

    let handle = app.runner().start();
    info!(
        network = %app.config().network,
        mode = %app.config().gateway_mode,
        "Indexer running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| IndexerError::Config(format!("failed to listen for Ctrl-C: {}", e)))?;
    info!("Shutting down");
    handle.stop().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> IndexerResult<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(CoreError::from)?;
    println!("{}", rendered);
    Ok(())
}
