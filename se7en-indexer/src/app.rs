//! Service assembly
//!
//! Wires one store, one chain client and one gateway into the subscriber,
//! reconciler, arm workflow and address guard.

use se7en_chain::{
    AddressGuard, ChainClient, ChainConfig, ContractsGateway, GatewayMode, JsonRpcClient,
    ModuleStatus, RpcContractsGateway, StubChain, StubContractsGateway,
};
use se7en_core::{AuditLog, ContractAddressSet};
use se7en_store::{IndexerStore, StoreStats};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::arming::CycleArming;
use crate::config::IndexerConfig;
use crate::dossier::{fetch_verification_dossier, VerificationDossier};
use crate::error::IndexerResult;
use crate::reconciler::CycleReconciler;
use crate::runner::BackgroundRunner;
use crate::subscriber::EventSubscriber;

/// Snapshot for the `status` command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatus {
    pub network: String,
    pub gateway_mode: GatewayMode,
    pub cursor_name: String,
    pub cursor: u64,
    pub chain_head: Option<u64>,
    pub modules: Vec<ModuleStatus>,
    pub store: StoreStats,
}

/// Fully wired indexer
pub struct IndexerApp<S: IndexerStore + 'static> {
    config: IndexerConfig,
    store: Arc<S>,
    client: Arc<dyn ChainClient>,
    gateway: Arc<dyn ContractsGateway>,
    guard: Arc<AddressGuard>,
    subscriber: Arc<EventSubscriber>,
    reconciler: Arc<CycleReconciler>,
    arming: CycleArming,
}

impl<S: IndexerStore + 'static> IndexerApp<S> {
    /// Build the client and gateway selected by `config.gateway_mode`
    pub fn build(
        config: IndexerConfig,
        chain_config: ChainConfig,
        addresses: Arc<ContractAddressSet>,
        store: Arc<S>,
    ) -> IndexerResult<Self> {
        let (client, gateway): (Arc<dyn ChainClient>, Arc<dyn ContractsGateway>) =
            match config.gateway_mode {
                GatewayMode::Rpc => {
                    let client: Arc<dyn ChainClient> = Arc::new(JsonRpcClient::new(chain_config)?);
                    let gateway: Arc<dyn ContractsGateway> =
                        Arc::new(RpcContractsGateway::new(client.clone(), addresses.clone()));
                    (client, gateway)
                }
                GatewayMode::Stub => {
                    let chain = Arc::new(StubChain::new());
                    let gateway: Arc<dyn ContractsGateway> =
                        Arc::new(StubContractsGateway::with_chain(addresses.clone(), chain.clone()));
                    let client: Arc<dyn ChainClient> = chain;
                    (client, gateway)
                }
            };
        Ok(Self::assemble(config, addresses, store, client, gateway))
    }

    /// Wire pre-built parts
    pub fn assemble(
        config: IndexerConfig,
        addresses: Arc<ContractAddressSet>,
        store: Arc<S>,
        client: Arc<dyn ChainClient>,
        gateway: Arc<dyn ContractsGateway>,
    ) -> Self {
        let dyn_store: Arc<dyn IndexerStore> = store.clone();
        let audit: Arc<dyn AuditLog> = store.clone();

        let guard = Arc::new(AddressGuard::new(addresses.clone(), audit));
        let subscriber = Arc::new(
            EventSubscriber::new(
                client.clone(),
                addresses,
                dyn_store.clone(),
                config.cursor_name.clone(),
            )
            .with_max_range(config.max_log_range),
        );
        let reconciler = Arc::new(
            CycleReconciler::new(dyn_store.clone(), config.reconcile_batch)
                .with_gateway(gateway.clone())
                .with_network(config.network.clone()),
        );
        let arming = CycleArming::new(gateway.clone(), guard.clone(), dyn_store);

        Self {
            config,
            store,
            client,
            gateway,
            guard,
            subscriber,
            reconciler,
            arming,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn ContractsGateway> {
        &self.gateway
    }

    pub fn guard(&self) -> &AddressGuard {
        &self.guard
    }

    pub fn subscriber(&self) -> &Arc<EventSubscriber> {
        &self.subscriber
    }

    pub fn reconciler(&self) -> &Arc<CycleReconciler> {
        &self.reconciler
    }

    pub fn arming(&self) -> &CycleArming {
        &self.arming
    }

    /// Runner with every enabled task scheduled
    pub fn runner(&self) -> BackgroundRunner {
        let mut runner = BackgroundRunner::new();
        if self.config.ingest_enabled {
            runner = runner.with_subscriber(self.subscriber.clone(), self.config.ingest_interval());
        } else {
            info!("Ingestion disabled");
        }
        if self.config.reconcile_enabled {
            runner =
                runner.with_reconciler(self.reconciler.clone(), self.config.reconcile_interval());
        } else {
            info!("Reconciliation disabled");
        }
        runner
    }

    /// Address diagnostics, cursor and store counts. The head is omitted
    /// when the node is unreachable.
    pub async fn status(&self) -> IndexerResult<IndexerStatus> {
        Ok(IndexerStatus {
            network: self.config.network.clone(),
            gateway_mode: self.gateway.mode(),
            cursor_name: self.config.cursor_name.clone(),
            cursor: self.subscriber.cursor().await?,
            chain_head: self.client.block_number().await.ok(),
            modules: self.guard.diagnostics(),
            store: self.store.stats().await?,
        })
    }

    pub async fn dossier(&self, attestation_id: &str) -> IndexerResult<Option<VerificationDossier>> {
        fetch_verification_dossier(self.gateway.as_ref(), self.store.as_ref(), attestation_id).await
    }
}
