//! Cycle Reconciler
//!
//! Confirms ARMED cycles against ingested `CycleExecuted`/`CycleRun`
//! events. A confirmed cycle moves to EXECUTED exactly once, gets one
//! `CYCLE_EXECUTE_AUTO` audit record and one derived `CycleExecutedAuto`
//! event. Cycles without a confirming event stay ARMED for the next pass.
//!
//! Candidates come from the store already joined with their confirming
//! event, so a backlog of unconfirmed cycles never fills a batch. The
//! transition, its audit record and the derived event are committed as
//! one store write.

use alloy::primitives::U256;
use chrono::{DateTime, TimeZone, Utc};
use se7en_chain::ContractsGateway;
use se7en_core::{
    actions, AuditEntry, ChainEvent, Cycle, CycleExecution, Module, CYCLE_PROGRAM,
};
use se7en_store::{CycleCompletion, CycleConfirmation, EventQuery, IndexerStore};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::IndexerResult;

/// Event kinds that confirm a cycle
pub const CONFIRMING_KINDS: [&str; 2] = ["CycleExecuted", "CycleRun"];

/// Kind of the derived completion event
pub const DERIVED_KIND: &str = "CycleExecutedAuto";

/// Identity key of the derived completion event for a chain cycle id
pub fn derived_identity_key(cycle_id: &str) -> String {
    format!("derived:{}:{}", DERIVED_KIND, cycle_id.to_lowercase())
}

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Cycles with a confirming event
    pub examined: usize,
    pub transitioned: usize,
    /// Already moved by a concurrent reconciler
    pub superseded: usize,
    /// Errors, left ARMED for retry
    pub failed: usize,
}

pub struct CycleReconciler {
    store: Arc<dyn IndexerStore>,
    gateway: Option<Arc<dyn ContractsGateway>>,
    batch_size: usize,
    network: String,
}

impl CycleReconciler {
    pub fn new(store: Arc<dyn IndexerStore>, batch_size: usize) -> Self {
        Self {
            store,
            gateway: None,
            batch_size: batch_size.max(1),
            network: "local".to_string(),
        }
    }

    /// Fetch note details for derived events through this gateway
    pub fn with_gateway(mut self, gateway: Arc<dyn ContractsGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Number of cycles moved to EXECUTED in one pass
    pub async fn reconcile(&self) -> IndexerResult<usize> {
        Ok(self.run_pass().await?.transitioned)
    }

    /// One pass over at most `batch_size` confirmable cycles
    #[instrument(skip(self), fields(batch = self.batch_size))]
    pub async fn run_pass(&self) -> IndexerResult<ReconcileReport> {
        let confirmations = EventQuery::new()
            .module(Module::CycleEngine)
            .kinds(CONFIRMING_KINDS);
        let candidates = self
            .store
            .confirmable_cycles(&confirmations, self.batch_size)
            .await?;
        let mut report = ReconcileReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            match self.reconcile_cycle(candidate).await {
                Ok(true) => report.transitioned += 1,
                Ok(false) => report.superseded += 1,
                Err(e) => {
                    warn!(cycle = %candidate.cycle.id, error = %e, "Failed to reconcile cycle");
                    report.failed += 1;
                }
            }
        }

        if report.transitioned > 0 || report.failed > 0 {
            info!(
                examined = report.examined,
                transitioned = report.transitioned,
                failed = report.failed,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    async fn reconcile_cycle(&self, candidate: &CycleConfirmation) -> IndexerResult<bool> {
        let CycleConfirmation { cycle, event } = candidate;
        let Some(cycle_id) = cycle.cycle_id.as_deref() else {
            return Ok(false);
        };

        let executed_at = event_time(&event.payload).unwrap_or_else(Utc::now);
        let execution = CycleExecution {
            executed_at,
            transaction_hash: Some(event.transaction_hash.clone()),
            metadata_patch: json!({
                "onChainUpdate": {
                    "txHash": event.transaction_hash,
                    "blockNumber": event.block_number,
                    "at": executed_at.to_rfc3339(),
                }
            }),
        };
        // The store applies the same execution to the same ARMED row
        let mut executed = cycle.clone();
        executed.apply_execution(&execution);

        let audit = AuditEntry::new(actions::CYCLE_EXECUTE_AUTO, cycle_id)
            .with_transaction(event.transaction_hash.clone())
            .with_payload(json!({
                "route": "cycle_watcher",
                "cycleId": executed.id,
                "status": executed.status,
                "noteId": executed.note_id,
                "txHash": executed.transaction_hash,
                "operator": executed.operator,
                "blockNumber": event.block_number,
            }));

        let note = self.note_details(&executed).await;
        let derived_event = ChainEvent {
            identity_key: derived_identity_key(cycle_id),
            module: Module::CycleEngine,
            event_kind: DERIVED_KIND.to_string(),
            correlation_hash: cycle_id.to_string(),
            transaction_hash: event.transaction_hash.clone(),
            block_number: event.block_number,
            payload: json!({
                "network": self.network,
                "program": CYCLE_PROGRAM,
                "cycleId": cycle_id,
                "noteId": executed.note_id,
                "tenorDays": event.payload.get("tenorDays").cloned()
                    .unwrap_or_else(|| executed.tenor_days.to_string().into()),
                "rateBps": event.payload.get("rateBps").cloned()
                    .unwrap_or_else(|| executed.rate_bps.to_string().into()),
                "operator": event.payload.get("operator").cloned()
                    .unwrap_or_else(|| json!(executed.operator)),
                "blockTime": executed_at.to_rfc3339(),
                "note": note,
            }),
            created_at: Utc::now(),
        };

        let completion = CycleCompletion {
            execution,
            audit,
            derived_event,
        };
        let Some(updated) = self.store.complete_cycle(&cycle.id, &completion).await? else {
            debug!(cycle = %cycle.id, cycle_id, "Cycle already moved by another reconciler");
            return Ok(false);
        };
        info!(
            cycle = %updated.id,
            cycle_id,
            tx_hash = %event.transaction_hash,
            block = event.block_number,
            "Cycle executed on-chain"
        );
        Ok(true)
    }

    /// Note snapshot for the derived event; `null` when unavailable
    async fn note_details(&self, cycle: &Cycle) -> Value {
        let Some(gateway) = &self.gateway else {
            return Value::Null;
        };
        let Ok(note_id) = U256::from_str_radix(&cycle.note_id, 10) else {
            warn!(cycle = %cycle.id, note_id = %cycle.note_id, "Cycle has a malformed note id");
            return Value::Null;
        };
        match gateway.get_note(note_id).await {
            Ok(note) => note.to_json(),
            Err(e) => {
                warn!(cycle = %cycle.id, error = %e, "Failed to fetch note for derived event");
                Value::Null
            }
        }
    }
}

/// Execution time from a `timestamp` payload field (decimal seconds)
fn event_time(payload: &Value) -> Option<DateTime<Utc>> {
    let secs: i64 = payload.get("timestamp")?.as_str()?.parse().ok()?;
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}
