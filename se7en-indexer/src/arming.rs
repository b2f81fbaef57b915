//! Cycle arm workflow
//!
//! Validates the note, runs the cycle on-chain and records the outcome as
//! a cycle row plus one audit record. A failed chain call still leaves a
//! FAILED cycle and a warning-tagged audit record behind.

use alloy::primitives::U256;
use se7en_chain::{AddressGuard, ContractsGateway};
use se7en_core::{actions, AuditEntry, AuditLog, AuditOutcome, Cycle, Module};
use se7en_store::IndexerStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{IndexerError, IndexerResult};

/// Modules a cycle arm touches
const REQUIRED_MODULES: [Module; 2] = [Module::CycleEngine, Module::IssuanceEngine];

/// Parameters of a cycle arm request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmRequest {
    pub note_id: U256,
    pub tenor_days: u16,
    pub rate_bps: u16,
    /// Who asked, recorded in metadata and audit
    pub actor: Option<String>,
}

impl ArmRequest {
    pub fn new(note_id: U256, tenor_days: u16, rate_bps: u16) -> Self {
        Self {
            note_id,
            tenor_days,
            rate_bps,
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

pub struct CycleArming {
    gateway: Arc<dyn ContractsGateway>,
    guard: Arc<AddressGuard>,
    store: Arc<dyn IndexerStore>,
}

impl CycleArming {
    pub fn new(
        gateway: Arc<dyn ContractsGateway>,
        guard: Arc<AddressGuard>,
        store: Arc<dyn IndexerStore>,
    ) -> Self {
        Self {
            gateway,
            guard,
            store,
        }
    }

    /// Arm a cycle on a note and return the stored ARMED cycle
    #[instrument(skip(self, request), fields(note_id = %request.note_id))]
    pub async fn arm(&self, request: &ArmRequest) -> IndexerResult<Cycle> {
        let note_id = request.note_id.to_string();
        self.guard
            .ensure_modules(
                actions::CYCLE_ARM,
                &REQUIRED_MODULES,
                json!({
                    "noteId": note_id,
                    "tenorDays": request.tenor_days,
                    "rateBps": request.rate_bps,
                }),
            )
            .await?;

        let note = self.gateway.get_note(request.note_id).await?;
        if !note.is_found() {
            return Err(IndexerError::NotFound(format!("note {}", note_id)));
        }
        if !note.active {
            return Err(IndexerError::BusinessRule(format!("note {} is inactive", note_id)));
        }
        let asset_id = format!("{:#x}", note.asset_id);
        let operator = self.gateway.operator().map(|a| format!("{:#x}", a));

        let mut cycle = Cycle::armed(note_id.clone(), request.tenor_days, request.rate_bps);
        if let Some(operator) = &operator {
            cycle = cycle.with_operator(operator.clone());
        }

        let run = self
            .gateway
            .run_cycle(request.note_id, request.tenor_days, request.rate_bps)
            .await;
        let (cycle, cycle_error) = match run {
            Ok(outcome) => {
                let cycle = cycle
                    .with_cycle_id(format!("{:#x}", outcome.result))
                    .with_transaction(outcome.tx_hash_hex())
                    .with_metadata(json!({ "actor": request.actor, "cycleError": null }));
                (cycle, None)
            }
            Err(e) => {
                let message = e.to_string();
                let cycle = cycle
                    .with_metadata(json!({ "actor": request.actor, "cycleError": message }))
                    .into_failed();
                (cycle, Some(message))
            }
        };

        let persisted = self.store.insert_cycle(&cycle).await;
        if let Err(e) = &persisted {
            warn!(cycle = %cycle.id, error = %e, "Failed to persist cycle record");
        }

        let mut entry = AuditEntry::new(actions::CYCLE_ARM, asset_id).with_payload(json!({
            "route": "cycle_arm",
            "actor": request.actor,
            "noteId": note_id,
            "tenorDays": request.tenor_days,
            "rateBps": request.rate_bps,
            "cycleId": cycle.cycle_id,
            "txHash": cycle.transaction_hash,
            "cycleRecordId": persisted.as_ref().ok().map(|_| cycle.id.clone()),
            "cycleError": cycle_error,
            "status": cycle.status,
            "operator": operator,
        }));
        if let Some(tx) = &cycle.transaction_hash {
            entry = entry.with_transaction(tx.clone());
        }
        let outcome = if cycle_error.is_some() {
            AuditOutcome::Warning
        } else {
            AuditOutcome::Ok
        };
        if let Err(e) = self.store.append(entry.with_outcome(outcome)).await {
            warn!(cycle = %cycle.id, error = %e, "Failed to persist cycle audit record");
        }

        if let Some(message) = cycle_error {
            warn!(cycle = %cycle.id, error = %message, "Cycle execution failed");
            return Err(IndexerError::Upstream(message));
        }
        persisted?;

        info!(
            cycle = %cycle.id,
            cycle_id = ?cycle.cycle_id,
            tx_hash = ?cycle.transaction_hash,
            "Cycle armed"
        );
        Ok(cycle)
    }
}
