//! Address Configuration Guard
//!
//! Mutating operations call `ensure_configured` first. When a module has
//! no usable address the guard writes an `ADDR_MISSING` audit record and
//! returns `ChainError::AddressMissing` naming the modules. Diagnostics are
//! always available regardless of configuration.

use se7en_core::{actions, AuditEntry, AuditLog, AuditOutcome, ContractAddressSet, Module};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::{ChainError, ChainResult};

/// Per-module configuration status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub module: Module,
    pub configured: bool,
    pub address: Option<String>,
    /// Raw value that failed validation, if any
    pub rejected: Option<String>,
}

/// Advisory address guard
pub struct AddressGuard {
    addresses: Arc<ContractAddressSet>,
    audit: Arc<dyn AuditLog>,
}

impl AddressGuard {
    pub fn new(addresses: Arc<ContractAddressSet>, audit: Arc<dyn AuditLog>) -> Self {
        Self { addresses, audit }
    }

    /// The validated address set
    pub fn configured_modules(&self) -> &ContractAddressSet {
        &self.addresses
    }

    /// Modules without a usable address
    pub fn missing_modules(&self) -> Vec<Module> {
        self.addresses.missing()
    }

    /// Status of every module, for read-only diagnostics
    pub fn diagnostics(&self) -> Vec<ModuleStatus> {
        Module::ALL
            .iter()
            .map(|module| ModuleStatus {
                module: *module,
                configured: self.addresses.is_configured(*module),
                address: self.addresses.get(*module).map(|a| format!("{:#x}", a)),
                rejected: self.addresses.rejected().get(module).cloned(),
            })
            .collect()
    }

    /// Require every module to be configured
    pub async fn ensure_configured(
        &self,
        action: &str,
        metadata: serde_json::Value,
    ) -> ChainResult<()> {
        self.ensure_modules(action, &Module::ALL, metadata).await
    }

    /// Require the given modules to be configured
    pub async fn ensure_modules(
        &self,
        action: &str,
        required: &[Module],
        metadata: serde_json::Value,
    ) -> ChainResult<()> {
        let missing: Vec<Module> = required
            .iter()
            .copied()
            .filter(|m| !self.addresses.is_configured(*m))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let names: Vec<&str> = missing.iter().map(|m| m.as_str()).collect();
        warn!(action, missing = ?names, "Refusing operation: contract addresses missing");

        let entry = AuditEntry::new(action, "system")
            .with_payload(serde_json::json!({
                "reason": actions::ADDR_MISSING,
                "missing": names,
                "metadata": metadata,
            }))
            .with_outcome(AuditOutcome::Error);
        if let Err(e) = self.audit.append(entry).await {
            warn!(action, error = %e, "Failed to audit missing addresses");
        }

        Err(ChainError::AddressMissing { missing })
    }
}
