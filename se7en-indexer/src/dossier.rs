//! Verification dossier
//!
//! Everything a verifier needs about one attestation: the on-chain
//! record, the audit entry that produced it, the affidavit it cites and
//! the custody document hashes of its subject.

use alloy::primitives::B256;
use se7en_chain::{ContractsGateway, JURISDICTION_TAG};
use se7en_core::{AuditLog, AuditLogRecord};
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

use crate::error::{IndexerError, IndexerResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationView {
    pub id: String,
    pub subject_id: String,
    pub payload_hash: String,
    pub clause: String,
    /// Unix seconds, decimal
    pub timestamp: String,
    pub attestor: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffidavitView {
    pub id: String,
    pub asset_id: String,
    pub document_hash: String,
    pub witness: String,
    pub timestamp: String,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeVault {
    pub doc_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDossier {
    pub attestation: AttestationView,
    pub affidavit: Option<AffidavitView>,
    pub audit: Option<AuditLogRecord>,
    pub safe_vault: SafeVault,
}

/// Parse a 0x-prefixed 32-byte id
pub fn parse_bytes32(raw: &str, field: &str) -> IndexerResult<B256> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 66 {
        return Err(IndexerError::InvalidInput(format!(
            "{} must be 0x followed by 64 hex digits",
            field
        )));
    }
    B256::from_str(trimmed).map_err(|e| IndexerError::InvalidInput(format!("{}: {}", field, e)))
}

/// Build the dossier for an attestation; `None` when it is not on-chain
pub async fn fetch_verification_dossier(
    gateway: &dyn ContractsGateway,
    audit: &dyn AuditLog,
    attestation_id: &str,
) -> IndexerResult<Option<VerificationDossier>> {
    let id = parse_bytes32(attestation_id, "attestationId")?;
    let id_hex = format!("{:#x}", id);

    let attestation = gateway.get_attestation(id).await?;
    if !attestation.is_found() {
        debug!(attestation = %id_hex, "Attestation not found on-chain");
        return Ok(None);
    }

    let record = audit.find_by_attestation(&id_hex).await?;

    let affidavit_id = record
        .as_ref()
        .and_then(|r| r.payload.get("affidavitId"))
        .and_then(|v| v.as_str())
        .and_then(|s| parse_bytes32(s, "affidavitId").ok());
    let affidavit = match affidavit_id {
        Some(affidavit_id) => {
            let found = gateway.get_affidavit(affidavit_id).await?;
            found.is_found().then(|| AffidavitView {
                id: format!("{:#x}", affidavit_id),
                asset_id: format!("{:#x}", found.asset_id),
                document_hash: format!("{:#x}", found.document_hash),
                witness: format!("{:#x}", found.witness),
                timestamp: found.timestamp.to_string(),
                metadata: format!("{}", found.metadata),
            })
        }
        None => None,
    };

    let doc_hashes = gateway
        .document_hashes(attestation.subject_id)
        .await?
        .iter()
        .map(|h| format!("{:#x}", h))
        .collect();

    Ok(Some(VerificationDossier {
        attestation: AttestationView {
            id: id_hex,
            subject_id: format!("{:#x}", attestation.subject_id),
            payload_hash: format!("{:#x}", attestation.payload_hash),
            clause: attestation.clause,
            timestamp: attestation.timestamp.to_string(),
            attestor: format!("{:#x}", attestation.attestor),
            jurisdiction: JURISDICTION_TAG.to_string(),
        },
        affidavit,
        audit: record,
        safe_vault: SafeVault { doc_hashes },
    }))
}
