//! Contracts Gateway
//!
//! Typed façade over the eight contract modules. Mutating operations
//! simulate, submit, and wait for the receipt, returning the simulated
//! return value together with the transaction hash. Read operations are a
//! single state read.
//!
//! Absent entities come back as zeroed records (`is_found() == false`)
//! rather than errors, in both implementations.

pub mod rpc;
pub mod stub;

pub use rpc::RpcContractsGateway;
pub use stub::{StubChain, StubContractsGateway, STUB_OPERATOR};

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChainError, ChainResult};

/// Jurisdiction recorded with every attestation and dossier
pub const JURISDICTION_TAG: &str = "UHMI 508(c)(1)(a); Cheroenhaka (Nottoway) Treaty 1713";

/// Result of a confirmed mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome<T> {
    /// Decoded return value from simulation
    pub result: T,
    /// Hash of the confirmed transaction
    pub tx_hash: B256,
}

impl<T> TxOutcome<T> {
    pub fn new(result: T, tx_hash: B256) -> Self {
        Self { result, tx_hash }
    }

    /// Transaction hash as lowercase 0x hex
    pub fn tx_hash_hex(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }
}

/// Which gateway implementation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Rpc,
    Stub,
}

impl GatewayMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rpc" | "chain" => Some(Self::Rpc),
            "stub" | "memory" => Some(Self::Stub),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc => write!(f, "rpc"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

/// Instrument class issued against an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    Csdn,
    Sdn,
}

impl InstrumentType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Csdn => 0,
            Self::Sdn => 1,
        }
    }

    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            Self::Csdn
        } else {
            Self::Sdn
        }
    }
}

/// On-chain attestation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttestationRecord {
    pub subject_id: B256,
    pub payload_hash: B256,
    pub clause: String,
    pub timestamp: U256,
    pub attestor: Address,
}

impl AttestationRecord {
    /// A zero subject marks the not-found sentinel
    pub fn is_found(&self) -> bool {
        !self.subject_id.is_zero()
    }
}

/// On-chain affidavit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AffidavitRecord {
    pub asset_id: B256,
    pub document_hash: B256,
    pub witness: Address,
    pub timestamp: U256,
    pub metadata: Bytes,
}

impl AffidavitRecord {
    pub fn is_found(&self) -> bool {
        !self.asset_id.is_zero()
    }
}

/// Issued note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub asset_id: B256,
    pub instrument_type: InstrumentType,
    pub par: U256,
    pub nav: U256,
    pub affidavit_id: B256,
    pub attestation_id: B256,
    pub active: bool,
}

impl NoteRecord {
    /// Sentinel returned for unknown note ids
    pub fn not_found() -> Self {
        Self {
            asset_id: B256::ZERO,
            instrument_type: InstrumentType::Csdn,
            par: U256::ZERO,
            nav: U256::ZERO,
            affidavit_id: B256::ZERO,
            attestation_id: B256::ZERO,
            active: false,
        }
    }

    pub fn is_found(&self) -> bool {
        !self.asset_id.is_zero()
    }

    /// JSON view with integers as decimal strings and hashes as hex
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "assetId": format!("{:#x}", self.asset_id),
            "instrumentType": self.instrument_type,
            "par": self.par.to_string(),
            "nav": self.nav.to_string(),
            "affidavitId": format!("{:#x}", self.affidavit_id),
            "attestationId": format!("{:#x}", self.attestation_id),
            "active": self.active,
        })
    }
}

/// Aggregate NAV per instrument class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateNav {
    pub nav_csdn: U256,
    pub nav_sdn: U256,
}

/// Encode a clause tag as a right-padded bytes32
pub fn encode_clause(clause: &str) -> ChainResult<B256> {
    let bytes = clause.as_bytes();
    if bytes.len() > 32 {
        return Err(ChainError::BusinessRule(format!(
            "clause '{}' exceeds 32 bytes",
            clause
        )));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(B256::from(word))
}

/// Decode a bytes32 clause tag, trimming trailing NULs
pub fn decode_clause(word: &B256) -> String {
    let bytes = word.as_slice();
    let end = bytes.iter().rposition(|b| *b != 0).map(|i| i + 1).unwrap_or(0);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// One operation per on-chain capability
#[async_trait]
pub trait ContractsGateway: Send + Sync {
    /// Active implementation
    fn mode(&self) -> GatewayMode;

    /// Account that signs mutating calls
    fn operator(&self) -> Option<Address>;

    // ==================== Custody vault ====================

    async fn set_custody(&self, asset_id: B256, custody: bool) -> ChainResult<TxOutcome<()>>;

    /// Append a document hash to the asset's custody record
    async fn add_document(&self, asset_id: B256, doc_hash: B256) -> ChainResult<TxOutcome<()>>;

    async fn has_custody(&self, asset_id: B256) -> ChainResult<bool>;

    async fn document_hashes(&self, asset_id: B256) -> ChainResult<Vec<B256>>;

    // ==================== Affidavit registry ====================

    async fn create_affidavit(&self, asset_id: B256, metadata: Bytes)
        -> ChainResult<TxOutcome<B256>>;

    /// Latest affidavit id for an asset (zero when none)
    async fn latest_affidavit(&self, asset_id: B256) -> ChainResult<B256>;

    async fn get_affidavit(&self, affidavit_id: B256) -> ChainResult<AffidavitRecord>;

    // ==================== Attestor ====================

    async fn record_attestation(
        &self,
        subject_id: B256,
        payload_hash: B256,
        clause: &str,
    ) -> ChainResult<TxOutcome<B256>>;

    async fn get_attestation(&self, attestation_id: B256) -> ChainResult<AttestationRecord>;

    // ==================== Issuance engine ====================

    async fn set_asset_nav(&self, asset_id: B256, nav: U256) -> ChainResult<TxOutcome<()>>;

    /// Issue a note, returning its id
    async fn issue_instrument(
        &self,
        kind: InstrumentType,
        asset_id: B256,
        par: U256,
    ) -> ChainResult<TxOutcome<U256>>;

    async fn get_note(&self, note_id: U256) -> ChainResult<NoteRecord>;

    async fn aggregate_nav(&self) -> ChainResult<AggregateNav>;

    async fn settle_redemption(&self, note_id: U256, amount: U256) -> ChainResult<TxOutcome<()>>;

    async fn update_note_attestation(
        &self,
        note_id: U256,
        attestation_id: B256,
    ) -> ChainResult<TxOutcome<()>>;

    // ==================== Insurance binder ====================

    async fn bind_coverage(
        &self,
        asset_id: B256,
        class_code: u16,
        factor_bps: U256,
        disclosure_hash: B256,
    ) -> ChainResult<TxOutcome<B256>>;

    // ==================== Cycle engine ====================

    /// Run a liquidity cycle on a note, returning the chain cycle id
    async fn run_cycle(
        &self,
        note_id: U256,
        tenor_days: u16,
        rate_bps: u16,
    ) -> ChainResult<TxOutcome<B256>>;

    // ==================== Policy registry ====================

    /// Whether the policy override registry allows `action` on the asset
    async fn check_policy(&self, asset_id: B256, action: &str) -> ChainResult<bool>;

    // ==================== Token mint ====================

    async fn mint_by_nav(
        &self,
        nav_csdn: U256,
        nav_sdn: U256,
        floor_bps: U256,
        to: Address,
    ) -> ChainResult<TxOutcome<U256>>;

    async fn burn_from(&self, from: Address, amount: U256) -> ChainResult<TxOutcome<()>>;

    async fn policy_floor_bps(&self) -> ChainResult<U256>;
}
