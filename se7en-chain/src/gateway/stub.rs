//! In-memory contracts gateway and chain
//!
//! `StubContractsGateway` keeps contract state in maps and mines every
//! mutating call into a `StubChain` block, emitting the same events the
//! deployed contracts would. `StubChain` implements `ChainClient`, so the
//! ingestion loop runs unchanged against a stub deployment.
//!
//! Unknown entities read back as zeroed sentinels. Conditions a contract
//! would revert on surface as `ChainError::Reverted`.

use alloy::primitives::{address, Address, Bytes, LogData, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use chrono::Utc;
use se7en_core::{ContractAddressSet, Module};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    decode_clause, encode_clause, AffidavitRecord, AggregateNav, AttestationRecord,
    ContractsGateway, GatewayMode, InstrumentType, NoteRecord, TxOutcome, JURISDICTION_TAG,
};
use crate::abi::{
    IAffidavitRegistry, IAttestor, ICustodyVault, ICycleEngine, IInsuranceBinder,
    IIssuanceEngine, ITokenMint,
};
use crate::client::{CallRequest, ChainClient, LogFilter, RawLog, TxReceipt};
use crate::error::{ChainError, ChainResult};

/// Operator account used by stub deployments (first anvil/hardhat account)
pub const STUB_OPERATOR: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// Floor returned by the stub token contract
const STUB_FLOOR_BPS: u64 = 10_000;

fn random_word() -> B256 {
    B256::from(rand::random::<[u8; 32]>())
}

fn now_secs() -> U256 {
    U256::from(Utc::now().timestamp().max(0) as u64)
}

// ==================== Chain ====================

#[derive(Debug, Default)]
struct Journal {
    head: u64,
    logs: Vec<RawLog>,
    receipts: HashMap<B256, TxReceipt>,
    fail_next_get_logs: Option<String>,
    /// `(from_block, reason)`: fail the next range starting there
    fail_logs_from: Option<(u64, String)>,
    fail_next_block_number: Option<String>,
    requested_ranges: Vec<(u64, u64)>,
}

/// In-memory chain: a block height, a log journal and receipts
#[derive(Debug, Default)]
pub struct StubChain {
    journal: RwLock<Journal>,
    get_logs_calls: AtomicUsize,
    block_number_calls: AtomicUsize,
}

impl StubChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode an event as a raw log
    pub fn event_log<E: SolEvent>(
        address: Address,
        event: &E,
        block_number: u64,
        tx_hash: B256,
        log_index: u64,
    ) -> RawLog {
        let data: LogData = event.encode_log_data();
        RawLog {
            address,
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            block_number: Some(block_number),
            transaction_hash: Some(tx_hash),
            log_index: Some(log_index),
        }
    }

    /// Current head
    pub async fn head(&self) -> u64 {
        self.journal.read().await.head
    }

    /// Move the head (scripted scenarios)
    pub async fn set_head(&self, head: u64) {
        self.journal.write().await.head = head;
    }

    /// Append a pre-built log without mining
    pub async fn push_log(&self, log: RawLog) {
        self.journal.write().await.logs.push(log);
    }

    /// Mine one block holding a single successful transaction with `logs`
    pub async fn mine(&self, logs: Vec<(Address, LogData)>) -> B256 {
        let tx_hash = random_word();
        let mut journal = self.journal.write().await;
        journal.head += 1;
        let block = journal.head;
        for (index, (address, data)) in logs.into_iter().enumerate() {
            journal.logs.push(RawLog {
                address,
                topics: data.topics().to_vec(),
                data: data.data.clone(),
                block_number: Some(block),
                transaction_hash: Some(tx_hash),
                log_index: Some(index as u64),
            });
        }
        journal.receipts.insert(
            tx_hash,
            TxReceipt {
                transaction_hash: tx_hash,
                block_number: Some(block),
                success: true,
                gas_used: Some(21_000),
            },
        );
        tx_hash
    }

    /// Make the next `get_logs` fail with a transport error
    pub async fn fail_next_get_logs(&self, reason: impl Into<String>) {
        self.journal.write().await.fail_next_get_logs = Some(reason.into());
    }

    /// Make the next `get_logs` whose range starts at `from_block` fail
    pub async fn fail_get_logs_from(&self, from_block: u64, reason: impl Into<String>) {
        self.journal.write().await.fail_logs_from = Some((from_block, reason.into()));
    }

    /// Make the next `block_number` fail with a transport error
    pub async fn fail_next_block_number(&self, reason: impl Into<String>) {
        self.journal.write().await.fail_next_block_number = Some(reason.into());
    }

    /// Number of `get_logs` calls served (including failed ones)
    pub fn get_logs_calls(&self) -> usize {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    /// Number of `block_number` calls served
    pub fn block_number_calls(&self) -> usize {
        self.block_number_calls.load(Ordering::SeqCst)
    }

    /// Ranges requested through `get_logs`, in call order
    pub async fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.journal.read().await.requested_ranges.clone()
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn block_number(&self) -> ChainResult<u64> {
        self.block_number_calls.fetch_add(1, Ordering::SeqCst);
        let mut journal = self.journal.write().await;
        if let Some(reason) = journal.fail_next_block_number.take() {
            return Err(ChainError::Transport(reason));
        }
        Ok(journal.head)
    }

    async fn get_logs(&self, filter: &LogFilter) -> ChainResult<Vec<RawLog>> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        let mut journal = self.journal.write().await;
        journal
            .requested_ranges
            .push((filter.from_block, filter.to_block));
        if let Some(reason) = journal.fail_next_get_logs.take() {
            return Err(ChainError::Transport(reason));
        }
        if matches!(&journal.fail_logs_from, Some((from, _)) if *from == filter.from_block) {
            if let Some((_, reason)) = journal.fail_logs_from.take() {
                return Err(ChainError::Transport(reason));
            }
        }
        Ok(journal
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn call(&self, _request: &CallRequest) -> ChainResult<Bytes> {
        Err(ChainError::InvalidConfig(
            "stub chain does not execute contract calls".to_string(),
        ))
    }

    async fn send_transaction(&self, _request: &CallRequest) -> ChainResult<B256> {
        Err(ChainError::InvalidConfig(
            "stub chain does not accept raw transactions".to_string(),
        ))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> ChainResult<TxReceipt> {
        self.journal
            .read()
            .await
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::ReceiptTimeout {
                tx_hash: format!("{:#x}", tx_hash),
                attempts: 1,
            })
    }

    fn signer_address(&self) -> Option<Address> {
        Some(STUB_OPERATOR)
    }
}

// ==================== Gateway ====================

#[derive(Debug)]
struct StubState {
    custody: HashMap<B256, bool>,
    documents: HashMap<B256, Vec<B256>>,
    affidavits: HashMap<B256, AffidavitRecord>,
    latest_affidavit: HashMap<B256, B256>,
    attestations: HashMap<B256, AttestationRecord>,
    asset_navs: HashMap<B256, U256>,
    notes: BTreeMap<U256, NoteRecord>,
    next_note_id: U256,
    balances: HashMap<Address, U256>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            custody: HashMap::new(),
            documents: HashMap::new(),
            affidavits: HashMap::new(),
            latest_affidavit: HashMap::new(),
            attestations: HashMap::new(),
            asset_navs: HashMap::new(),
            notes: BTreeMap::new(),
            next_note_id: U256::from(1u64),
            balances: HashMap::new(),
        }
    }
}

/// Gateway with in-memory contract state
pub struct StubContractsGateway {
    state: RwLock<StubState>,
    chain: Arc<StubChain>,
    addresses: Arc<ContractAddressSet>,
}

impl StubContractsGateway {
    pub fn new(addresses: Arc<ContractAddressSet>) -> Self {
        Self::with_chain(addresses, Arc::new(StubChain::new()))
    }

    pub fn with_chain(addresses: Arc<ContractAddressSet>, chain: Arc<StubChain>) -> Self {
        Self {
            state: RwLock::new(StubState::default()),
            chain,
            addresses,
        }
    }

    /// Chain the stub mines into
    pub fn chain(&self) -> Arc<StubChain> {
        self.chain.clone()
    }

    /// Token balance of an account
    pub async fn balance_of(&self, account: Address) -> U256 {
        self.state
            .read()
            .await
            .balances
            .get(&account)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Mine a transaction; events are attached only if the module has an address
    async fn commit(&self, module: Module, events: Vec<LogData>) -> B256 {
        let logs = match self.addresses.get(module) {
            Some(address) => events.into_iter().map(|e| (address, e)).collect(),
            None => Vec::new(),
        };
        let tx_hash = self.chain.mine(logs).await;
        debug!(module = %module, tx_hash = %tx_hash, "Stub transaction mined");
        tx_hash
    }
}

#[async_trait]
impl ContractsGateway for StubContractsGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Stub
    }

    fn operator(&self) -> Option<Address> {
        Some(STUB_OPERATOR)
    }

    async fn set_custody(&self, asset_id: B256, custody: bool) -> ChainResult<TxOutcome<()>> {
        self.state.write().await.custody.insert(asset_id, custody);
        let event = ICustodyVault::CustodyUpdated {
            assetId: asset_id,
            custody,
            timestamp: now_secs(),
            actor: STUB_OPERATOR,
        };
        let tx = self
            .commit(Module::CustodyVault, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new((), tx))
    }

    async fn add_document(&self, asset_id: B256, doc_hash: B256) -> ChainResult<TxOutcome<()>> {
        self.state
            .write()
            .await
            .documents
            .entry(asset_id)
            .or_default()
            .push(doc_hash);
        let event = ICustodyVault::DocumentStored {
            assetId: asset_id,
            docHash: doc_hash,
            actor: STUB_OPERATOR,
        };
        let tx = self
            .commit(Module::CustodyVault, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new((), tx))
    }

    async fn has_custody(&self, asset_id: B256) -> ChainResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .custody
            .get(&asset_id)
            .copied()
            .unwrap_or(false))
    }

    async fn document_hashes(&self, asset_id: B256) -> ChainResult<Vec<B256>> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .get(&asset_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_affidavit(
        &self,
        asset_id: B256,
        metadata: Bytes,
    ) -> ChainResult<TxOutcome<B256>> {
        let affidavit_id = random_word();
        let record = AffidavitRecord {
            asset_id,
            document_hash: random_word(),
            witness: STUB_OPERATOR,
            timestamp: now_secs(),
            metadata,
        };
        let event = IAffidavitRegistry::AffidavitCreated {
            affidavitId: affidavit_id,
            assetId: asset_id,
            documentHash: record.document_hash,
            witness: record.witness,
            timestamp: record.timestamp,
        };
        {
            let mut state = self.state.write().await;
            state.affidavits.insert(affidavit_id, record);
            state.latest_affidavit.insert(asset_id, affidavit_id);
        }
        let tx = self
            .commit(Module::AffidavitRegistry, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new(affidavit_id, tx))
    }

    async fn latest_affidavit(&self, asset_id: B256) -> ChainResult<B256> {
        Ok(self
            .state
            .read()
            .await
            .latest_affidavit
            .get(&asset_id)
            .copied()
            .unwrap_or(B256::ZERO))
    }

    async fn get_affidavit(&self, affidavit_id: B256) -> ChainResult<AffidavitRecord> {
        Ok(self
            .state
            .read()
            .await
            .affidavits
            .get(&affidavit_id)
            .cloned()
            .unwrap_or_else(|| AffidavitRecord {
                witness: STUB_OPERATOR,
                ..AffidavitRecord::default()
            }))
    }

    async fn record_attestation(
        &self,
        subject_id: B256,
        payload_hash: B256,
        clause: &str,
    ) -> ChainResult<TxOutcome<B256>> {
        let clause = decode_clause(&encode_clause(clause)?);
        let attestation_id = random_word();
        let record = AttestationRecord {
            subject_id,
            payload_hash,
            clause: clause.clone(),
            timestamp: now_secs(),
            attestor: STUB_OPERATOR,
        };
        let event = IAttestor::Attested {
            attestationId: attestation_id,
            subjectId: subject_id,
            payloadHash: payload_hash,
            jurisdiction: JURISDICTION_TAG.to_string(),
            clause,
            timestamp: record.timestamp,
            attestor: STUB_OPERATOR,
        };
        self.state
            .write()
            .await
            .attestations
            .insert(attestation_id, record);
        let tx = self
            .commit(Module::Attestor, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new(attestation_id, tx))
    }

    async fn get_attestation(&self, attestation_id: B256) -> ChainResult<AttestationRecord> {
        Ok(self
            .state
            .read()
            .await
            .attestations
            .get(&attestation_id)
            .cloned()
            .unwrap_or_else(|| AttestationRecord {
                attestor: STUB_OPERATOR,
                ..AttestationRecord::default()
            }))
    }

    async fn set_asset_nav(&self, asset_id: B256, nav: U256) -> ChainResult<TxOutcome<()>> {
        self.state.write().await.asset_navs.insert(asset_id, nav);
        let event = IIssuanceEngine::AssetNavSet {
            assetId: asset_id,
            nav,
            actor: STUB_OPERATOR,
        };
        let tx = self
            .commit(Module::IssuanceEngine, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new((), tx))
    }

    async fn issue_instrument(
        &self,
        kind: InstrumentType,
        asset_id: B256,
        par: U256,
    ) -> ChainResult<TxOutcome<U256>> {
        let (note_id, note) = {
            let mut state = self.state.write().await;
            let note_id = state.next_note_id;
            state.next_note_id += U256::from(1u64);
            let note = NoteRecord {
                asset_id,
                instrument_type: kind,
                par,
                nav: par,
                affidavit_id: state
                    .latest_affidavit
                    .get(&asset_id)
                    .copied()
                    .unwrap_or(B256::ZERO),
                attestation_id: B256::ZERO,
                active: true,
            };
            state.notes.insert(note_id, note.clone());
            (note_id, note)
        };
        let event = IIssuanceEngine::InstrumentIssued {
            noteId: note_id,
            assetId: asset_id,
            instrumentType: kind.code(),
            par,
            nav: note.nav,
            affidavitId: note.affidavit_id,
        };
        let tx = self
            .commit(Module::IssuanceEngine, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new(note_id, tx))
    }

    async fn get_note(&self, note_id: U256) -> ChainResult<NoteRecord> {
        Ok(self
            .state
            .read()
            .await
            .notes
            .get(&note_id)
            .cloned()
            .unwrap_or_else(NoteRecord::not_found))
    }

    async fn aggregate_nav(&self) -> ChainResult<AggregateNav> {
        let state = self.state.read().await;
        let mut aggregate = AggregateNav::default();
        for note in state.notes.values().filter(|n| n.active) {
            match note.instrument_type {
                InstrumentType::Csdn => aggregate.nav_csdn += note.nav,
                InstrumentType::Sdn => aggregate.nav_sdn += note.nav,
            }
        }
        Ok(aggregate)
    }

    async fn settle_redemption(&self, note_id: U256, amount: U256) -> ChainResult<TxOutcome<()>> {
        let remaining = {
            let mut state = self.state.write().await;
            let note = state
                .notes
                .get_mut(&note_id)
                .filter(|n| n.active)
                .ok_or_else(|| ChainError::Reverted {
                    reason: "note inactive".to_string(),
                })?;
            if amount >= note.par {
                note.par = U256::ZERO;
                note.nav = U256::ZERO;
                note.active = false;
            } else {
                note.par -= amount;
                note.nav = note.nav.saturating_sub(amount);
            }
            note.nav
        };
        let event = IIssuanceEngine::InstrumentRedeemed {
            noteId: note_id,
            amount,
            remainingNav: remaining,
        };
        let tx = self
            .commit(Module::IssuanceEngine, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new((), tx))
    }

    async fn update_note_attestation(
        &self,
        note_id: U256,
        attestation_id: B256,
    ) -> ChainResult<TxOutcome<()>> {
        {
            let mut state = self.state.write().await;
            let note = state
                .notes
                .get_mut(&note_id)
                .ok_or_else(|| ChainError::Reverted {
                    reason: "note not found".to_string(),
                })?;
            note.attestation_id = attestation_id;
        }
        let tx = self.commit(Module::IssuanceEngine, Vec::new()).await;
        Ok(TxOutcome::new((), tx))
    }

    async fn bind_coverage(
        &self,
        asset_id: B256,
        class_code: u16,
        factor_bps: U256,
        disclosure_hash: B256,
    ) -> ChainResult<TxOutcome<B256>> {
        let class = u8::try_from(class_code).map_err(|_| ChainError::Reverted {
            reason: format!("class code {} out of range", class_code),
        })?;
        let binder_id = random_word();
        self.state.write().await.attestations.insert(
            binder_id,
            AttestationRecord {
                subject_id: asset_id,
                payload_hash: disclosure_hash,
                clause: format!("CLASS_{}", class_code),
                timestamp: now_secs(),
                attestor: STUB_OPERATOR,
            },
        );
        let bound = IInsuranceBinder::CoverageBound {
            binderId: binder_id,
            assetId: asset_id,
            classCode: class,
            factorBps: factor_bps,
            underwriter: STUB_OPERATOR,
        };
        let anchored = IInsuranceBinder::BandsDisclosureAnchored {
            disclosureHash: disclosure_hash,
            timestamp: now_secs(),
        };
        let tx = self
            .commit(
                Module::InsuranceBinder,
                vec![anchored.encode_log_data(), bound.encode_log_data()],
            )
            .await;
        Ok(TxOutcome::new(binder_id, tx))
    }

    async fn run_cycle(
        &self,
        note_id: U256,
        tenor_days: u16,
        rate_bps: u16,
    ) -> ChainResult<TxOutcome<B256>> {
        if tenor_days == 0 {
            return Err(ChainError::Reverted {
                reason: "tenor must be positive".to_string(),
            });
        }
        let nav = {
            let mut state = self.state.write().await;
            let note = state
                .notes
                .get_mut(&note_id)
                .ok_or_else(|| ChainError::Reverted {
                    reason: "note not found".to_string(),
                })?;
            if !note.active {
                return Err(ChainError::Reverted {
                    reason: "note inactive".to_string(),
                });
            }
            note.nav = note.par + U256::from(rate_bps) * U256::from(10u64);
            note.nav
        };

        let cycle_id = random_word();
        let executed = ICycleEngine::CycleExecuted {
            cycleId: cycle_id,
            noteId: note_id,
            tenorDays: tenor_days,
            rateBps: rate_bps,
            operator: STUB_OPERATOR,
            timestamp: now_secs(),
        };
        let nav_updated = IIssuanceEngine::NoteNavUpdated {
            noteId: note_id,
            nav,
        };
        let tx = self
            .commit(Module::CycleEngine, vec![executed.encode_log_data()])
            .await;
        if let Some(address) = self.addresses.get(Module::IssuanceEngine) {
            // Same block as the cycle in the deployed system; a separate one here.
            self.chain
                .mine(vec![(address, nav_updated.encode_log_data())])
                .await;
        }
        Ok(TxOutcome::new(cycle_id, tx))
    }

    async fn check_policy(&self, _asset_id: B256, action: &str) -> ChainResult<bool> {
        encode_clause(action)?;
        Ok(true)
    }

    async fn mint_by_nav(
        &self,
        nav_csdn: U256,
        nav_sdn: U256,
        floor_bps: U256,
        to: Address,
    ) -> ChainResult<TxOutcome<U256>> {
        let amount = nav_csdn + nav_sdn;
        {
            let mut state = self.state.write().await;
            let balance = state.balances.entry(to).or_insert(U256::ZERO);
            *balance += amount;
        }
        let event = ITokenMint::MintByNAV {
            to,
            amount,
            navCsdn: nav_csdn,
            navSdn: nav_sdn,
            floorBps: floor_bps,
        };
        let tx = self
            .commit(Module::TokenMint, vec![event.encode_log_data()])
            .await;
        Ok(TxOutcome::new(amount, tx))
    }

    async fn burn_from(&self, from: Address, amount: U256) -> ChainResult<TxOutcome<()>> {
        {
            let mut state = self.state.write().await;
            let balance = state.balances.entry(from).or_insert(U256::ZERO);
            if *balance < amount {
                return Err(ChainError::Reverted {
                    reason: "burn amount exceeds balance".to_string(),
                });
            }
            *balance -= amount;
        }
        let tx = self.commit(Module::TokenMint, Vec::new()).await;
        Ok(TxOutcome::new((), tx))
    }

    async fn policy_floor_bps(&self) -> ChainResult<U256> {
        Ok(U256::from(STUB_FLOOR_BPS))
    }
}
