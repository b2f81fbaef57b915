//! Chain-backed contracts gateway

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use se7en_core::{ContractAddressSet, Module};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    decode_clause, encode_clause, AffidavitRecord, AggregateNav, AttestationRecord,
    ContractsGateway, GatewayMode, InstrumentType, NoteRecord, TxOutcome,
};
use crate::abi::{
    IAffidavitRegistry, IAttestor, ICustodyVault, ICycleEngine, IInsuranceBinder,
    IIssuanceEngine, IPolicyRegistry, ITokenMint,
};
use crate::client::{CallRequest, ChainClient};
use crate::error::{ChainError, ChainResult};

/// Gateway that talks to deployed contracts through a `ChainClient`
pub struct RpcContractsGateway {
    client: Arc<dyn ChainClient>,
    addresses: Arc<ContractAddressSet>,
}

impl RpcContractsGateway {
    pub fn new(client: Arc<dyn ChainClient>, addresses: Arc<ContractAddressSet>) -> Self {
        let missing = addresses.missing();
        if !missing.is_empty() {
            warn!(
                missing = ?missing.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
                "Contracts gateway constructed with unconfigured modules"
            );
        }
        Self { client, addresses }
    }

    fn address(&self, module: Module) -> ChainResult<Address> {
        self.addresses
            .get(module)
            .ok_or_else(|| ChainError::AddressMissing {
                missing: vec![module],
            })
    }

    /// Single state read
    async fn read<C>(&self, module: Module, call: C) -> ChainResult<C::Return>
    where
        C: SolCall + Send,
        C::Return: Send,
    {
        let request = CallRequest {
            from: self.client.signer_address(),
            to: self.address(module)?,
            input: Bytes::from(call.abi_encode()),
        };
        let raw = self.client.call(&request).await?;
        Ok(C::abi_decode_returns(&raw, true)?)
    }

    /// Simulate, submit, and wait for the receipt
    async fn write<C>(&self, module: Module, call: C) -> ChainResult<TxOutcome<C::Return>>
    where
        C: SolCall + Send,
        C::Return: Send,
    {
        let from = self
            .client
            .signer_address()
            .ok_or_else(|| ChainError::Signing("no operator key configured".to_string()))?;
        let request = CallRequest {
            from: Some(from),
            to: self.address(module)?,
            input: Bytes::from(call.abi_encode()),
        };

        let simulated = self.client.call(&request).await?;
        let result = C::abi_decode_returns(&simulated, true)?;
        debug!(module = %module, function = C::SIGNATURE, "Simulation succeeded");

        let tx_hash = self.client.send_transaction(&request).await?;
        let receipt = self.client.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(ChainError::TransactionFailed {
                tx_hash: format!("{:#x}", tx_hash),
            });
        }

        info!(
            module = %module,
            function = C::SIGNATURE,
            tx_hash = %tx_hash,
            block = ?receipt.block_number,
            "Contract call confirmed"
        );
        Ok(TxOutcome::new(result, tx_hash))
    }
}

#[async_trait]
impl ContractsGateway for RpcContractsGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Rpc
    }

    fn operator(&self) -> Option<Address> {
        self.client.signer_address()
    }

    async fn set_custody(&self, asset_id: B256, custody: bool) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(
                Module::CustodyVault,
                ICustodyVault::setCustodyCall {
                    assetId: asset_id,
                    custody,
                },
            )
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn add_document(&self, asset_id: B256, doc_hash: B256) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(
                Module::CustodyVault,
                ICustodyVault::setDocCall {
                    assetId: asset_id,
                    docHash: doc_hash,
                },
            )
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn has_custody(&self, asset_id: B256) -> ChainResult<bool> {
        let ret = self
            .read(
                Module::CustodyVault,
                ICustodyVault::hasCustodyCall { assetId: asset_id },
            )
            .await?;
        Ok(ret.held)
    }

    async fn document_hashes(&self, asset_id: B256) -> ChainResult<Vec<B256>> {
        let ret = self
            .read(
                Module::CustodyVault,
                ICustodyVault::getDocHashesCall { assetId: asset_id },
            )
            .await?;
        Ok(ret.hashes)
    }

    async fn create_affidavit(
        &self,
        asset_id: B256,
        metadata: Bytes,
    ) -> ChainResult<TxOutcome<B256>> {
        let out = self
            .write(
                Module::AffidavitRegistry,
                IAffidavitRegistry::createAffidavitCall {
                    assetId: asset_id,
                    meta: metadata,
                },
            )
            .await?;
        Ok(TxOutcome::new(out.result.affidavitId, out.tx_hash))
    }

    async fn latest_affidavit(&self, asset_id: B256) -> ChainResult<B256> {
        let ret = self
            .read(
                Module::AffidavitRegistry,
                IAffidavitRegistry::latestAffidavitCall { assetId: asset_id },
            )
            .await?;
        Ok(ret.affidavitId)
    }

    async fn get_affidavit(&self, affidavit_id: B256) -> ChainResult<AffidavitRecord> {
        let ret = self
            .read(
                Module::AffidavitRegistry,
                IAffidavitRegistry::getAffidavitCall {
                    affidavitId: affidavit_id,
                },
            )
            .await?;
        let a = ret.affidavit;
        Ok(AffidavitRecord {
            asset_id: a.assetId,
            document_hash: a.documentHash,
            witness: a.witness,
            timestamp: a.timestamp,
            metadata: a.metadata,
        })
    }

    async fn record_attestation(
        &self,
        subject_id: B256,
        payload_hash: B256,
        clause: &str,
    ) -> ChainResult<TxOutcome<B256>> {
        let clause = encode_clause(clause)?;
        let out = self
            .write(
                Module::Attestor,
                IAttestor::recordAttestationCall {
                    subjectId: subject_id,
                    payloadHash: payload_hash,
                    clause,
                },
            )
            .await?;
        Ok(TxOutcome::new(out.result.attestationId, out.tx_hash))
    }

    async fn get_attestation(&self, attestation_id: B256) -> ChainResult<AttestationRecord> {
        let ret = self
            .read(
                Module::Attestor,
                IAttestor::getCall {
                    attestationId: attestation_id,
                },
            )
            .await?;
        let a = ret.attestation;
        Ok(AttestationRecord {
            subject_id: a.subjectId,
            payload_hash: a.payloadHash,
            clause: decode_clause(&a.clause),
            timestamp: a.timestamp,
            attestor: a.attestor,
        })
    }

    async fn set_asset_nav(&self, asset_id: B256, nav: U256) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(
                Module::IssuanceEngine,
                IIssuanceEngine::setAssetNAVCall {
                    assetId: asset_id,
                    navWei: nav,
                },
            )
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn issue_instrument(
        &self,
        kind: InstrumentType,
        asset_id: B256,
        par: U256,
    ) -> ChainResult<TxOutcome<U256>> {
        match kind {
            InstrumentType::Csdn => {
                let out = self
                    .write(
                        Module::IssuanceEngine,
                        IIssuanceEngine::issueCSDNCall {
                            assetId: asset_id,
                            par,
                        },
                    )
                    .await?;
                Ok(TxOutcome::new(out.result.noteId, out.tx_hash))
            }
            InstrumentType::Sdn => {
                let out = self
                    .write(
                        Module::IssuanceEngine,
                        IIssuanceEngine::issueSDNCall {
                            assetId: asset_id,
                            par,
                        },
                    )
                    .await?;
                Ok(TxOutcome::new(out.result.noteId, out.tx_hash))
            }
        }
    }

    async fn get_note(&self, note_id: U256) -> ChainResult<NoteRecord> {
        let ret = self
            .read(
                Module::IssuanceEngine,
                IIssuanceEngine::getNoteCall { noteId: note_id },
            )
            .await?;
        let n = ret.note;
        Ok(NoteRecord {
            asset_id: n.assetId,
            instrument_type: InstrumentType::from_code(n.instrumentType),
            par: n.par,
            nav: n.nav,
            affidavit_id: n.affidavitId,
            attestation_id: n.attestationId,
            active: n.active,
        })
    }

    async fn aggregate_nav(&self) -> ChainResult<AggregateNav> {
        let ret = self
            .read(Module::IssuanceEngine, IIssuanceEngine::getAggregateNAVCall {})
            .await?;
        Ok(AggregateNav {
            nav_csdn: ret.navCsdn,
            nav_sdn: ret.navSdn,
        })
    }

    async fn settle_redemption(&self, note_id: U256, amount: U256) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(
                Module::IssuanceEngine,
                IIssuanceEngine::settleRedemptionCall {
                    noteId: note_id,
                    amount,
                },
            )
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn update_note_attestation(
        &self,
        note_id: U256,
        attestation_id: B256,
    ) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(
                Module::IssuanceEngine,
                IIssuanceEngine::updateNoteAttestationCall {
                    noteId: note_id,
                    attestationId: attestation_id,
                },
            )
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn bind_coverage(
        &self,
        asset_id: B256,
        class_code: u16,
        factor_bps: U256,
        disclosure_hash: B256,
    ) -> ChainResult<TxOutcome<B256>> {
        let out = self
            .write(
                Module::InsuranceBinder,
                IInsuranceBinder::bindCoverageCall {
                    assetId: asset_id,
                    classCode: class_code,
                    factorBps: factor_bps,
                    disclosureHash: disclosure_hash,
                },
            )
            .await?;
        Ok(TxOutcome::new(out.result.binderId, out.tx_hash))
    }

    async fn run_cycle(
        &self,
        note_id: U256,
        tenor_days: u16,
        rate_bps: u16,
    ) -> ChainResult<TxOutcome<B256>> {
        let out = self
            .write(
                Module::CycleEngine,
                ICycleEngine::runCycleCall {
                    noteId: note_id,
                    tenorDays: tenor_days,
                    rateBps: rate_bps,
                },
            )
            .await?;
        Ok(TxOutcome::new(out.result.cycleId, out.tx_hash))
    }

    async fn check_policy(&self, asset_id: B256, action: &str) -> ChainResult<bool> {
        let action = encode_clause(action)?;
        let ret = self
            .read(
                Module::PolicyRegistry,
                IPolicyRegistry::okCall {
                    assetId: asset_id,
                    action,
                },
            )
            .await?;
        Ok(ret.allowed)
    }

    async fn mint_by_nav(
        &self,
        nav_csdn: U256,
        nav_sdn: U256,
        floor_bps: U256,
        to: Address,
    ) -> ChainResult<TxOutcome<U256>> {
        let out = self
            .write(
                Module::TokenMint,
                ITokenMint::mintByNAVCall {
                    navCsdn: nav_csdn,
                    navSdn: nav_sdn,
                    floorBps: floor_bps,
                    to,
                },
            )
            .await?;
        Ok(TxOutcome::new(out.result.amount, out.tx_hash))
    }

    async fn burn_from(&self, from: Address, amount: U256) -> ChainResult<TxOutcome<()>> {
        let out = self
            .write(Module::TokenMint, ITokenMint::burnFromCall { from, amount })
            .await?;
        Ok(TxOutcome::new((), out.tx_hash))
    }

    async fn policy_floor_bps(&self) -> ChainResult<U256> {
        let ret = self
            .read(Module::TokenMint, ITokenMint::policyFloorBpsCall {})
            .await?;
        Ok(ret.floorBps)
    }
}
