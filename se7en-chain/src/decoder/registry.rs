//! Known events per module
//!
//! Each module owns an ordered candidate list. The decoder tries the
//! candidates in that order and the first successful decode wins, so
//! more specific shapes go first.

use alloy::primitives::B256;
use alloy::sol_types::SolEvent;
use se7en_core::Module;
use serde_json::Value;
use std::collections::BTreeMap;

use super::payload::{as_key, fields};
use crate::abi::{
    IAffidavitRegistry, IAttestor, ICustodyVault, ICycleEngine, IInsuranceBinder,
    IIssuanceEngine, ITokenMint,
};
use crate::client::RawLog;

/// Correlation hash plus normalized arguments of a decoded log
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub correlation_hash: String,
    pub payload: Value,
}

type DecodeFn = Box<dyn Fn(&RawLog) -> Option<Decoded> + Send + Sync>;

/// One `(module, event signature) -> decoder` entry
pub struct EventSignature {
    pub module: Module,
    /// Event name, e.g. `CycleExecuted`
    pub kind: &'static str,
    /// Full signature, e.g. `CycleRun(bytes32,uint256)`
    pub signature: &'static str,
    /// topic0
    pub selector: B256,
    decode: DecodeFn,
}

impl EventSignature {
    /// Entry for a `sol!` event type with its payload builder
    pub fn of<E>(module: Module, build: fn(E) -> Decoded) -> Self
    where
        E: SolEvent + 'static,
    {
        let kind = E::SIGNATURE.split('(').next().unwrap_or(E::SIGNATURE);
        Self {
            module,
            kind,
            signature: E::SIGNATURE,
            selector: E::SIGNATURE_HASH,
            decode: Box::new(move |log: &RawLog| {
                if log.selector() != Some(&E::SIGNATURE_HASH) {
                    return None;
                }
                E::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                    .ok()
                    .map(build)
            }),
        }
    }

    /// Attempt to decode; `None` if the layout does not fit
    pub fn try_decode(&self, log: &RawLog) -> Option<Decoded> {
        (self.decode)(log)
    }
}

impl std::fmt::Debug for EventSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSignature")
            .field("module", &self.module)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Ordered candidate events per module
#[derive(Debug, Default)]
pub struct EventRegistry {
    entries: BTreeMap<Module, Vec<EventSignature>>,
}

impl EventRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every module's known events
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(EventSignature::of(Module::Attestor, |e: IAttestor::Attested| {
            Decoded {
                correlation_hash: as_key(&e.payloadHash),
                payload: fields! {
                    "attestationId" => e.attestationId,
                    "subjectId" => e.subjectId,
                    "payloadHash" => e.payloadHash,
                    "jurisdiction" => e.jurisdiction,
                    "clause" => e.clause,
                    "timestamp" => e.timestamp,
                    "attestor" => e.attestor,
                },
            }
        }));

        registry.register(EventSignature::of(
            Module::AffidavitRegistry,
            |e: IAffidavitRegistry::AffidavitCreated| Decoded {
                correlation_hash: as_key(&e.documentHash),
                payload: fields! {
                    "affidavitId" => e.affidavitId,
                    "assetId" => e.assetId,
                    "documentHash" => e.documentHash,
                    "witness" => e.witness,
                    "timestamp" => e.timestamp,
                },
            },
        ));

        registry.register(EventSignature::of(
            Module::CustodyVault,
            |e: ICustodyVault::CustodyUpdated| Decoded {
                correlation_hash: as_key(&e.assetId),
                payload: fields! {
                    "assetId" => e.assetId,
                    "custody" => e.custody,
                    "timestamp" => e.timestamp,
                    "actor" => e.actor,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::CustodyVault,
            |e: ICustodyVault::DocumentStored| Decoded {
                correlation_hash: as_key(&e.docHash),
                payload: fields! {
                    "assetId" => e.assetId,
                    "docHash" => e.docHash,
                    "actor" => e.actor,
                },
            },
        ));

        registry.register(EventSignature::of(
            Module::IssuanceEngine,
            |e: IIssuanceEngine::AssetNavSet| Decoded {
                correlation_hash: as_key(&e.assetId),
                payload: fields! {
                    "assetId" => e.assetId,
                    "nav" => e.nav,
                    "actor" => e.actor,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::IssuanceEngine,
            |e: IIssuanceEngine::InstrumentIssued| Decoded {
                correlation_hash: as_key(&e.affidavitId),
                payload: fields! {
                    "noteId" => e.noteId,
                    "assetId" => e.assetId,
                    "instrumentType" => e.instrumentType,
                    "par" => e.par,
                    "nav" => e.nav,
                    "affidavitId" => e.affidavitId,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::IssuanceEngine,
            |e: IIssuanceEngine::InstrumentRedeemed| Decoded {
                correlation_hash: as_key(&e.noteId),
                payload: fields! {
                    "noteId" => e.noteId,
                    "amount" => e.amount,
                    "remainingNav" => e.remainingNav,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::IssuanceEngine,
            |e: IIssuanceEngine::NoteNavUpdated| Decoded {
                correlation_hash: as_key(&e.noteId),
                payload: fields! {
                    "noteId" => e.noteId,
                    "nav" => e.nav,
                },
            },
        ));

        registry.register(EventSignature::of(
            Module::InsuranceBinder,
            |e: IInsuranceBinder::CoverageBound| Decoded {
                correlation_hash: as_key(&e.binderId),
                payload: fields! {
                    "binderId" => e.binderId,
                    "assetId" => e.assetId,
                    "classCode" => e.classCode,
                    "factorBps" => e.factorBps,
                    "underwriter" => e.underwriter,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::InsuranceBinder,
            |e: IInsuranceBinder::BandsDisclosureAnchored| Decoded {
                correlation_hash: as_key(&e.disclosureHash),
                payload: fields! {
                    "disclosureHash" => e.disclosureHash,
                    "timestamp" => e.timestamp,
                },
            },
        ));

        // CycleExecuted carries the full terms; CycleRun is the bare shape.
        registry.register(EventSignature::of(
            Module::CycleEngine,
            |e: ICycleEngine::CycleExecuted| Decoded {
                correlation_hash: as_key(&e.cycleId),
                payload: fields! {
                    "cycleId" => e.cycleId,
                    "noteId" => e.noteId,
                    "tenorDays" => e.tenorDays,
                    "rateBps" => e.rateBps,
                    "operator" => e.operator,
                    "timestamp" => e.timestamp,
                },
            },
        ));
        registry.register(EventSignature::of(
            Module::CycleEngine,
            |e: ICycleEngine::CycleRun| Decoded {
                correlation_hash: as_key(&e.cycleId),
                payload: fields! {
                    "cycleId" => e.cycleId,
                    "noteId" => e.noteId,
                },
            },
        ));

        registry.register(EventSignature::of(
            Module::TokenMint,
            |e: ITokenMint::MintByNAV| Decoded {
                correlation_hash: as_key(&e.to),
                payload: fields! {
                    "to" => e.to,
                    "amount" => e.amount,
                    "navCsdn" => e.navCsdn,
                    "navSdn" => e.navSdn,
                    "floorBps" => e.floorBps,
                },
            },
        ));

        registry
    }

    /// Append a candidate at the lowest priority for its module
    pub fn register(&mut self, signature: EventSignature) {
        self.entries
            .entry(signature.module)
            .or_default()
            .push(signature);
    }

    /// Candidates for a module in priority order (empty if none)
    pub fn candidates(&self, module: Module) -> &[EventSignature] {
        self.entries
            .get(&module)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Total registered signatures
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_layout() {
        let registry = EventRegistry::standard();
        assert_eq!(registry.len(), 13);
        assert!(registry.candidates(Module::PolicyRegistry).is_empty());

        let cycle: Vec<_> = registry
            .candidates(Module::CycleEngine)
            .iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(cycle, vec!["CycleExecuted", "CycleRun"]);
        assert_eq!(
            registry.candidates(Module::CycleEngine)[1].signature,
            "CycleRun(bytes32,uint256)"
        );
    }
}
