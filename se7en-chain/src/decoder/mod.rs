//! Event Decoder
//!
//! Attributes each raw log to the module(s) deployed at its source
//! address, tries that module's candidate signatures in priority order,
//! and produces a normalized `ChainEvent`. Logs that fit no candidate are
//! reported as `DecodeOutcome::NoMatch` and skipped by callers; they never
//! abort a batch.

pub mod payload;
pub mod registry;

pub use payload::ToPayload;
pub use registry::{Decoded, EventRegistry, EventSignature};

use alloy::primitives::{Address, B256};
use chrono::Utc;
use se7en_core::{ChainEvent, ContractAddressSet, Module};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::client::RawLog;

/// Result of decoding one log
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A candidate matched
    Decoded(ChainEvent),
    /// The source module is known but no candidate fits
    NoMatch {
        module: Module,
        selector: Option<B256>,
    },
    /// No configured module lives at the log's address
    UnknownSource { address: Address },
}

impl DecodeOutcome {
    pub fn into_event(self) -> Option<ChainEvent> {
        match self {
            DecodeOutcome::Decoded(event) => Some(event),
            _ => None,
        }
    }
}

/// Events decoded from a batch of logs
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedBatch {
    /// Unique by identity key, in log order
    pub events: Vec<ChainEvent>,
    /// Logs that matched nothing
    pub skipped: usize,
    /// Repeated identity keys dropped within the batch
    pub duplicates: usize,
}

/// Stateless decoder bound to an address set and event registry
pub struct EventDecoder {
    registry: EventRegistry,
    addresses: Arc<ContractAddressSet>,
}

impl EventDecoder {
    pub fn new(addresses: Arc<ContractAddressSet>) -> Self {
        Self::with_registry(addresses, EventRegistry::standard())
    }

    pub fn with_registry(addresses: Arc<ContractAddressSet>, registry: EventRegistry) -> Self {
        Self {
            registry,
            addresses,
        }
    }

    pub fn addresses(&self) -> &ContractAddressSet {
        &self.addresses
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Decode one log against the modules at its source address
    pub fn decode(&self, log: &RawLog) -> DecodeOutcome {
        let modules = self.addresses.modules_for(&log.address);
        if modules.is_empty() {
            return DecodeOutcome::UnknownSource {
                address: log.address,
            };
        }

        for module in &modules {
            if let Some(event) = self.decode_as(log, *module) {
                return DecodeOutcome::Decoded(event);
            }
        }

        DecodeOutcome::NoMatch {
            module: modules[0],
            selector: log.selector().copied(),
        }
    }

    /// Decode a log as a specific module
    pub fn decode_as(&self, log: &RawLog, module: Module) -> Option<ChainEvent> {
        self.registry
            .candidates(module)
            .iter()
            .find_map(|candidate| {
                candidate
                    .try_decode(log)
                    .map(|decoded| build_event(log, module, candidate.kind, decoded))
            })
    }

    /// Decode a batch, skipping unmatched logs and collapsing repeated
    /// identity keys
    pub fn decode_batch(&self, logs: &[RawLog]) -> DecodedBatch {
        let mut batch = DecodedBatch::default();
        let mut seen = HashSet::with_capacity(logs.len());

        for log in logs {
            match self.decode(log) {
                DecodeOutcome::Decoded(event) => {
                    if seen.insert(event.identity_key.clone()) {
                        batch.events.push(event);
                    } else {
                        batch.duplicates += 1;
                    }
                }
                DecodeOutcome::NoMatch { module, selector } => {
                    debug!(
                        module = %module,
                        selector = ?selector,
                        key = %log.identity_key(),
                        "Skipping log with unknown event shape"
                    );
                    batch.skipped += 1;
                }
                DecodeOutcome::UnknownSource { address } => {
                    debug!(address = %address, key = %log.identity_key(), "Skipping log from unknown address");
                    batch.skipped += 1;
                }
            }
        }

        batch
    }
}

fn build_event(log: &RawLog, module: Module, kind: &str, decoded: Decoded) -> ChainEvent {
    let mut payload = decoded.payload;
    if let Some(map) = payload.as_object_mut() {
        map.insert("address".to_string(), log.address.to_payload());
        map.insert(
            "blockNumber".to_string(),
            log.block_number.unwrap_or(0).to_payload(),
        );
        map.insert(
            "logIndex".to_string(),
            log.log_index.unwrap_or(0).to_payload(),
        );
    }

    ChainEvent {
        identity_key: log.identity_key(),
        module,
        event_kind: kind.to_string(),
        correlation_hash: decoded.correlation_hash,
        transaction_hash: log
            .transaction_hash
            .map(|h| payload::as_key(&h))
            .unwrap_or_else(|| "0x0".to_string()),
        block_number: log.block_number.unwrap_or(0),
        payload,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{IAttestor, ICustodyVault, ICycleEngine};
    use crate::gateway::StubChain;
    use alloy::primitives::{Bytes, U256};
    use alloy::sol_types::SolEvent;

    fn attestor() -> Address {
        Address::repeat_byte(0xA1)
    }

    fn vault() -> Address {
        Address::repeat_byte(0xB2)
    }

    fn cycles() -> Address {
        Address::repeat_byte(0xC3)
    }

    fn decoder() -> EventDecoder {
        EventDecoder::new(Arc::new(
            ContractAddressSet::empty()
                .with(Module::Attestor, attestor())
                .with(Module::CustodyVault, vault())
                .with(Module::CycleEngine, cycles()),
        ))
    }

    fn attested() -> IAttestor::Attested {
        IAttestor::Attested {
            attestationId: B256::repeat_byte(0x01),
            subjectId: B256::repeat_byte(0x02),
            payloadHash: B256::repeat_byte(0x03),
            jurisdiction: "UHMI".into(),
            clause: "INTAKE".into(),
            timestamp: U256::from(1_700_000_000u64),
            attestor: Address::repeat_byte(0x0F),
        }
    }

    #[test]
    fn test_decode_attested() {
        let tx = B256::repeat_byte(0xEE);
        let log = StubChain::event_log(attestor(), &attested(), 5, tx, 0);

        let event = decoder().decode(&log).into_event().unwrap();
        assert_eq!(event.module, Module::Attestor);
        assert_eq!(event.event_kind, "Attested");
        assert_eq!(event.identity_key, format!("0x{}:0", "ee".repeat(32)));
        assert_eq!(event.correlation_hash, format!("0x{}", "03".repeat(32)));
        assert_eq!(event.block_number, 5);
        assert_eq!(event.payload["timestamp"], "1700000000");
        assert_eq!(event.payload["clause"], "INTAKE");
        assert_eq!(
            event.payload["attestor"],
            format!("0x{}", "0f".repeat(20))
        );
        assert_eq!(event.payload["logIndex"], "0");
    }

    #[test]
    fn test_priority_order_prefers_specific_shape() {
        let executed = ICycleEngine::CycleExecuted {
            cycleId: B256::repeat_byte(0x0C),
            noteId: U256::from(1u64),
            tenorDays: 30,
            rateBps: 250,
            operator: Address::repeat_byte(0x0F),
            timestamp: U256::from(1u64),
        };
        let run = ICycleEngine::CycleRun {
            cycleId: B256::repeat_byte(0x0C),
            noteId: U256::from(1u64),
        };
        let d = decoder();

        let first = d
            .decode(&StubChain::event_log(cycles(), &executed, 7, B256::repeat_byte(1), 0))
            .into_event()
            .unwrap();
        assert_eq!(first.event_kind, "CycleExecuted");
        assert_eq!(first.payload["tenorDays"], "30");

        let second = d
            .decode(&StubChain::event_log(cycles(), &run, 8, B256::repeat_byte(2), 0))
            .into_event()
            .unwrap();
        assert_eq!(second.event_kind, "CycleRun");
        assert_eq!(second.correlation_hash, first.correlation_hash);
    }

    #[test]
    fn test_wrong_module_is_no_match() {
        // An attestation log emitted from the custody vault address
        let log = StubChain::event_log(vault(), &attested(), 3, B256::repeat_byte(3), 1);
        match decoder().decode(&log) {
            DecodeOutcome::NoMatch { module, selector } => {
                assert_eq!(module, Module::CustodyVault);
                assert_eq!(selector, Some(IAttestor::Attested::SIGNATURE_HASH));
            }
            other => panic!("expected NoMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_data_is_no_match() {
        let mut log = StubChain::event_log(attestor(), &attested(), 3, B256::repeat_byte(4), 0);
        log.data = Bytes::from(vec![0u8; 7]);
        assert!(matches!(decoder().decode(&log), DecodeOutcome::NoMatch { .. }));
    }

    #[test]
    fn test_unknown_source() {
        let log = StubChain::event_log(Address::repeat_byte(0x99), &attested(), 3, B256::ZERO, 0);
        assert!(matches!(
            decoder().decode(&log),
            DecodeOutcome::UnknownSource { .. }
        ));
    }

    #[test]
    fn test_batch_skips_unknown_and_collapses_repeats() {
        let stored = ICustodyVault::DocumentStored {
            assetId: B256::repeat_byte(0x10),
            docHash: B256::repeat_byte(0x20),
            actor: Address::repeat_byte(0x30),
        };
        let good = StubChain::event_log(vault(), &stored, 9, B256::repeat_byte(9), 0);
        let mut unknown = good.clone();
        unknown.topics[0] = B256::repeat_byte(0x77);
        unknown.log_index = Some(1);
        let after = StubChain::event_log(attestor(), &attested(), 9, B256::repeat_byte(9), 2);

        let batch = decoder().decode_batch(&[good.clone(), unknown, good, after]);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(batch.events[0].correlation_hash, format!("0x{}", "20".repeat(32)));
        assert_eq!(batch.events[1].event_kind, "Attested");
    }
}
