pub mod context;

use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use super::envelope::Envelope;
use super::event::RawLog;

pub use context::DecoderContext;

/// Decoder transforms raw logs into typed envelopes.
///
/// A decoder inspects each log, skips what it does not recognize and wraps what it does
/// in an [`Envelope`]. Anything a sink needs from the original log (chain, block, log
/// index, transaction hash) must be carried in the envelope body or metadata, sinks do
/// not search `batch.events`.
///
/// Decoders must be pure with respect to storage: whether a log is *accepted* (for example
/// dynamic contract admission) is decided by the sink that applies it, because admission
/// can change between two logs of the same batch.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Unique, stable name. Hashed into the [`DecoderId`] used by contract mappings.
    fn decoder_name(&self) -> &str;

    /// Decode one log. Returns an empty vec when the log is not for this decoder.
    async fn decode_event(&self, event: &RawLog) -> anyhow::Result<Vec<Envelope>>;

    /// Decode a slice of logs, preserving their order.
    async fn decode(&self, events: &[RawLog]) -> anyhow::Result<Vec<Envelope>> {
        let mut all_envelopes = Vec::new();
        for event in events {
            let envelopes = self.decode_event(event).await?;
            all_envelopes.extend(envelopes);
        }
        Ok(all_envelopes)
    }
}

/// Decoder identifier (hash of the decoder name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(u64);

impl DecoderId {
    pub fn new(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        DecoderId(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Chain-qualified contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractRef {
    pub chain_id: u64,
    pub address: Address,
}

impl ContractRef {
    pub fn new(chain_id: u64, address: Address) -> Self {
        Self { chain_id, address }
    }

    pub fn of(event: &RawLog) -> Self {
        Self::new(event.chain_id, event.address)
    }
}

/// Contract routing: explicit mappings, a blacklist and the auto-discovery switch.
///
/// - Mapped contracts only reach their listed decoders.
/// - Blacklisted contracts are dropped before any decoder runs.
/// - Unmapped contracts reach every decoder unless `skip_unmapped` is set.
///
/// Resolver instances are discovered at runtime, so deployments that index them keep
/// auto-discovery on and rely on the sink's admission check.
#[derive(Debug, Clone, Default)]
pub struct ContractFilter {
    pub mappings: HashMap<ContractRef, Vec<DecoderId>>,
    pub blacklist: HashSet<ContractRef>,
    pub skip_unmapped: bool,
}

impl ContractFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allows(&self, contract: &ContractRef) -> bool {
        !self.blacklist.contains(contract)
    }

    pub fn get_decoders(&self, contract: &ContractRef) -> Option<&Vec<DecoderId>> {
        self.mappings.get(contract)
    }

    /// A contract cannot be both mapped and blacklisted.
    pub fn validate(&self) -> anyhow::Result<()> {
        for contract in self.mappings.keys() {
            if self.blacklist.contains(contract) {
                anyhow::bail!(
                    "Contract {:#x} on chain {} appears in both mapping and blacklist",
                    contract.address,
                    contract.chain_id
                );
            }
        }
        Ok(())
    }

    pub fn map_contract(mut self, contract: ContractRef, decoder_ids: Vec<DecoderId>) -> Self {
        self.mappings.insert(contract, decoder_ids);
        self
    }

    pub fn blacklist_contract(mut self, contract: ContractRef) -> Self {
        self.blacklist.insert(contract);
        self
    }

    pub fn skip_unmapped(mut self, skip: bool) -> Self {
        self.skip_unmapped = skip;
        self
    }
}
