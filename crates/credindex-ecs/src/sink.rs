//! Reconciliation engine.
//!
//! Applies [`EcsEvent`]s to the entity store one at a time, in the order the batch
//! delivers them, and keeps credentials and resolvers consistent with each other:
//! - every mutation is an idempotent upsert or update keyed by chain-qualified ids
//! - history rows are keyed by log occurrence and written with insert-or-ignore
//! - updates touch only the fields the event governs
//! - events for missing credentials are skipped, never turned into placeholder rows
//! - resolver events are applied only for admitted resolvers
//!
//! A failure applying one event is logged and counted; the rest of the batch still applies.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use credindex::etl::{Envelope, ExtractionBatch, Sink, TypeId};
use std::sync::Arc;
use std::time::Instant;

use crate::api::{self, ApiState};
use crate::chain::chain_name;
use crate::decoder::{EcsEvent, EcsEventKind, EventSource, ECS_EVENT_TYPE};
use crate::derived::{full_name, is_expired};
use crate::keys;
use crate::reader::BestEffortReader;
use crate::registry::{AdmissionState, DynamicRegistry};
use crate::storage::{
    AddressRecord, Approval, ContractMetadataEntry, Credential, CredentialTransfer, EcsStore,
    Provenance, Renewal, Resolver, ResolverTransfer, TextRecord,
};

/// SLIP-44 coin type of ETH address records.
const ETH_COIN_TYPE: u64 = 60;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The entity the event updates does not exist.
    Skipped,
    /// Resolver event from a contract that was never admitted.
    Dropped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Dropped => "dropped",
        }
    }
}

/// Per-event facts shared by the handlers.
struct Applying<'a> {
    source: &'a EventSource,
    timestamp: u64,
    provenance: Provenance,
}

impl Applying<'_> {
    fn chain_id(&self) -> u64 {
        self.source.chain_id
    }
}

fn non_zero(address: Address) -> Option<String> {
    (!address.is_zero()).then(|| keys::hex_address(&address))
}

pub struct EcsSink {
    store: Arc<EcsStore>,
    registry: DynamicRegistry,
    reader: BestEffortReader,
    api_key: Option<String>,
}

impl EcsSink {
    pub fn new(store: Arc<EcsStore>, reader: BestEffortReader) -> Self {
        Self {
            registry: DynamicRegistry::new(store.clone()),
            store,
            reader,
            api_key: None,
        }
    }

    /// Require `Authorization: Bearer <key>` on non-public API routes.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn store(&self) -> &Arc<EcsStore> {
        &self.store
    }

    pub fn registry(&self) -> &DynamicRegistry {
        &self.registry
    }

    /// Apply one event observed at block time `timestamp`.
    pub async fn apply(&self, event: &EcsEvent, timestamp: u64) -> Result<Outcome> {
        let source = &event.source;
        let ctx = Applying {
            source,
            timestamp,
            provenance: Provenance {
                block_number: source.block_number,
                timestamp,
                tx_hash: keys::hex_b256(&source.tx_hash),
            },
        };

        match &event.kind {
            EcsEventKind::LabelClaimed {
                labelhash,
                label_topic,
                owner,
            } => self.label_claimed(&ctx, *labelhash, *label_topic, *owner).await,
            EcsEventKind::CredentialTransferred { labelhash, owner } => {
                self.credential_transferred(&ctx, *labelhash, *owner)
            }
            EcsEventKind::ResolverChanged {
                labelhash,
                resolver,
            } => self.resolver_changed(&ctx, *labelhash, *resolver).await,
            EcsEventKind::ReviewUpdated { labelhash, review } => {
                self.review_updated(&ctx, *labelhash, review)
            }
            EcsEventKind::ExpirationExtended {
                labelhash,
                new_expiration,
            } => self.expiration_extended(&ctx, *labelhash, *new_expiration),
            EcsEventKind::ApprovalForAll {
                owner,
                operator,
                approved,
            } => self.approval_for_all(&ctx, *owner, *operator, *approved),
            EcsEventKind::NameRegistered {
                label_topic, cost, ..
            } => self.name_registered(&ctx, *label_topic, *cost),
            EcsEventKind::NameRenewed {
                label_topic,
                cost,
                new_expiration,
            } => self.name_renewed(&ctx, *label_topic, *cost, *new_expiration),
            EcsEventKind::ResolverDeployed { resolver, owner } => {
                self.resolver_deployed(&ctx, *resolver, *owner)
            }
            EcsEventKind::EthAddressChanged { address } => self.eth_address_changed(&ctx, *address),
            EcsEventKind::AddressChanged { coin_type, address } => {
                self.address_changed(&ctx, *coin_type, address)
            }
            EcsEventKind::ContenthashChanged { hash } => self.contenthash_changed(&ctx, hash),
            EcsEventKind::TextChanged { key_topic, value } => {
                self.text_changed(&ctx, *key_topic, value)
            }
            EcsEventKind::ContractMetadataUpdated { key, value } => {
                self.contract_metadata_updated(&ctx, key, value)
            }
            EcsEventKind::ResolverOwnershipTransferred {
                previous_owner,
                new_owner,
            } => self.resolver_ownership_transferred(&ctx, *previous_owner, *new_owner),
        }
    }

    fn missing(&self, ctx: &Applying<'_>, entity: &'static str, id: &str) -> Outcome {
        tracing::debug!(
            target: "credindex_ecs::sink",
            chain_id = ctx.chain_id(),
            block_number = ctx.source.block_number,
            log_index = ctx.source.log_index,
            entity,
            id,
            "Referenced entity not found, mutation skipped"
        );
        Outcome::Skipped
    }

    fn updated<T>(&self, ctx: &Applying<'_>, entity: &'static str, id: &str, row: Option<T>) -> Outcome {
        match row {
            Some(_) => Outcome::Applied,
            None => self.missing(ctx, entity, id),
        }
    }

    // ----- registry -----

    /// Label read for `labelhash`, accepted only when it hashes to the event's label topic.
    async fn verified_label(&self, ctx: &Applying<'_>, labelhash: B256, label_topic: B256) -> Option<String> {
        let label = self
            .reader
            .label(ctx.chain_id(), ctx.source.block_number, ctx.source.contract, labelhash)
            .await?;
        if keccak256(label.as_bytes()) == label_topic {
            return Some(label);
        }
        tracing::warn!(
            target: "credindex_ecs::sink",
            chain_id = ctx.chain_id(),
            block_number = ctx.source.block_number,
            labelhash = %labelhash,
            label = %label,
            "Label read does not match the event's label topic, ignored"
        );
        None
    }

    async fn label_claimed(
        &self,
        ctx: &Applying<'_>,
        labelhash: B256,
        label_topic: B256,
        owner: Address,
    ) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let block_number = ctx.source.block_number;
        let registry = ctx.source.contract;

        let label = self.verified_label(ctx, labelhash, label_topic).await;
        let expiration = self.reader.expiration(chain_id, block_number, registry, labelhash).await;
        // Outer None: read failed. Inner None: no resolver set.
        let resolver_address = self
            .reader
            .resolver(chain_id, block_number, registry, labelhash)
            .await
            .map(non_zero);

        let timestamp = ctx.timestamp;
        let initial_expiration = expiration.unwrap_or(U256::ZERO);
        let insert = Credential {
            id: keys::credential(chain_id, &labelhash),
            chain_id,
            chain_name: chain_name(chain_id).to_string(),
            labelhash: keys::hex_b256(&labelhash),
            full_name: full_name(label.as_deref()),
            label: label.clone(),
            owner: keys::hex_address(&owner),
            resolver_address: resolver_address.clone().flatten(),
            resolver_updated_at: timestamp,
            review: None,
            expiration: initial_expiration,
            is_expired: is_expired(initial_expiration, timestamp),
            registration_cost: None,
            registered: ctx.provenance.clone(),
            last_update: ctx.provenance.clone(),
        };

        let owner = insert.owner.clone();
        let provenance = ctx.provenance.clone();
        self.store.upsert(insert, move |existing| {
            let label = label.or(existing.label);
            let expiration = expiration.unwrap_or(existing.expiration);
            let (resolver_address, resolver_updated_at) = match resolver_address {
                Some(address) => (address, timestamp),
                None => (existing.resolver_address, existing.resolver_updated_at),
            };
            Credential {
                full_name: full_name(label.as_deref()),
                label,
                owner,
                resolver_address,
                resolver_updated_at,
                expiration,
                is_expired: is_expired(expiration, timestamp),
                last_update: existing.last_update.clone().latest(provenance),
                ..existing
            }
        })?;

        Ok(Outcome::Applied)
    }

    fn credential_transferred(&self, ctx: &Applying<'_>, labelhash: B256, owner: Address) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let labelhash_hex = keys::hex_b256(&labelhash);
        let new_owner = keys::hex_address(&owner);

        self.store.insert_ignore(&CredentialTransfer {
            id: keys::history(
                chain_id,
                &labelhash_hex,
                ctx.source.block_number,
                ctx.source.log_index,
            ),
            chain_id,
            labelhash: labelhash_hex,
            new_owner: new_owner.clone(),
            provenance: ctx.provenance.clone(),
        })?;

        let id = keys::credential(chain_id, &labelhash);
        let updated = self.store.update::<Credential>(&id, |existing| Credential {
            owner: new_owner,
            is_expired: is_expired(existing.expiration, ctx.timestamp),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(self.updated(ctx, "credential", &id, updated))
    }

    async fn resolver_changed(&self, ctx: &Applying<'_>, labelhash: B256, resolver: Address) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let resolver_address = non_zero(resolver);

        let credential_id = keys::credential(chain_id, &labelhash);
        let credential = self.store.update::<Credential>(&credential_id, |existing| Credential {
            resolver_address: resolver_address.clone(),
            resolver_updated_at: ctx.timestamp,
            is_expired: is_expired(existing.expiration, ctx.timestamp),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        let outcome = self.updated(ctx, "credential", &credential_id, credential.as_ref());

        if resolver.is_zero() {
            return Ok(outcome);
        }

        match self.registry.state(chain_id, &resolver)? {
            AdmissionState::Known(existing) => {
                let read = self
                    .reader
                    .label(chain_id, ctx.source.block_number, ctx.source.contract, labelhash)
                    .await;
                let label = match read {
                    Some(label) => Some(label),
                    None => credential.and_then(|credential| credential.label),
                };
                let labelhash_hex = keys::hex_b256(&labelhash);
                self.store.update::<Resolver>(&existing.id, |existing| {
                    let label = label.or_else(|| {
                        (existing.labelhash.as_deref() == Some(labelhash_hex.as_str()))
                            .then(|| existing.label.clone())
                            .flatten()
                    });
                    Resolver {
                        labelhash: Some(labelhash_hex),
                        label,
                        last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
                        ..existing
                    }
                })?;
            }
            AdmissionState::Announced(_) | AdmissionState::Unknown => {
                self.registry
                    .announce(chain_id, &resolver, &labelhash, ctx.provenance.clone())?;
            }
        }

        // The pointer itself is recorded even when the credential is unknown.
        Ok(Outcome::Applied)
    }

    fn review_updated(&self, ctx: &Applying<'_>, labelhash: B256, review: &str) -> Result<Outcome> {
        let id = keys::credential(ctx.chain_id(), &labelhash);
        let updated = self.store.update::<Credential>(&id, |existing| Credential {
            review: Some(review.to_string()),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(self.updated(ctx, "credential", &id, updated))
    }

    fn expiration_extended(&self, ctx: &Applying<'_>, labelhash: B256, new_expiration: U256) -> Result<Outcome> {
        let id = keys::credential(ctx.chain_id(), &labelhash);
        let updated = self.store.update::<Credential>(&id, |existing| Credential {
            expiration: new_expiration,
            is_expired: is_expired(new_expiration, ctx.timestamp),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(self.updated(ctx, "credential", &id, updated))
    }

    fn approval_for_all(
        &self,
        ctx: &Applying<'_>,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let approval = Approval {
            id: keys::approval(chain_id, &owner, &operator),
            chain_id,
            owner: keys::hex_address(&owner),
            operator: keys::hex_address(&operator),
            approved,
            set_at: ctx.provenance.clone(),
        };
        let latest = approval.clone();
        self.store.upsert(approval, |_| latest)?;
        Ok(Outcome::Applied)
    }

    // ----- registrar -----

    /// The credential a registrar label topic (`keccak256(label)`) refers to: the one keyed
    /// by that hash, else one whose stored label hashes to it.
    fn credential_for_label_topic(&self, chain_id: u64, label_topic: B256) -> Result<Option<Credential>> {
        if let Some(credential) = self.store.find::<Credential>(&keys::credential(chain_id, &label_topic))? {
            return Ok(Some(credential));
        }
        let mut matches = self.store.scan::<Credential>(|credential| {
            credential.chain_id == chain_id
                && credential
                    .label
                    .as_deref()
                    .is_some_and(|label| keccak256(label.as_bytes()) == label_topic)
        })?;
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.into_iter().next())
    }

    /// Sets the registration cost only. Expiration stays governed by the registry's own
    /// events and reads, so the registrar's `expires` is not applied.
    fn name_registered(&self, ctx: &Applying<'_>, label_topic: B256, cost: U256) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let Some(credential) = self.credential_for_label_topic(chain_id, label_topic)? else {
            return Ok(self.missing(ctx, "credential", &keys::credential(chain_id, &label_topic)));
        };
        let updated = self.store.update::<Credential>(&credential.id, |existing| Credential {
            registration_cost: Some(cost),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(self.updated(ctx, "credential", &credential.id, updated))
    }

    fn name_renewed(
        &self,
        ctx: &Applying<'_>,
        label_topic: B256,
        cost: U256,
        new_expiration: U256,
    ) -> Result<Outcome> {
        let chain_id = ctx.chain_id();
        let (labelhash, labelhash_unverified) = match self.credential_for_label_topic(chain_id, label_topic)? {
            Some(credential) => (credential.labelhash, false),
            None => (keys::hex_b256(&label_topic), true),
        };
        self.store.insert_ignore(&Renewal {
            id: keys::renewal(chain_id, &ctx.source.tx_hash, ctx.source.log_index),
            chain_id,
            labelhash,
            labelhash_unverified,
            cost,
            new_expiration,
            provenance: ctx.provenance.clone(),
        })?;
        Ok(Outcome::Applied)
    }

    // ----- factory -----

    fn resolver_deployed(&self, ctx: &Applying<'_>, resolver: Address, owner: Address) -> Result<Outcome> {
        let chain_id = ctx.chain_id();

        // A registry announcement that came first already names the label.
        let labelhash = match self.registry.state(chain_id, &resolver)? {
            AdmissionState::Announced(admission) => Some(admission.labelhash),
            AdmissionState::Known(_) | AdmissionState::Unknown => None,
        };
        let label = self.credential_label(chain_id, labelhash.as_deref())?;

        let inserted = self.store.insert_ignore(&Resolver {
            id: keys::resolver(chain_id, &resolver),
            chain_id,
            chain_name: chain_name(chain_id).to_string(),
            address: keys::hex_address(&resolver),
            owner: keys::hex_address(&owner),
            labelhash,
            label,
            eth_address: None,
            contenthash: None,
            deployed: ctx.provenance.clone(),
            last_update: ctx.provenance.clone(),
        })?;

        if inserted {
            metrics::counter!("credindex_ecs_resolvers_admitted_total", "source" => "factory").increment(1);
            tracing::info!(
                target: "credindex_ecs::sink",
                chain_id,
                resolver = %keys::hex_address(&resolver),
                owner = %keys::hex_address(&owner),
                "Resolver deployed"
            );
        }
        Ok(Outcome::Applied)
    }

    // ----- resolver instances -----

    fn credential_label(&self, chain_id: u64, labelhash: Option<&str>) -> Result<Option<String>> {
        let Some(labelhash) = labelhash else {
            return Ok(None);
        };
        Ok(self
            .store
            .find::<Credential>(&keys::credential_hex(chain_id, labelhash))?
            .and_then(|credential| credential.label))
    }

    /// The resolver row for the emitting contract, creating it from a registry announcement
    /// when this is its first accepted event. None when the contract was never admitted.
    fn admitted_resolver(&self, ctx: &Applying<'_>, owner: Option<Address>) -> Result<Option<Resolver>> {
        let chain_id = ctx.chain_id();
        let contract = ctx.source.contract;

        match self.registry.state(chain_id, &contract)? {
            AdmissionState::Known(resolver) => Ok(Some(resolver)),
            AdmissionState::Announced(admission) => {
                let label = self.credential_label(chain_id, Some(&admission.labelhash))?;
                let resolver = Resolver {
                    id: admission.id,
                    chain_id,
                    chain_name: chain_name(chain_id).to_string(),
                    address: admission.resolver,
                    owner: keys::hex_address(&owner.unwrap_or(Address::ZERO)),
                    labelhash: Some(admission.labelhash),
                    label,
                    eth_address: None,
                    contenthash: None,
                    deployed: ctx.provenance.clone(),
                    last_update: ctx.provenance.clone(),
                };
                self.store.insert_ignore(&resolver)?;

                metrics::counter!("credindex_ecs_resolvers_admitted_total", "source" => "registry").increment(1);
                tracing::info!(
                    target: "credindex_ecs::sink",
                    chain_id,
                    resolver = %resolver.address,
                    "Announced resolver emitted its first event"
                );
                Ok(Some(resolver))
            }
            AdmissionState::Unknown => {
                tracing::debug!(
                    target: "credindex_ecs::sink",
                    chain_id,
                    contract = %keys::hex_address(&contract),
                    block_number = ctx.source.block_number,
                    "Event from unadmitted resolver dropped"
                );
                Ok(None)
            }
        }
    }

    fn upsert_address_record(&self, ctx: &Applying<'_>, coin_type: U256, address: String) -> Result<()> {
        let chain_id = ctx.chain_id();
        let record = AddressRecord {
            id: keys::address_record(chain_id, &ctx.source.contract, &coin_type),
            chain_id,
            resolver: keys::hex_address(&ctx.source.contract),
            coin_type,
            address: address.clone(),
            set_at: ctx.provenance.clone(),
            last_update: ctx.provenance.clone(),
        };
        self.store.upsert(record, |existing| AddressRecord {
            address,
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(())
    }

    fn eth_address_changed(&self, ctx: &Applying<'_>, address: Address) -> Result<Outcome> {
        let Some(resolver) = self.admitted_resolver(ctx, None)? else {
            return Ok(Outcome::Dropped);
        };
        let eth_address = keys::hex_address(&address);

        self.store.update::<Resolver>(&resolver.id, |existing| Resolver {
            eth_address: Some(eth_address.clone()),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        self.upsert_address_record(ctx, U256::from(ETH_COIN_TYPE), eth_address)?;
        Ok(Outcome::Applied)
    }

    fn address_changed(&self, ctx: &Applying<'_>, coin_type: U256, address: &Bytes) -> Result<Outcome> {
        let Some(resolver) = self.admitted_resolver(ctx, None)? else {
            return Ok(Outcome::Dropped);
        };
        let encoded = keys::hex_bytes(address);

        if coin_type == U256::from(ETH_COIN_TYPE) && address.len() == 20 {
            self.store.update::<Resolver>(&resolver.id, |existing| Resolver {
                eth_address: Some(encoded.clone()),
                last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
                ..existing
            })?;
        }
        self.upsert_address_record(ctx, coin_type, encoded)?;
        Ok(Outcome::Applied)
    }

    fn contenthash_changed(&self, ctx: &Applying<'_>, hash: &Bytes) -> Result<Outcome> {
        let Some(resolver) = self.admitted_resolver(ctx, None)? else {
            return Ok(Outcome::Dropped);
        };
        self.store.update::<Resolver>(&resolver.id, |existing| Resolver {
            contenthash: Some(keys::hex_bytes(hash)),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(Outcome::Applied)
    }

    fn text_changed(&self, ctx: &Applying<'_>, key_topic: B256, value: &str) -> Result<Outcome> {
        if self.admitted_resolver(ctx, None)?.is_none() {
            return Ok(Outcome::Dropped);
        }
        let chain_id = ctx.chain_id();
        // Only the key hash is in the log, so the row is keyed by occurrence.
        let key = keys::synthesized_text_key(ctx.source.block_number, ctx.source.log_index);

        let record = TextRecord {
            id: keys::record(chain_id, &ctx.source.contract, &key),
            chain_id,
            resolver: keys::hex_address(&ctx.source.contract),
            key,
            key_hash: Some(keys::hex_b256(&key_topic)),
            key_synthesized: true,
            value: value.to_string(),
            set_at: ctx.provenance.clone(),
            last_update: ctx.provenance.clone(),
        };
        self.store.upsert(record, |existing| TextRecord {
            value: value.to_string(),
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(Outcome::Applied)
    }

    fn contract_metadata_updated(&self, ctx: &Applying<'_>, key: &str, value: &Bytes) -> Result<Outcome> {
        if self.admitted_resolver(ctx, None)?.is_none() {
            return Ok(Outcome::Dropped);
        }
        let chain_id = ctx.chain_id();
        let encoded = keys::hex_bytes(value);

        let entry = ContractMetadataEntry {
            id: keys::record(chain_id, &ctx.source.contract, key),
            chain_id,
            resolver: keys::hex_address(&ctx.source.contract),
            key: key.to_string(),
            value: encoded.clone(),
            set_at: ctx.provenance.clone(),
            last_update: ctx.provenance.clone(),
        };
        self.store.upsert(entry, |existing| ContractMetadataEntry {
            value: encoded,
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(Outcome::Applied)
    }

    fn resolver_ownership_transferred(
        &self,
        ctx: &Applying<'_>,
        previous_owner: Address,
        new_owner: Address,
    ) -> Result<Outcome> {
        let Some(resolver) = self.admitted_resolver(ctx, Some(new_owner))? else {
            return Ok(Outcome::Dropped);
        };
        let chain_id = ctx.chain_id();
        let new_owner = keys::hex_address(&new_owner);

        self.store.insert_ignore(&ResolverTransfer {
            id: keys::history(
                chain_id,
                &resolver.address,
                ctx.source.block_number,
                ctx.source.log_index,
            ),
            chain_id,
            resolver: resolver.address.clone(),
            previous_owner: keys::hex_address(&previous_owner),
            new_owner: new_owner.clone(),
            provenance: ctx.provenance.clone(),
        })?;
        self.store.update::<Resolver>(&resolver.id, |existing| Resolver {
            owner: new_owner,
            last_update: existing.last_update.clone().latest(ctx.provenance.clone()),
            ..existing
        })?;
        Ok(Outcome::Applied)
    }

    fn timestamp_for(&self, event: &EcsEvent, batch: &ExtractionBatch) -> u64 {
        let source = &event.source;
        source
            .block_timestamp
            .or_else(|| batch.timestamp_of(source.block_number))
            .unwrap_or_else(|| {
                tracing::warn!(
                    target: "credindex_ecs::sink",
                    chain_id = source.chain_id,
                    block_number = source.block_number,
                    "Block timestamp unknown, using 0"
                );
                0
            })
    }
}

#[async_trait]
impl Sink for EcsSink {
    fn name(&self) -> &str {
        "ecs"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        vec![TypeId::new(ECS_EVENT_TYPE)]
    }

    async fn process(&self, envelopes: &[Envelope], batch: &ExtractionBatch) -> Result<()> {
        let started = Instant::now();
        let event_type = TypeId::new(ECS_EVENT_TYPE);
        let (mut applied, mut skipped, mut dropped, mut failed) = (0usize, 0usize, 0usize, 0usize);

        for envelope in envelopes {
            if envelope.type_id != event_type {
                continue;
            }
            let Some(event) = envelope.downcast_ref::<EcsEvent>() else {
                continue;
            };

            let timestamp = self.timestamp_for(event, batch);
            let outcome = match self.apply(event, timestamp).await {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Applied => applied += 1,
                        Outcome::Skipped => skipped += 1,
                        Outcome::Dropped => dropped += 1,
                    }
                    outcome.as_str()
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        target: "credindex_ecs::sink",
                        event = event.kind.name(),
                        chain_id = event.source.chain_id,
                        block_number = event.source.block_number,
                        log_index = event.source.log_index,
                        error = %e,
                        "Failed to apply event"
                    );
                    "failed"
                }
            };
            metrics::counter!(
                "credindex_ecs_events_total",
                "kind" => event.kind.name(),
                "outcome" => outcome
            )
            .increment(1);
        }

        metrics::histogram!("credindex_ecs_apply_seconds").record(started.elapsed().as_secs_f64());

        if applied + skipped + dropped + failed > 0 {
            tracing::info!(
                target: "credindex_ecs::sink",
                chain_id = batch.chain_id,
                applied,
                skipped,
                dropped,
                failed,
                "Applied ECS events"
            );
        }
        Ok(())
    }

    fn build_routes(&self) -> Router {
        api::router(ApiState::new(self.store.clone(), self.api_key.clone()))
    }
}
