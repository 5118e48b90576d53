//! DecoderContext routes logs to the registered decoders.
//!
//! Decoders are identified by the hash of their name and are always invoked in sorted
//! id order so the envelope sequence for a log is deterministic across restarts.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ContractFilter, ContractRef, Decoder, DecoderId};
use crate::etl::envelope::Envelope;
use crate::etl::event::RawLog;

pub struct DecoderContext {
    decoders: BTreeMap<DecoderId, Arc<dyn Decoder>>,
    contract_filter: ContractFilter,
}

impl DecoderContext {
    pub fn new(decoders: Vec<Arc<dyn Decoder>>, contract_filter: ContractFilter) -> anyhow::Result<Self> {
        contract_filter.validate()?;

        let mut decoder_map = BTreeMap::new();
        for decoder in decoders {
            let name = decoder.decoder_name().to_string();
            let id = DecoderId::new(&name);
            if decoder_map.insert(id, decoder).is_some() {
                anyhow::bail!("Duplicate decoder name '{name}'. Decoder names must be unique");
            }
            tracing::debug!(
                target: "credindex::etl::decoder_context",
                "Registered decoder '{}' with ID {:?}",
                name,
                id
            );
        }

        tracing::info!(
            target: "credindex::etl::decoder_context",
            decoders = decoder_map.len(),
            mapped = contract_filter.mappings.len(),
            blacklisted = contract_filter.blacklist.len(),
            skip_unmapped = contract_filter.skip_unmapped,
            "Initialized DecoderContext"
        );

        Ok(Self {
            decoders: decoder_map,
            contract_filter,
        })
    }

    pub fn decoder_ids(&self) -> Vec<DecoderId> {
        self.decoders.keys().copied().collect()
    }

    async fn run_decoder(&self, decoder: &Arc<dyn Decoder>, event: &RawLog) -> Vec<Envelope> {
        match decoder.decode_event(event).await {
            Ok(envelopes) => {
                if !envelopes.is_empty() {
                    tracing::trace!(
                        target: "credindex::etl::decoder_context",
                        "Decoder '{}' decoded log {}:{} into {} envelope(s)",
                        decoder.decoder_name(),
                        event.block_number,
                        event.log_index,
                        envelopes.len()
                    );
                }
                envelopes
            }
            Err(e) => {
                // One bad log must not stall the stream.
                tracing::warn!(
                    target: "credindex::etl::decoder_context",
                    decoder = decoder.decoder_name(),
                    block = event.block_number,
                    log_index = event.log_index,
                    error = %e,
                    "Decoder failed, skipping log"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Decoder for DecoderContext {
    fn decoder_name(&self) -> &str {
        "context"
    }

    async fn decode_event(&self, event: &RawLog) -> anyhow::Result<Vec<Envelope>> {
        let contract = ContractRef::of(event);
        if !self.contract_filter.allows(&contract) {
            return Ok(Vec::new());
        }

        let mut all_envelopes = Vec::new();

        if let Some(decoder_ids) = self.contract_filter.get_decoders(&contract) {
            for decoder_id in decoder_ids {
                if let Some(decoder) = self.decoders.get(decoder_id) {
                    all_envelopes.extend(self.run_decoder(decoder, event).await);
                } else {
                    tracing::warn!(
                        target: "credindex::etl::decoder_context",
                        "Mapped decoder ID {:?} not found for contract {:#x}",
                        decoder_id,
                        event.address
                    );
                }
            }
        } else if self.contract_filter.skip_unmapped {
            tracing::trace!(
                target: "credindex::etl::decoder_context",
                contract = %format!("{:#x}", event.address),
                "Skipping unmapped contract"
            );
        } else {
            for decoder in self.decoders.values() {
                all_envelopes.extend(self.run_decoder(decoder, event).await);
            }
        }

        Ok(all_envelopes)
    }

    async fn decode(&self, events: &[RawLog]) -> anyhow::Result<Vec<Envelope>> {
        let mut all_envelopes = Vec::new();
        for event in events {
            all_envelopes.extend(self.decode_event(event).await?);
        }

        tracing::debug!(
            target: "credindex::etl::decoder_context",
            "Decoded {} logs into {} envelopes across {} decoders",
            events.len(),
            all_envelopes.len(),
            self.decoders.len(),
        );

        Ok(all_envelopes)
    }
}
