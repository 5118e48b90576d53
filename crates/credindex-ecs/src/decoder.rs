//! Event normalizer: EVM logs → [`EcsEvent`] envelopes.
//!
//! Registry, registrar and factory events are only decoded when the log comes from the
//! chain's known deployment. Resolver events are decoded from any address; whether the
//! emitting contract is admitted is decided by the sink when it applies the event, since
//! an admission earlier in the same batch must count.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use credindex::etl::envelope::TypeId;
use credindex::etl::{Decoder, Envelope, RawLog, TypedBody};
use std::any::Any;
use std::collections::HashMap;

use crate::abi::{factory, registrar, registry, resolver};
use crate::chain::{ContractRole, Deployment};

pub const ECS_EVENT_TYPE: &str = "ecs.event";

/// Where a log came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub chain_id: u64,
    pub contract: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
    /// Filled when the extractor knew the block timestamp.
    pub block_timestamp: Option<u64>,
}

impl EventSource {
    fn of(log: &RawLog) -> Self {
        Self {
            chain_id: log.chain_id,
            contract: log.address,
            block_number: log.block_number,
            log_index: log.log_index,
            tx_hash: log.transaction_hash,
            block_timestamp: log.block_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsEventKind {
    // Registry
    LabelClaimed {
        labelhash: B256,
        /// keccak256 of the label; the plaintext is not in the log.
        label_topic: B256,
        owner: Address,
    },
    CredentialTransferred {
        labelhash: B256,
        owner: Address,
    },
    ResolverChanged {
        labelhash: B256,
        resolver: Address,
    },
    ReviewUpdated {
        labelhash: B256,
        review: String,
    },
    ExpirationExtended {
        labelhash: B256,
        new_expiration: U256,
    },
    ApprovalForAll {
        owner: Address,
        operator: Address,
        approved: bool,
    },

    // Registrar
    NameRegistered {
        label_topic: B256,
        owner: Address,
        cost: U256,
        expires: U256,
    },
    NameRenewed {
        label_topic: B256,
        cost: U256,
        new_expiration: U256,
    },

    // Factory
    ResolverDeployed {
        resolver: Address,
        owner: Address,
    },

    // Resolver instances
    EthAddressChanged {
        address: Address,
    },
    AddressChanged {
        coin_type: U256,
        address: Bytes,
    },
    ContenthashChanged {
        hash: Bytes,
    },
    TextChanged {
        key_topic: B256,
        value: String,
    },
    ContractMetadataUpdated {
        key: String,
        value: Bytes,
    },
    ResolverOwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

impl EcsEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LabelClaimed { .. } => "label_claimed",
            Self::CredentialTransferred { .. } => "credential_transferred",
            Self::ResolverChanged { .. } => "resolver_changed",
            Self::ReviewUpdated { .. } => "review_updated",
            Self::ExpirationExtended { .. } => "expiration_extended",
            Self::ApprovalForAll { .. } => "approval_for_all",
            Self::NameRegistered { .. } => "name_registered",
            Self::NameRenewed { .. } => "name_renewed",
            Self::ResolverDeployed { .. } => "resolver_deployed",
            Self::EthAddressChanged { .. } => "eth_address_changed",
            Self::AddressChanged { .. } => "address_changed",
            Self::ContenthashChanged { .. } => "contenthash_changed",
            Self::TextChanged { .. } => "text_changed",
            Self::ContractMetadataUpdated { .. } => "contract_metadata_updated",
            Self::ResolverOwnershipTransferred { .. } => "resolver_ownership_transferred",
        }
    }

    /// Events emitted by resolver instances, subject to admission.
    pub fn is_resolver_event(&self) -> bool {
        matches!(
            self,
            Self::EthAddressChanged { .. }
                | Self::AddressChanged { .. }
                | Self::ContenthashChanged { .. }
                | Self::TextChanged { .. }
                | Self::ContractMetadataUpdated { .. }
                | Self::ResolverOwnershipTransferred { .. }
        )
    }
}

/// A normalized protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsEvent {
    pub source: EventSource,
    pub kind: EcsEventKind,
}

impl TypedBody for EcsEvent {
    fn envelope_type_id(&self) -> TypeId {
        TypeId::new(ECS_EVENT_TYPE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn decode<E: SolEvent>(log: &RawLog) -> Result<E> {
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true).with_context(|| {
        format!(
            "malformed {} log at block {} index {}",
            E::SIGNATURE,
            log.block_number,
            log.log_index
        )
    })
}

/// Decoder for registry, registrar, factory and resolver events.
pub struct EcsDecoder {
    deployments: HashMap<u64, Deployment>,
}

impl EcsDecoder {
    pub fn new(deployments: impl IntoIterator<Item = Deployment>) -> Self {
        Self {
            deployments: deployments
                .into_iter()
                .map(|deployment| (deployment.chain_id, deployment))
                .collect(),
        }
    }

    fn decode_registry(selector: B256, log: &RawLog) -> Result<Option<EcsEventKind>> {
        let kind = if selector == registry::NewLabelhashOwner::SIGNATURE_HASH {
            let event = decode::<registry::NewLabelhashOwner>(log)?;
            EcsEventKind::LabelClaimed {
                labelhash: event.labelhash,
                label_topic: event.label,
                owner: event.owner,
            }
        } else if selector == registry::Transfer::SIGNATURE_HASH {
            let event = decode::<registry::Transfer>(log)?;
            EcsEventKind::CredentialTransferred {
                labelhash: event.labelhash,
                owner: event.owner,
            }
        } else if selector == registry::ResolverChanged::SIGNATURE_HASH {
            let event = decode::<registry::ResolverChanged>(log)?;
            EcsEventKind::ResolverChanged {
                labelhash: event.labelhash,
                resolver: event.resolver,
            }
        } else if selector == registry::ResolverReviewUpdated::SIGNATURE_HASH {
            let event = decode::<registry::ResolverReviewUpdated>(log)?;
            EcsEventKind::ReviewUpdated {
                labelhash: event.labelhash,
                review: event.review,
            }
        } else if selector == registry::ExpirationExtended::SIGNATURE_HASH {
            let event = decode::<registry::ExpirationExtended>(log)?;
            EcsEventKind::ExpirationExtended {
                labelhash: event.labelhash,
                new_expiration: event.newExpiration,
            }
        } else if selector == registry::ApprovalForAll::SIGNATURE_HASH {
            let event = decode::<registry::ApprovalForAll>(log)?;
            EcsEventKind::ApprovalForAll {
                owner: event.owner,
                operator: event.operator,
                approved: event.approved,
            }
        } else {
            return Ok(None);
        };
        Ok(Some(kind))
    }

    fn decode_registrar(selector: B256, log: &RawLog) -> Result<Option<EcsEventKind>> {
        let kind = if selector == registrar::NameRegistered::SIGNATURE_HASH {
            let event = decode::<registrar::NameRegistered>(log)?;
            EcsEventKind::NameRegistered {
                label_topic: event.label,
                owner: event.owner,
                cost: event.cost,
                expires: event.expires,
            }
        } else if selector == registrar::NameRenewed::SIGNATURE_HASH {
            let event = decode::<registrar::NameRenewed>(log)?;
            EcsEventKind::NameRenewed {
                label_topic: event.label,
                cost: event.cost,
                new_expiration: event.newExpiration,
            }
        } else {
            return Ok(None);
        };
        Ok(Some(kind))
    }

    fn decode_factory(selector: B256, log: &RawLog) -> Result<Option<EcsEventKind>> {
        if selector != factory::ResolverCloneDeployed::SIGNATURE_HASH {
            return Ok(None);
        }
        let event = decode::<factory::ResolverCloneDeployed>(log)?;
        Ok(Some(EcsEventKind::ResolverDeployed {
            resolver: event.clone,
            owner: event.owner,
        }))
    }

    fn decode_resolver(selector: B256, log: &RawLog) -> Result<Option<EcsEventKind>> {
        let kind = if selector == resolver::AddrChanged::SIGNATURE_HASH {
            let event = decode::<resolver::AddrChanged>(log)?;
            EcsEventKind::EthAddressChanged { address: event.a }
        } else if selector == resolver::AddressChanged::SIGNATURE_HASH {
            let event = decode::<resolver::AddressChanged>(log)?;
            EcsEventKind::AddressChanged {
                coin_type: event.coinType,
                address: event.newAddress,
            }
        } else if selector == resolver::ContenthashChanged::SIGNATURE_HASH {
            let event = decode::<resolver::ContenthashChanged>(log)?;
            EcsEventKind::ContenthashChanged { hash: event.hash }
        } else if selector == resolver::TextChanged::SIGNATURE_HASH {
            let event = decode::<resolver::TextChanged>(log)?;
            EcsEventKind::TextChanged {
                key_topic: event.key,
                value: event.value,
            }
        } else if selector == resolver::ContractMetadataUpdated::SIGNATURE_HASH {
            let event = decode::<resolver::ContractMetadataUpdated>(log)?;
            EcsEventKind::ContractMetadataUpdated {
                key: event.key,
                value: event.value,
            }
        } else if selector == resolver::OwnershipTransferred::SIGNATURE_HASH {
            let event = decode::<resolver::OwnershipTransferred>(log)?;
            EcsEventKind::ResolverOwnershipTransferred {
                previous_owner: event.previousOwner,
                new_owner: event.newOwner,
            }
        } else {
            return Ok(None);
        };
        Ok(Some(kind))
    }
}

#[async_trait]
impl Decoder for EcsDecoder {
    fn decoder_name(&self) -> &str {
        "ecs"
    }

    async fn decode_event(&self, log: &RawLog) -> Result<Vec<Envelope>> {
        let Some(selector) = log.selector() else {
            return Ok(Vec::new());
        };

        let role = self
            .deployments
            .get(&log.chain_id)
            .and_then(|deployment| deployment.role_of(log.address));

        let kind = match role {
            Some(ContractRole::Registry) => Self::decode_registry(selector, log)?,
            Some(ContractRole::Registrar) => Self::decode_registrar(selector, log)?,
            Some(ContractRole::Factory) => Self::decode_factory(selector, log)?,
            None => Self::decode_resolver(selector, log)?,
        };

        let Some(kind) = kind else {
            tracing::trace!(
                target: "credindex_ecs::decoder",
                chain_id = log.chain_id,
                contract = %log.address,
                selector = %selector,
                block_number = log.block_number,
                "Unhandled event selector"
            );
            return Ok(Vec::new());
        };

        let id = format!(
            "ecs_{}_{}_{}_{}",
            kind.name(),
            log.chain_id,
            log.block_number,
            log.log_index
        );
        let event = EcsEvent {
            source: EventSource::of(log),
            kind,
        };
        Ok(vec![Envelope::new(
            id,
            Box::new(event),
            log.metadata(),
            log.position(),
        )])
    }
}
