//! Dynamic registry of admitted resolver contracts.
//!
//! Resolvers are created at runtime, so the set of in-scope addresses grows with the
//! event stream. An address is admitted when the factory deploys it (a `resolvers` row
//! is written directly) or when the registry points a label at it (an `admissions` row
//! is written until the resolver emits its first accepted event). Events from any other
//! resolver-shaped contract are dropped.

use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::sync::Arc;

use crate::keys;
use crate::storage::{Admission, EcsStore, Provenance, Resolver};

/// What the registry knows about a resolver address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionState {
    /// The resolver row exists.
    Known(Resolver),
    /// Announced by the registry, no resolver row yet.
    Announced(Admission),
    Unknown,
}

#[derive(Clone)]
pub struct DynamicRegistry {
    store: Arc<EcsStore>,
}

impl DynamicRegistry {
    pub fn new(store: Arc<EcsStore>) -> Self {
        Self { store }
    }

    pub fn state(&self, chain_id: u64, address: &Address) -> Result<AdmissionState> {
        let id = keys::resolver(chain_id, address);
        if let Some(resolver) = self.store.find::<Resolver>(&id)? {
            return Ok(AdmissionState::Known(resolver));
        }
        if let Some(admission) = self.store.find::<Admission>(&id)? {
            return Ok(AdmissionState::Announced(admission));
        }
        Ok(AdmissionState::Unknown)
    }

    pub fn is_admitted(&self, chain_id: u64, address: &Address) -> Result<bool> {
        Ok(!matches!(
            self.state(chain_id, address)?,
            AdmissionState::Unknown
        ))
    }

    /// Record a registry announcement. Later announcements of the same address replace the
    /// label hash, so the resolver takes the most recent label once it is created.
    pub fn announce(
        &self,
        chain_id: u64,
        address: &Address,
        labelhash: &B256,
        announced: Provenance,
    ) -> Result<()> {
        let admission = Admission {
            id: keys::resolver(chain_id, address),
            chain_id,
            resolver: keys::hex_address(address),
            labelhash: keys::hex_b256(labelhash),
            announced,
        };
        let latest = admission.clone();
        self.store.upsert(admission, |_| latest)?;

        tracing::debug!(
            target: "credindex_ecs::registry",
            chain_id,
            resolver = %keys::hex_address(address),
            "Resolver announced by registry"
        );
        Ok(())
    }
}
