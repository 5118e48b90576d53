//! Known chains and per-chain contract deployments.

use alloy_primitives::{address, Address};

pub const MAINNET: u64 = 1;
pub const SEPOLIA: u64 = 11155111;

/// Parent name every credential label lives under.
pub const NAME_SUFFIX: &str = ".ecs.eth";

pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        MAINNET => "mainnet",
        SEPOLIA => "sepolia",
        _ => "unknown",
    }
}

/// Which statically deployed contract emitted a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRole {
    Registry,
    Registrar,
    Factory,
}

/// Registry, registrar and resolver factory of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub chain_id: u64,
    pub registry: Address,
    pub registrar: Address,
    pub factory: Address,
    /// First block worth indexing.
    pub start_block: u64,
}

impl Deployment {
    pub fn sepolia() -> Self {
        Self {
            chain_id: SEPOLIA,
            registry: address!("1Cc0E6c3B645D7751DE7Ff7ce7d17cD228e4a4F2"),
            registrar: address!("86a67901820da1e3523Db67d02083C0a08170b37"),
            factory: address!("b5b31DEb61f6b9Dd61b222ad50084e11EF53B8E3"),
            start_block: 9_900_600,
        }
    }

    pub fn role_of(&self, address: Address) -> Option<ContractRole> {
        if address == self.registry {
            Some(ContractRole::Registry)
        } else if address == self.registrar {
            Some(ContractRole::Registrar)
        } else if address == self.factory {
            Some(ContractRole::Factory)
        } else {
            None
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        vec![self.registry, self.registrar, self.factory]
    }
}
