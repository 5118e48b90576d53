//! Credential service indexing for credindex.
//!
//! Materializes credentials, resolvers and their records from registry, registrar,
//! resolver factory and resolver instance logs:
//! - [`EcsDecoder`] turns logs into [`EcsEvent`]s
//! - [`EcsSink`] reconciles them into the [`EcsStore`] and serves the read API
//! - [`DynamicRegistry`] tracks which resolver contracts are admitted
//! - [`BestEffortReader`] enriches events with bounded view calls

pub mod abi;
pub mod api;
pub mod chain;
pub mod decoder;
pub mod derived;
pub mod error;
pub mod keys;
pub mod reader;
pub mod registry;
pub mod sink;
pub mod storage;

pub use chain::Deployment;
pub use decoder::{EcsDecoder, EcsEvent, EcsEventKind, EventSource};
pub use reader::{BestEffortReader, ChainReader, NoopChainReader, RpcChainReader};
pub use registry::DynamicRegistry;
pub use sink::{EcsSink, Outcome};
pub use storage::EcsStore;
