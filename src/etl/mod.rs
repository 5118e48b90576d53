pub mod decoder;
pub mod engine_db;
pub mod envelope;
pub mod event;
pub mod extractor;
pub mod sink;

pub use decoder::{ContractFilter, ContractRef, Decoder, DecoderContext, DecoderId};
pub use engine_db::{EngineDb, EngineStats};
pub use envelope::{Envelope, TypeId, TypedBody};
pub use event::{LogPosition, RawLog};
pub use extractor::{
    BlockContext, ExtractionBatch, Extractor, LogRangeConfig, LogRangeExtractor, ReplayExtractor,
    RetryPolicy,
};
pub use sink::{MultiSink, Sink, SinkContext};
