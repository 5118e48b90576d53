//! Envelopes carry decoded payloads from decoders to sinks.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use super::event::LogPosition;

/// Type identifier derived from a string name (e.g. `"ecs.event"`).
///
/// Sinks compare it against their interested types before downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u64);

impl TypeId {
    pub fn new(type_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        type_name.hash(&mut hasher);
        TypeId(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Payload carried by an envelope.
pub trait TypedBody: Send + Sync {
    fn envelope_type_id(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
}

/// Decoded data plus the position of the log it came from.
///
/// The position is what lets a sink apply envelopes in chain order even when several
/// decoders contributed to the same batch.
pub struct Envelope {
    pub id: String,
    pub type_id: TypeId,
    pub body: Box<dyn TypedBody>,
    pub metadata: HashMap<String, String>,
    pub position: LogPosition,
}

impl Envelope {
    pub fn new(
        id: impl Into<String>,
        body: Box<dyn TypedBody>,
        metadata: HashMap<String, String>,
        position: LogPosition,
    ) -> Self {
        let type_id = body.envelope_type_id();
        Self {
            id: id.into(),
            type_id,
            body,
            metadata,
            position,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.body.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("position", &self.position)
            .field("metadata", &self.metadata)
            .finish()
    }
}
