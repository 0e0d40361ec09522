mod codec;
pub mod identity;
mod persistent;
pub mod policy;
mod property;
mod registry;
mod restore;
mod types;
mod world_store;

pub use codec::EntityCodec;
pub use identity::resolve;
pub use persistent::PersistentPool;
pub use policy::{exclusion_reason, is_included, tags, ExclusionReason, BLACKLISTED_ROLES};
pub use property::{CodecError, ErasedPersistable, JsonPropertyCodec, Persistable, PropertyCodec};
pub use registry::TypeRegistry;
pub use restore::{restore_actors, RestoreReport};
pub use types::{
    ActorPayload, EntityKey, EntityPayload, GameStateSnapshot, WorldId, WorldSnapshot,
};
pub use world_store::{capture_world, restore_world};
