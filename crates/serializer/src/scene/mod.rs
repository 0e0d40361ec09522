mod host;
mod math;
mod world;

pub use host::{EntityDescriptor, EntityId, EntityRole, HostWorld};
pub use math::{Transform, Vec3};
pub use world::{
    Activation, Entity, EntityIdAllocator, EntitySpawn, LevelState, SceneWorld, SpawnState,
    TRANSIENT_CONTAINER,
};
