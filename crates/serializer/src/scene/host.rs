use crate::persist::{EntityKey, ErasedPersistable, WorldId};

use super::math::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

/// Engine-level role of an entity. Roles other than `Generic` and `Pawn`
/// are session infrastructure and never captured as world entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EntityRole {
    #[default]
    Generic,
    Pawn,
    PlayerState,
    Controller,
    GameMode,
    GameState,
}

/// What the persistence layer needs to know about one live entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub name: String,
    /// Structural containers, outermost first.
    pub containers: Vec<String>,
    pub type_name: String,
    pub role: EntityRole,
    pub tags: Vec<String>,
    pub root_is_static: bool,
    pub parent: Option<EntityId>,
    pub is_child_actor: bool,
    /// `None` for entities with no spatial placement.
    pub transform: Option<Transform>,
    pub was_spawned: bool,
    pub attachment_point: Option<String>,
}

impl EntityDescriptor {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn display_path(&self) -> String {
        format!("{}:{}", self.containers.join("."), self.name)
    }
}

/// The hosting simulation, as seen by capture and restore.
///
/// Restore constructs entities in two steps: `begin_deferred_spawn` creates
/// an entity that is not yet enumerated by `entities_in_world`, and
/// `finish_spawning` places it and runs its activation.
pub trait HostWorld {
    /// Worlds that currently take part in capture.
    fn registered_worlds(&self) -> Vec<WorldId>;
    fn entities_in_world(&self, world: &WorldId) -> Vec<EntityId>;
    fn describe(&self, id: EntityId) -> Option<EntityDescriptor>;

    fn persistable(&self, id: EntityId) -> Option<&dyn ErasedPersistable>;
    fn persistable_mut(&mut self, id: EntityId) -> Option<&mut dyn ErasedPersistable>;

    fn begin_deferred_spawn(
        &mut self,
        world: &WorldId,
        declared_type: &str,
        name: &str,
        transform: Transform,
    ) -> Option<EntityId>;
    fn finish_spawning(&mut self, id: EntityId, transform: Transform) -> bool;
    /// Moves an entity and clears its physics velocity.
    fn teleport(&mut self, id: EntityId, transform: Transform) -> bool;

    fn is_world_visible(&self, world: &WorldId) -> bool;
    fn open_world(&mut self, map_name: &str);
    fn current_map_name(&self) -> String;
    fn game_options(&self) -> String;
    fn principal_transform(&self) -> Option<Transform>;
    fn session_actor(&self) -> Option<EntityId>;

    /// Live entity with `key`, whether it sits in a world or outside one.
    fn find_persistent(&self, key: &EntityKey) -> Option<EntityId>;
    fn create_persistent(&mut self, declared_type: &str, name: &str) -> Option<EntityId>;
    /// Reclaims persistent entities that nothing references. Returns the
    /// number of entities removed.
    fn collect_garbage(&mut self, held: &[EntityId]) -> usize;
}
