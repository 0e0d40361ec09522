use std::fmt;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::persist::identity::key_from_path;
use crate::persist::{EntityKey, ErasedPersistable, Persistable, TypeRegistry, WorldId};

use super::host::{EntityDescriptor, EntityId, EntityRole, HostWorld};
use super::math::{Transform, Vec3};

/// Container name for entities that live outside every world.
pub const TRANSIENT_CONTAINER: &str = "Transient";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnState {
    Constructing,
    Live,
}

pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub world: Option<WorldId>,
    pub type_name: String,
    pub role: EntityRole,
    pub tags: Vec<String>,
    pub root_is_static: bool,
    pub parent: Option<EntityId>,
    pub transform: Transform,
    pub velocity: Vec3,
    pub spatial: bool,
    pub was_spawned: bool,
    pub attachment_point: Option<String>,
    pub rooted: bool,
    pub state: SpawnState,
    component: Option<Box<dyn ErasedPersistable>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("world", &self.world)
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .field("transform", &self.transform)
            .field("persistable", &self.component.is_some())
            .finish_non_exhaustive()
    }
}

impl Entity {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn component(&self) -> Option<&dyn ErasedPersistable> {
        self.component.as_deref()
    }

    fn container(&self) -> &str {
        match &self.world {
            Some(world) => world.as_str(),
            None => TRANSIENT_CONTAINER,
        }
    }

    fn describe(&self) -> EntityDescriptor {
        EntityDescriptor {
            name: self.name.clone(),
            containers: vec![self.container().to_string()],
            type_name: self.type_name.clone(),
            role: self.role,
            tags: self.tags.clone(),
            root_is_static: self.root_is_static,
            parent: self.parent,
            is_child_actor: self.parent.is_some(),
            transform: self.spatial.then_some(self.transform),
            was_spawned: self.was_spawned,
            attachment_point: self.attachment_point.clone(),
        }
    }
}

/// Construction parameters for [`SceneWorld`] spawns.
pub struct EntitySpawn {
    pub name: String,
    pub type_name: String,
    pub role: EntityRole,
    pub tags: Vec<String>,
    pub root_is_static: bool,
    pub parent: Option<EntityId>,
    pub attachment_point: Option<String>,
    pub transform: Transform,
    pub component: Option<Box<dyn ErasedPersistable>>,
}

impl EntitySpawn {
    pub fn persistable<T: Persistable>(name: impl Into<String>, value: T) -> Self {
        Self {
            component: Some(Box::new(value)),
            ..Self::plain(name, T::TYPE_NAME)
        }
    }

    pub fn plain(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            role: EntityRole::Generic,
            tags: Vec::new(),
            root_is_static: false,
            parent: None,
            attachment_point: None,
            transform: Transform::default(),
            component: None,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn with_role(mut self, role: EntityRole) -> Self {
        self.role = role;
        self
    }

    pub fn at(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_static_root(mut self) -> Self {
        self.root_is_static = true;
        self
    }

    pub fn attached_to(mut self, point: impl Into<String>) -> Self {
        self.attachment_point = Some(point.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelState {
    pub world_id: WorldId,
    pub visible: bool,
    pub registered: bool,
}

/// Record of one `finish_spawning` call: where the entity stood and what
/// its persistable fields held at the moment it became live.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub id: EntityId,
    pub transform: Transform,
    pub fields: Option<Value>,
}

/// In-memory simulation host: a set of loaded worlds plus a transient
/// container for entities that outlive them.
#[derive(Debug, Default)]
pub struct SceneWorld {
    registry: TypeRegistry,
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<Entity>,
    levels: Vec<LevelState>,
    current_map: String,
    game_options: String,
    principal: Option<EntityId>,
    session_actor: Option<EntityId>,
    pending_open: Option<String>,
    activations: Vec<Activation>,
}

impl SceneWorld {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn load_world(&mut self, world_id: WorldId) -> bool {
        if self.level(&world_id).is_some() {
            return false;
        }
        debug!(world = %world_id, "world_loaded");
        self.levels.push(LevelState {
            world_id,
            visible: true,
            registered: true,
        });
        true
    }

    pub fn unload_world(&mut self, world_id: &WorldId) -> usize {
        let in_world = |entity: &Entity| entity.world.as_ref() == Some(world_id);
        let doomed = self
            .entities
            .iter()
            .chain(self.pending_spawns.iter())
            .filter(|entity| in_world(entity))
            .map(|entity| entity.id)
            .collect::<Vec<_>>();
        self.entities.retain(|entity| !in_world(entity));
        self.pending_spawns.retain(|entity| !in_world(entity));
        self.forget_handles(&doomed);
        self.levels.retain(|level| &level.world_id != world_id);
        debug!(world = %world_id, removed = doomed.len(), "world_unloaded");
        doomed.len()
    }

    pub fn set_world_visible(&mut self, world_id: &WorldId, visible: bool) -> bool {
        match self.level_mut(world_id) {
            Some(level) => {
                level.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn set_world_registered(&mut self, world_id: &WorldId, registered: bool) -> bool {
        match self.level_mut(world_id) {
            Some(level) => {
                level.registered = registered;
                true
            }
            None => false,
        }
    }

    pub fn levels(&self) -> &[LevelState] {
        &self.levels
    }

    /// Spawns an entity that is part of the world's authored content.
    pub fn spawn_placed(&mut self, world_id: &WorldId, spawn: EntitySpawn) -> EntityId {
        self.spawn_live(Some(world_id.clone()), spawn, false, true)
    }

    /// Spawns an entity created during play; restore has to recreate it.
    pub fn spawn_runtime(&mut self, world_id: &WorldId, spawn: EntitySpawn) -> EntityId {
        self.spawn_live(Some(world_id.clone()), spawn, true, true)
    }

    /// Spawns a non-spatial entity outside every world.
    pub fn spawn_transient(&mut self, spawn: EntitySpawn) -> EntityId {
        self.spawn_live(None, spawn, true, false)
    }

    fn spawn_live(
        &mut self,
        world: Option<WorldId>,
        spawn: EntitySpawn,
        was_spawned: bool,
        spatial: bool,
    ) -> EntityId {
        let mut entity = self.build_entity(world, spawn, was_spawned, spatial);
        entity.state = SpawnState::Live;
        self.push_live(entity)
    }

    fn build_entity(
        &mut self,
        world: Option<WorldId>,
        spawn: EntitySpawn,
        was_spawned: bool,
        spatial: bool,
    ) -> Entity {
        let name = self.unique_name(world.as_ref(), &spawn.name);
        Entity {
            id: self.allocator.allocate(),
            name,
            world,
            type_name: spawn.type_name,
            role: spawn.role,
            tags: spawn.tags,
            root_is_static: spawn.root_is_static,
            parent: spawn.parent,
            transform: spawn.transform,
            velocity: Vec3::ZERO,
            spatial,
            was_spawned,
            attachment_point: spawn.attachment_point,
            rooted: false,
            state: SpawnState::Constructing,
            component: spawn.component,
        }
    }

    fn push_live(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.entities.push(entity);
        id
    }

    fn unique_name(&self, world: Option<&WorldId>, base: &str) -> String {
        let base = if base.is_empty() { "Entity" } else { base };
        let taken = |candidate: &str| {
            self.entities
                .iter()
                .chain(self.pending_spawns.iter())
                .any(|entity| entity.world.as_ref() == world && entity.name == candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix = suffix.saturating_add(1);
        }
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let before = self.entities.len() + self.pending_spawns.len();
        self.entities.retain(|entity| entity.id != id);
        self.pending_spawns.retain(|entity| entity.id != id);
        let removed = before != self.entities.len() + self.pending_spawns.len();
        if removed {
            self.forget_handles(&[id]);
        }
        removed
    }

    fn forget_handles(&mut self, removed: &[EntityId]) {
        if self.principal.is_some_and(|id| removed.contains(&id)) {
            self.principal = None;
        }
        if self.session_actor.is_some_and(|id| removed.contains(&id)) {
            self.session_actor = None;
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_count_in(&self, world_id: &WorldId) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.world.as_ref() == Some(world_id))
            .count()
    }

    pub fn pending_spawn_count(&self) -> usize {
        self.pending_spawns.len()
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    pub fn find_by_name(&self, world: Option<&WorldId>, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| entity.world.as_ref() == world && entity.name == name)
            .map(|entity| entity.id)
    }

    fn find_any(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .iter()
            .chain(self.pending_spawns.iter())
            .find(|entity| entity.id == id)
    }

    fn find_any_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities
            .iter_mut()
            .chain(self.pending_spawns.iter_mut())
            .find(|entity| entity.id == id)
    }

    pub fn component<T: Persistable>(&self, id: EntityId) -> Option<&T> {
        self.find_entity(id)?.component.as_deref()?.downcast_ref::<T>()
    }

    pub fn component_mut<T: Persistable>(&mut self, id: EntityId) -> Option<&mut T> {
        let entity = self.find_entity_mut(id)?;
        match entity.component.as_mut() {
            Some(component) => component.downcast_mut::<T>(),
            None => None,
        }
    }

    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        match self.find_entity_mut(id) {
            Some(entity) => {
                entity.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec3) -> bool {
        match self.find_entity_mut(id) {
            Some(entity) => {
                entity.velocity = velocity;
                true
            }
            None => false,
        }
    }

    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> bool {
        match self.find_entity_mut(id) {
            Some(entity) => {
                if !entity.has_tag(tag) {
                    entity.tags.push(tag.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Marks an entity as referenced from outside, so garbage collection
    /// keeps it.
    pub fn set_rooted(&mut self, id: EntityId, rooted: bool) -> bool {
        match self.find_entity_mut(id) {
            Some(entity) => {
                entity.rooted = rooted;
                true
            }
            None => false,
        }
    }

    pub fn set_current_map(&mut self, map_name: impl Into<String>) {
        self.current_map = map_name.into();
    }

    pub fn set_game_options(&mut self, options: impl Into<String>) {
        self.game_options = options.into();
    }

    pub fn set_principal(&mut self, id: Option<EntityId>) {
        self.principal = id;
    }

    pub fn set_session_actor(&mut self, id: Option<EntityId>) {
        self.session_actor = id;
    }

    /// Map requested through `open_world` that the caller has not built yet.
    pub fn take_pending_open(&mut self) -> Option<String> {
        self.pending_open.take()
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    pub fn clear_activations(&mut self) {
        self.activations.clear();
    }

    fn level(&self, world_id: &WorldId) -> Option<&LevelState> {
        self.levels.iter().find(|level| &level.world_id == world_id)
    }

    fn level_mut(&mut self, world_id: &WorldId) -> Option<&mut LevelState> {
        self.levels
            .iter_mut()
            .find(|level| &level.world_id == world_id)
    }
}

impl HostWorld for SceneWorld {
    fn registered_worlds(&self) -> Vec<WorldId> {
        self.levels
            .iter()
            .filter(|level| level.registered)
            .map(|level| level.world_id.clone())
            .collect()
    }

    fn entities_in_world(&self, world: &WorldId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| entity.world.as_ref() == Some(world))
            .map(|entity| entity.id)
            .collect()
    }

    fn describe(&self, id: EntityId) -> Option<EntityDescriptor> {
        self.find_any(id).map(Entity::describe)
    }

    fn persistable(&self, id: EntityId) -> Option<&dyn ErasedPersistable> {
        self.find_any(id)?.component.as_deref()
    }

    fn persistable_mut(&mut self, id: EntityId) -> Option<&mut dyn ErasedPersistable> {
        let entity = self.find_any_mut(id)?;
        match entity.component.as_mut() {
            Some(component) => Some(component.as_mut()),
            None => None,
        }
    }

    fn begin_deferred_spawn(
        &mut self,
        world: &WorldId,
        declared_type: &str,
        name: &str,
        transform: Transform,
    ) -> Option<EntityId> {
        if self.level(world).is_none() {
            warn!(world = %world, declared_type, "deferred_spawn_into_unloaded_world");
            return None;
        }
        let Some(component) = self.registry.construct(declared_type) else {
            warn!(world = %world, declared_type, "deferred_spawn_unknown_type");
            return None;
        };
        let spawn = EntitySpawn {
            component: Some(component),
            ..EntitySpawn::plain(name, declared_type).at(transform)
        };
        let entity = self.build_entity(Some(world.clone()), spawn, true, true);
        let id = entity.id;
        self.pending_spawns.push(entity);
        Some(id)
    }

    fn finish_spawning(&mut self, id: EntityId, transform: Transform) -> bool {
        let Some(index) = self.pending_spawns.iter().position(|entity| entity.id == id) else {
            return false;
        };
        let mut entity = self.pending_spawns.remove(index);
        entity.transform = transform;
        entity.state = SpawnState::Live;
        self.activations.push(Activation {
            id,
            transform,
            fields: entity
                .component
                .as_deref()
                .and_then(|component| component.field_tree().ok()),
        });
        self.push_live(entity);
        true
    }

    fn teleport(&mut self, id: EntityId, transform: Transform) -> bool {
        match self.find_entity_mut(id) {
            Some(entity) => {
                entity.transform = transform;
                entity.velocity = Vec3::ZERO;
                true
            }
            None => false,
        }
    }

    fn is_world_visible(&self, world: &WorldId) -> bool {
        self.level(world).is_some_and(|level| level.visible)
    }

    fn open_world(&mut self, map_name: &str) {
        let loaded = self
            .levels
            .iter()
            .map(|level| level.world_id.clone())
            .collect::<Vec<_>>();
        for world_id in &loaded {
            self.unload_world(world_id);
        }
        self.current_map = map_name.to_string();
        self.pending_open = Some(map_name.to_string());
        info!(map = map_name, unloaded = loaded.len(), "world_transition_requested");
    }

    fn current_map_name(&self) -> String {
        self.current_map.clone()
    }

    fn game_options(&self) -> String {
        self.game_options.clone()
    }

    fn principal_transform(&self) -> Option<Transform> {
        self.principal
            .and_then(|id| self.find_entity(id))
            .map(|entity| entity.transform)
    }

    fn session_actor(&self) -> Option<EntityId> {
        self.session_actor
    }

    fn find_persistent(&self, key: &EntityKey) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| key_from_path(&[entity.container()], &entity.name).as_ref() == Some(key))
            .map(|entity| entity.id)
    }

    fn create_persistent(&mut self, declared_type: &str, name: &str) -> Option<EntityId> {
        let Some(component) = self.registry.construct(declared_type) else {
            warn!(declared_type, name, "persistent_create_unknown_type");
            return None;
        };
        let spawn = EntitySpawn {
            component: Some(component),
            ..EntitySpawn::plain(name, declared_type)
        };
        Some(self.spawn_transient(spawn))
    }

    fn collect_garbage(&mut self, held: &[EntityId]) -> usize {
        let doomed = self
            .entities
            .iter()
            .filter(|entity| entity.world.is_none() && !entity.rooted)
            .filter(|entity| !held.contains(&entity.id))
            .map(|entity| entity.id)
            .collect::<Vec<_>>();
        self.entities.retain(|entity| !doomed.contains(&entity.id));
        self.forget_handles(&doomed);
        debug!(reclaimed = doomed.len(), "garbage_collected");
        doomed.len()
    }
}
