use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scene::Transform;

/// Stable identifier derived from an entity's structural path, in the form
/// `container(.container)*:local_name`. The empty key means "no entity".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub const NAME_SEPARATOR: char = ':';
    pub const CONTAINER_SEPARATOR: char = '.';

    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn local_name(&self) -> &str {
        match self.0.rsplit_once(Self::NAME_SEPARATOR) {
            Some((_, name)) => name,
            None => &self.0,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(String);

impl WorldId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub declared_type: String,
    pub entity_key: EntityKey,
    #[serde(default)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorPayload {
    #[serde(flatten)]
    pub entity: EntityPayload,
    pub transform: Transform,
    pub was_spawned: bool,
    #[serde(default)]
    pub attachment_point: Option<String>,
}

impl ActorPayload {
    /// Placeholder carried when there was nothing to encode.
    pub fn null() -> Self {
        Self {
            entity: EntityPayload::default(),
            transform: Transform::default(),
            was_spawned: false,
            attachment_point: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.entity.declared_type.is_empty()
    }

    pub fn key(&self) -> &EntityKey {
        &self.entity.entity_key
    }
}

impl Default for ActorPayload {
    fn default() -> Self {
        Self::null()
    }
}

/// Captured state of one loadable world. Replaced wholesale on every
/// capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub world_id: WorldId,
    pub loaded: bool,
    pub actors: BTreeMap<EntityKey, ActorPayload>,
}

impl WorldSnapshot {
    pub fn new(world_id: WorldId) -> Self {
        Self {
            world_id,
            loaded: false,
            actors: BTreeMap::new(),
        }
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub worlds: BTreeMap<WorldId, WorldSnapshot>,
    pub persistent: BTreeMap<EntityKey, EntityPayload>,
    #[serde(default)]
    pub session_actor: ActorPayload,
}

impl GameStateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty() && self.persistent.is_empty() && !self.session_actor.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Vec3;

    #[test]
    fn local_name_is_text_after_last_separator() {
        let key = EntityKey::new("Overworld.Keep:Chest_2");
        assert_eq!(key.local_name(), "Chest_2");
        assert_eq!(EntityKey::new("Loose").local_name(), "Loose");
        assert!(EntityKey::none().is_none());
    }

    #[test]
    fn null_actor_payload_is_not_valid() {
        assert!(!ActorPayload::null().is_valid());
        assert!(!ActorPayload::default().is_valid());
    }

    #[test]
    fn game_state_json_uses_keys_as_object_fields() {
        let mut state = GameStateSnapshot::default();
        let key = EntityKey::new("Overworld:Door");
        let mut world = WorldSnapshot::new(WorldId::new("Overworld"));
        world.actors.insert(
            key.clone(),
            ActorPayload {
                entity: EntityPayload {
                    declared_type: "Door".to_string(),
                    entity_key: key.clone(),
                    data: b"{}".to_vec(),
                },
                transform: Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)),
                was_spawned: false,
                attachment_point: None,
            },
        );
        state.worlds.insert(WorldId::new("Overworld"), world);

        let json = serde_json::to_value(&state).expect("encode state");
        assert!(json["worlds"]["Overworld"]["actors"]["Overworld:Door"].is_object());
        assert_eq!(
            json["worlds"]["Overworld"]["actors"]["Overworld:Door"]["declared_type"],
            "Door"
        );

        let decoded: GameStateSnapshot = serde_json::from_value(json).expect("decode state");
        assert_eq!(decoded, state);
    }
}
