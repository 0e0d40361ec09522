use std::fmt;

use tracing::error;

use crate::scene::{EntityId, HostWorld};

use super::identity::resolve;
use super::property::{CodecError, JsonPropertyCodec, PropertyCodec};
use super::types::{ActorPayload, EntityPayload};

/// Converts live entities to payloads and back through a [`PropertyCodec`].
pub struct EntityCodec {
    fields: Box<dyn PropertyCodec>,
}

impl fmt::Debug for EntityCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCodec")
            .field("fields", &self.fields.name())
            .finish()
    }
}

impl Default for EntityCodec {
    fn default() -> Self {
        Self::new(JsonPropertyCodec)
    }
}

impl EntityCodec {
    pub fn new(fields: impl PropertyCodec + 'static) -> Self {
        Self {
            fields: Box::new(fields),
        }
    }

    pub fn field_codec_name(&self) -> &'static str {
        self.fields.name()
    }

    pub fn encode_object<H: HostWorld + ?Sized>(
        &self,
        host: &H,
        id: EntityId,
    ) -> Result<EntityPayload, CodecError> {
        if host.describe(id).is_none() {
            return Err(CodecError::MissingEntity { id: Some(id) });
        }
        let entity_key = resolve(host, Some(id));
        if entity_key.is_none() {
            return Err(CodecError::UnresolvedIdentity { id });
        }
        let Some(persistable) = host.persistable(id) else {
            return Err(CodecError::NotPersistable { key: entity_key });
        };
        let data = self.fields.encode(&persistable.field_tree()?)?;
        Ok(EntityPayload {
            declared_type: persistable.type_name().to_string(),
            entity_key,
            data,
        })
    }

    pub fn encode_actor<H: HostWorld + ?Sized>(
        &self,
        host: &H,
        id: EntityId,
    ) -> Result<ActorPayload, CodecError> {
        let entity = self.encode_object(host, id)?;
        let descriptor = host
            .describe(id)
            .ok_or(CodecError::MissingEntity { id: Some(id) })?;
        Ok(ActorPayload {
            entity,
            transform: descriptor.transform.unwrap_or_default(),
            was_spawned: descriptor.was_spawned,
            attachment_point: descriptor.attachment_point,
        })
    }

    /// Applies the payload's field bytes to a live entity. An empty payload
    /// leaves the entity as it is.
    pub fn decode_into<H: HostWorld + ?Sized>(
        &self,
        host: &mut H,
        id: Option<EntityId>,
        payload: &EntityPayload,
    ) -> Result<(), CodecError> {
        let Some(entity) = id.filter(|entity| host.describe(*entity).is_some()) else {
            error!(entity = ?id, key = %payload.entity_key, "decode_missing_entity");
            return Err(CodecError::MissingEntity { id });
        };
        let Some(persistable) = host.persistable_mut(entity) else {
            return Err(CodecError::NotPersistable {
                key: payload.entity_key.clone(),
            });
        };
        if persistable.type_name() != payload.declared_type {
            return Err(CodecError::TypeMismatch {
                key: payload.entity_key.clone(),
                declared: payload.declared_type.clone(),
                actual: persistable.type_name(),
            });
        }
        if payload.data.is_empty() {
            return Ok(());
        }
        let tree = self.fields.decode(&payload.data)?;
        persistable.apply_field_tree(tree)
    }

    /// Runs the post-load hook. Returns false when there was nothing to
    /// notify.
    pub fn notify_post_load<H: HostWorld + ?Sized>(
        &self,
        host: &mut H,
        id: Option<EntityId>,
    ) -> bool {
        let Some(entity) = id else {
            return false;
        };
        match host.persistable_mut(entity) {
            Some(persistable) => {
                persistable.post_data_loaded();
                true
            }
            None => false,
        }
    }

    /// Decode followed by the post-load hook, for entities without a
    /// transform.
    pub fn load_object<H: HostWorld + ?Sized>(
        &self,
        host: &mut H,
        id: Option<EntityId>,
        payload: &EntityPayload,
    ) -> Result<(), CodecError> {
        self.decode_into(host, id, payload)?;
        self.notify_post_load(host, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::persist::policy::tags;
    use crate::persist::{EntityKey, Persistable, TypeRegistry, WorldId};
    use crate::scene::{EntitySpawn, SceneWorld, Transform, Vec3};

    #[derive(Debug, Default)]
    struct Anvil {
        hits: u32,
        heat: f32,
        loads: u32,
    }

    #[derive(Default, Serialize, Deserialize)]
    #[serde(default)]
    struct AnvilFields {
        hits: u32,
    }

    impl Persistable for Anvil {
        const TYPE_NAME: &'static str = "Anvil";
        type Fields = AnvilFields;

        fn save_fields(&self) -> Self::Fields {
            AnvilFields { hits: self.hits }
        }

        fn load_fields(&mut self, fields: Self::Fields) {
            self.hits = fields.hits;
        }

        fn post_data_loaded(&mut self) {
            self.loads += 1;
        }
    }

    fn forge() -> (SceneWorld, WorldId) {
        let mut registry = TypeRegistry::new();
        registry.register::<Anvil>();
        let mut scene = SceneWorld::new(registry);
        let world = WorldId::new("Forge");
        scene.load_world(world.clone());
        (scene, world)
    }

    #[test]
    fn encode_actor_carries_key_type_and_placement() {
        let (mut scene, world) = forge();
        let placed = Transform::from_translation(Vec3::new(2.0, 0.0, -1.0));
        let id = scene.spawn_placed(
            &world,
            EntitySpawn::persistable(
                "Anvil",
                Anvil {
                    hits: 12,
                    ..Anvil::default()
                },
            )
            .with_tag(tags::SAVE)
            .at(placed)
            .attached_to("Bench"),
        );
        let codec = EntityCodec::default();

        let payload = codec.encode_actor(&scene, id).expect("encode");
        assert_eq!(payload.entity.declared_type, "Anvil");
        assert_eq!(payload.key().as_str(), "Forge:Anvil");
        assert_eq!(payload.transform, placed);
        assert!(!payload.was_spawned);
        assert_eq!(payload.attachment_point.as_deref(), Some("Bench"));
    }

    #[test]
    fn round_trip_restores_saved_fields_only() {
        let (mut scene, world) = forge();
        let source = scene.spawn_placed(
            &world,
            EntitySpawn::persistable(
                "Anvil",
                Anvil {
                    hits: 7,
                    heat: 900.0,
                    loads: 0,
                },
            ),
        );
        let twin = scene.spawn_placed(&world, EntitySpawn::persistable("Twin", Anvil::default()));
        let codec = EntityCodec::default();

        let payload = codec.encode_object(&scene, source).expect("encode");
        codec
            .load_object(&mut scene, Some(twin), &payload)
            .expect("load");

        let restored = scene.component::<Anvil>(twin).expect("twin");
        assert_eq!(restored.hits, 7);
        assert_eq!(restored.heat, 0.0);
        assert_eq!(restored.loads, 1);
    }

    #[test]
    fn decode_into_missing_entity_reports_and_changes_nothing() {
        let (mut scene, _) = forge();
        let codec = EntityCodec::default();
        let payload = EntityPayload {
            declared_type: "Anvil".to_string(),
            entity_key: EntityKey::new("Forge:Ghost"),
            data: b"{\"hits\":3}".to_vec(),
        };

        let error = codec
            .decode_into(&mut scene, None, &payload)
            .expect_err("null handle");
        assert!(matches!(error, CodecError::MissingEntity { id: None }));
        assert!(!codec.notify_post_load(&mut scene, None));
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn decode_rejects_payload_of_another_type() {
        let (mut scene, world) = forge();
        let id = scene.spawn_placed(&world, EntitySpawn::persistable("Anvil", Anvil::default()));
        let codec = EntityCodec::default();
        let payload = EntityPayload {
            declared_type: "Bellows".to_string(),
            entity_key: EntityKey::new("Forge:Anvil"),
            data: b"{}".to_vec(),
        };

        let error = codec
            .decode_into(&mut scene, Some(id), &payload)
            .expect_err("type mismatch");
        assert!(matches!(error, CodecError::TypeMismatch { actual: "Anvil", .. }));
    }

    #[test]
    fn encode_of_plain_entity_is_not_persistable() {
        let (mut scene, world) = forge();
        let id = scene.spawn_placed(&world, EntitySpawn::plain("Wall", "Wall"));
        let codec = EntityCodec::default();
        assert!(matches!(
            codec.encode_object(&scene, id),
            Err(CodecError::NotPersistable { .. })
        ));
    }
}
