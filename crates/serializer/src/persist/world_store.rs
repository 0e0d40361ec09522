use tracing::{debug, warn};

use crate::scene::HostWorld;

use super::codec::EntityCodec;
use super::policy::is_included;
use super::restore::{restore_actors, RestoreReport};
use super::types::{WorldId, WorldSnapshot};

/// Builds a fresh snapshot of every eligible entity in `world_id`.
pub fn capture_world<H: HostWorld + ?Sized>(
    host: &H,
    codec: &EntityCodec,
    world_id: &WorldId,
) -> WorldSnapshot {
    let mut snapshot = WorldSnapshot::new(world_id.clone());
    snapshot.loaded = host.is_world_visible(world_id);

    for id in host.entities_in_world(world_id) {
        if !is_included(host, id) {
            continue;
        }
        match codec.encode_actor(host, id) {
            Ok(payload) => {
                snapshot.actors.insert(payload.key().clone(), payload);
            }
            Err(error) => {
                warn!(world = %world_id, entity = ?id, error = %error, "capture_encode_failed");
            }
        }
    }

    debug!(
        world = %world_id,
        actors = snapshot.actor_count(),
        loaded = snapshot.loaded,
        "world_captured"
    );
    snapshot
}

pub fn restore_world<H: HostWorld + ?Sized>(
    host: &mut H,
    codec: &EntityCodec,
    snapshot: &WorldSnapshot,
) -> RestoreReport {
    restore_actors(host, codec, &snapshot.world_id, &snapshot.actors)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::persist::policy::tags;
    use crate::persist::{EntityKey, Persistable, TypeRegistry};
    use crate::scene::{EntitySpawn, SceneWorld, Transform, Vec3};

    #[derive(Debug, Default)]
    struct Banner {
        color: String,
    }

    #[derive(Default, Serialize, Deserialize)]
    #[serde(default)]
    struct BannerFields {
        color: String,
    }

    impl Persistable for Banner {
        const TYPE_NAME: &'static str = "Banner";
        type Fields = BannerFields;

        fn save_fields(&self) -> Self::Fields {
            BannerFields {
                color: self.color.clone(),
            }
        }

        fn load_fields(&mut self, fields: Self::Fields) {
            self.color = fields.color;
        }
    }

    fn banner(color: &str) -> Banner {
        Banner {
            color: color.to_string(),
        }
    }

    fn courtyard() -> (SceneWorld, WorldId) {
        let mut registry = TypeRegistry::new();
        registry.register::<Banner>();
        let mut scene = SceneWorld::new(registry);
        let world = WorldId::new("Courtyard");
        scene.load_world(world.clone());
        (scene, world)
    }

    #[test]
    fn capture_keeps_only_eligible_entities() {
        let (mut scene, world) = courtyard();
        scene.spawn_placed(&world, EntitySpawn::persistable("Red", banner("red")).with_tag(tags::SAVE));
        scene.spawn_placed(&world, EntitySpawn::persistable("Blue", banner("blue")));

        let snapshot = capture_world(&scene, &EntityCodec::default(), &world);

        assert_eq!(snapshot.world_id, world);
        assert!(snapshot.loaded);
        assert_eq!(
            snapshot.actors.keys().cloned().collect::<Vec<_>>(),
            vec![EntityKey::new("Courtyard:Red")]
        );
    }

    #[test]
    fn hidden_world_is_captured_as_not_loaded() {
        let (mut scene, world) = courtyard();
        scene.set_world_visible(&world, false);
        let snapshot = capture_world(&scene, &EntityCodec::default(), &world);
        assert!(!snapshot.loaded);
    }

    #[test]
    fn restore_world_applies_captured_state() {
        let (mut scene, world) = courtyard();
        let origin = Transform::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let id = scene.spawn_placed(
            &world,
            EntitySpawn::persistable("Flag", banner("gold"))
                .with_tag(tags::SAVE)
                .at(origin),
        );
        let codec = EntityCodec::default();
        let snapshot = capture_world(&scene, &codec, &world);

        if let Some(flag) = scene.component_mut::<Banner>(id) {
            flag.color = "black".to_string();
        }
        scene.set_transform(id, Transform::default());

        let report = restore_world(&mut scene, &codec, &snapshot);

        assert_eq!(report.restored_in_place.len(), 1);
        assert_eq!(scene.component::<Banner>(id).map(|b| b.color.as_str()), Some("gold"));
        assert_eq!(scene.find_entity(id).map(|e| e.transform), Some(origin));
    }
}
