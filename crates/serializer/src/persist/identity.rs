use tracing::warn;

use crate::scene::{EntityId, HostWorld};

use super::types::EntityKey;

/// Stable key for a live entity, computed from its container chain and
/// local name. Returns the empty key when there is no entity or its path
/// cannot be expressed as a key.
pub fn resolve<H: HostWorld + ?Sized>(host: &H, id: Option<EntityId>) -> EntityKey {
    let Some(id) = id else {
        return EntityKey::none();
    };
    let Some(descriptor) = host.describe(id) else {
        return EntityKey::none();
    };
    match build_key(&descriptor.containers, &descriptor.name) {
        Ok(key) => key,
        Err(reason) => {
            warn!(
                entity = ?id,
                path = %descriptor.display_path(),
                reason,
                "entity_key_unresolved"
            );
            EntityKey::none()
        }
    }
}

/// Key for an explicit container chain and name, or `None` when a segment
/// is empty or contains the name separator.
pub fn key_from_path(containers: &[impl AsRef<str>], name: &str) -> Option<EntityKey> {
    build_key(containers, name).ok()
}

fn build_key(containers: &[impl AsRef<str>], name: &str) -> Result<EntityKey, &'static str> {
    if containers.is_empty() {
        return Err("no container chain");
    }
    check_segment(name)?;
    let mut raw = String::new();
    for (index, container) in containers.iter().enumerate() {
        let container = container.as_ref();
        check_segment(container)?;
        if index > 0 {
            raw.push(EntityKey::CONTAINER_SEPARATOR);
        }
        raw.push_str(container);
    }
    raw.push(EntityKey::NAME_SEPARATOR);
    raw.push_str(name);
    Ok(EntityKey::new(raw))
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment.contains(EntityKey::NAME_SEPARATOR) {
        return Err("path segment contains name separator");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{TypeRegistry, WorldId};
    use crate::scene::{EntitySpawn, SceneWorld};

    #[test]
    fn nested_containers_join_with_dots() {
        let key = key_from_path(&["Overworld", "Keep"], "Chest").expect("key");
        assert_eq!(key.as_str(), "Overworld.Keep:Chest");
        assert_eq!(key.local_name(), "Chest");
    }

    #[test]
    fn invalid_segments_produce_no_key() {
        assert!(key_from_path(&["Overworld"], "").is_none());
        assert!(key_from_path(&["", "Keep"], "Chest").is_none());
        assert!(key_from_path(&["Over:world"], "Chest").is_none());
        let no_containers: [&str; 0] = [];
        assert!(key_from_path(&no_containers, "Chest").is_none());
    }

    #[test]
    fn resolve_is_stable_and_handles_missing_entities() {
        let mut scene = SceneWorld::new(TypeRegistry::new());
        let world = WorldId::new("Overworld");
        scene.load_world(world.clone());
        let id = scene.spawn_placed(&world, EntitySpawn::plain("Signpost", "Signpost"));

        let first = resolve(&scene, Some(id));
        assert_eq!(first.as_str(), "Overworld:Signpost");
        assert_eq!(resolve(&scene, Some(id)), first);
        assert!(resolve(&scene, None).is_none());
        assert!(resolve(&scene, Some(EntityId(999))).is_none());
    }
}
