use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::scene::{EntityId, HostWorld};

use super::codec::EntityCodec;
use super::identity::resolve;
use super::property::CodecError;
use super::restore::RestoreReport;
use super::types::{EntityKey, EntityPayload};

/// Long-lived entities that survive world transitions. Holding a handle
/// here keeps the host from reclaiming the entity.
#[derive(Debug, Default, Clone)]
pub struct PersistentPool {
    /// Each handle with the key its payload is stored under.
    held: Vec<(EntityId, EntityKey)>,
}

impl PersistentPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> Vec<EntityId> {
        self.held.iter().map(|(id, _)| *id).collect()
    }

    pub fn held_keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.held.iter().map(|(_, key)| key)
    }

    pub fn key_of(&self, id: EntityId) -> Option<&EntityKey> {
        self.held
            .iter()
            .find(|(held, _)| *held == id)
            .map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.held.iter().any(|(held, _)| *held == id)
    }

    fn hold(&mut self, id: EntityId, key: EntityKey) {
        match self.held.iter_mut().find(|(held, _)| *held == id) {
            Some(entry) => entry.1 = key,
            None => self.held.push((id, key)),
        }
    }

    /// Stops holding `id` and returns the key it was cached under. The key
    /// survives the entity being despawned first.
    pub fn release(&mut self, id: EntityId) -> Option<EntityKey> {
        let index = self.held.iter().position(|(held, _)| *held == id)?;
        Some(self.held.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn capture<H: HostWorld + ?Sized>(
        &self,
        host: &H,
        codec: &EntityCodec,
    ) -> BTreeMap<EntityKey, EntityPayload> {
        let mut captured = BTreeMap::new();
        for (id, _) in &self.held {
            let id = *id;
            match codec.encode_object(host, id) {
                Ok(payload) => {
                    captured.insert(payload.entity_key.clone(), payload);
                }
                Err(error) => {
                    warn!(entity = ?id, error = %error, "persistent_capture_failed");
                }
            }
        }
        captured
    }

    /// Holds `id` and returns its current payload. Nothing is held when
    /// the entity cannot be encoded.
    pub fn cache<H: HostWorld + ?Sized>(
        &mut self,
        host: &H,
        codec: &EntityCodec,
        id: EntityId,
    ) -> Result<(EntityKey, EntityPayload), CodecError> {
        let payload = codec.encode_object(host, id).map_err(|error| {
            warn!(entity = ?id, error = %error, "persistent_cache_failed");
            error
        })?;
        self.hold(id, payload.entity_key.clone());
        Ok((payload.entity_key.clone(), payload))
    }

    /// Rebuilds the pool from `entries`: every previously held entity is let
    /// go and reclaimed, then each entry is found or created by key and
    /// loaded.
    pub fn restore<H: HostWorld + ?Sized>(
        &mut self,
        host: &mut H,
        codec: &EntityCodec,
        entries: &BTreeMap<EntityKey, EntityPayload>,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        self.held.clear();
        let reclaimed = host.collect_garbage(&[]);
        debug!(reclaimed, "persistent_pool_purged");

        let mut resolved = Vec::<(&EntityKey, EntityId, bool, &EntityPayload)>::new();
        for (key, payload) in entries {
            if key.is_none() {
                continue;
            }
            if let Some(id) = host.find_persistent(key) {
                resolved.push((key, id, false, payload));
            } else if let Some(id) = host.create_persistent(&payload.declared_type, key.local_name()) {
                resolved.push((key, id, true, payload));
            } else {
                warn!(key = %key, declared_type = %payload.declared_type, "persistent_create_failed");
                report.failed.push(key.clone());
                continue;
            }
        }
        for (key, id, created, _) in &resolved {
            // A created object may land under a different container than
            // the one it was saved from.
            let live = if *created {
                resolve(host, Some(*id))
            } else {
                EntityKey::none()
            };
            let held_key = if live.is_none() { (*key).clone() } else { live };
            self.hold(*id, held_key);
        }

        for (key, id, created, payload) in resolved {
            match codec.load_object(host, Some(id), payload) {
                Ok(()) if created => report.spawned.push(key.clone()),
                Ok(()) => report.restored_in_place.push(key.clone()),
                Err(error) => {
                    warn!(key = %key, error = %error, "persistent_load_failed");
                    report.failed.push(key.clone());
                }
            }
        }

        info!(
            held = self.held.len(),
            created = report.spawned.len(),
            found = report.restored_in_place.len(),
            failed = report.failed.len(),
            "persistent_pool_restored"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::persist::{Persistable, TypeRegistry, WorldId};
    use crate::scene::{EntitySpawn, SceneWorld};

    #[derive(Debug, Default)]
    struct Ledger {
        gold: u32,
        loads: u32,
    }

    #[derive(Default, Serialize, Deserialize)]
    #[serde(default)]
    struct LedgerFields {
        gold: u32,
    }

    impl Persistable for Ledger {
        const TYPE_NAME: &'static str = "Ledger";
        type Fields = LedgerFields;

        fn save_fields(&self) -> Self::Fields {
            LedgerFields { gold: self.gold }
        }

        fn load_fields(&mut self, fields: Self::Fields) {
            self.gold = fields.gold;
        }

        fn post_data_loaded(&mut self) {
            self.loads += 1;
        }
    }

    fn scene() -> SceneWorld {
        let mut registry = TypeRegistry::new();
        registry.register::<Ledger>();
        SceneWorld::new(registry)
    }

    #[test]
    fn cache_holds_each_handle_once() {
        let mut scene = scene();
        let id = scene.spawn_transient(EntitySpawn::persistable("Ledger", Ledger::default()));
        let mut pool = PersistentPool::new();
        let codec = EntityCodec::default();

        let (key, _) = pool.cache(&scene, &codec, id).expect("cache");
        pool.cache(&scene, &codec, id).expect("cache again");

        assert_eq!(key.as_str(), "Transient:Ledger");
        assert_eq!(pool.held(), vec![id]);
        assert_eq!(pool.release(id), Some(key));
        assert_eq!(pool.release(id), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn restore_purges_and_recreates_from_payloads() {
        let mut scene = scene();
        let codec = EntityCodec::default();
        let original = scene.spawn_transient(EntitySpawn::persistable(
            "Ledger",
            Ledger { gold: 250, loads: 0 },
        ));
        let mut pool = PersistentPool::new();
        pool.cache(&scene, &codec, original).expect("cache");
        let captured = pool.capture(&scene, &codec);

        let report = pool.restore(&mut scene, &codec, &captured);

        assert!(scene.find_entity(original).is_none());
        assert_eq!(report.spawned, vec![EntityKey::new("Transient:Ledger")]);
        let rebuilt = pool.held()[0];
        let ledger = scene.component::<Ledger>(rebuilt).expect("ledger");
        assert_eq!((ledger.gold, ledger.loads), (250, 1));
        assert_eq!(scene.describe(rebuilt).and_then(|d| d.transform), None);
    }

    #[test]
    fn rooted_persistent_objects_are_found_in_place() {
        let mut scene = scene();
        let codec = EntityCodec::default();
        let id = scene.spawn_transient(EntitySpawn::persistable("Ledger", Ledger { gold: 3, loads: 0 }));
        scene.set_rooted(id, true);
        let mut pool = PersistentPool::new();
        pool.cache(&scene, &codec, id).expect("cache");
        let captured = pool.capture(&scene, &codec);
        if let Some(ledger) = scene.component_mut::<Ledger>(id) {
            ledger.gold = 0;
        }

        let report = pool.restore(&mut scene, &codec, &captured);

        assert_eq!(report.restored_in_place, vec![EntityKey::new("Transient:Ledger")]);
        assert_eq!(pool.held(), vec![id]);
        assert_eq!(scene.component::<Ledger>(id).map(|l| l.gold), Some(3));
    }

    #[test]
    fn world_owned_entity_is_found_again_by_its_key() {
        let mut scene = scene();
        let vault = WorldId::new("Vault");
        scene.load_world(vault.clone());
        let codec = EntityCodec::default();
        let id = scene.spawn_runtime(&vault, EntitySpawn::persistable("Ledger", Ledger { gold: 8, loads: 0 }));
        let mut pool = PersistentPool::new();
        pool.cache(&scene, &codec, id).expect("cache");
        let captured = pool.capture(&scene, &codec);

        let report = pool.restore(&mut scene, &codec, &captured);

        assert_eq!(report.restored_in_place, vec![EntityKey::new("Vault:Ledger")]);
        assert!(report.spawned.is_empty());
        assert_eq!(pool.held(), vec![id]);
        assert_eq!(pool.key_of(id), Some(&EntityKey::new("Vault:Ledger")));
        assert_eq!(scene.entity_count(), 1);
    }

    #[test]
    fn release_returns_the_cached_key_after_despawn() {
        let mut scene = scene();
        let codec = EntityCodec::default();
        let id = scene.spawn_transient(EntitySpawn::persistable("Ledger", Ledger::default()));
        let mut pool = PersistentPool::new();
        pool.cache(&scene, &codec, id).expect("cache");
        scene.despawn(id);

        assert_eq!(pool.release(id), Some(EntityKey::new("Transient:Ledger")));
        assert!(pool.is_empty());
    }

    #[test]
    fn unknown_types_are_skipped() {
        let mut scene = scene();
        let codec = EntityCodec::default();
        let key = EntityKey::new("Transient:Relic");
        let entries = BTreeMap::from([(
            key.clone(),
            EntityPayload {
                declared_type: "Relic".to_string(),
                entity_key: key.clone(),
                data: Vec::new(),
            },
        )]);
        let mut pool = PersistentPool::new();

        let report = pool.restore(&mut scene, &codec, &entries);

        assert_eq!(report.failed, vec![key]);
        assert!(pool.is_empty());
    }
}
