use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::scene::{EntityId, HostWorld};

use super::codec::EntityCodec;
use super::identity::resolve;
use super::policy::tags;
use super::types::{ActorPayload, EntityKey, WorldId};

/// Outcome of reconciling a payload map against live entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_in_place: Vec<EntityKey>,
    pub spawned: Vec<EntityKey>,
    pub orphaned: Vec<EntityKey>,
    pub failed: Vec<EntityKey>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.failed.is_empty()
    }

    pub fn restored_count(&self) -> usize {
        self.restored_in_place.len() + self.spawned.len()
    }

    pub fn absorb(&mut self, other: RestoreReport) {
        self.restored_in_place.extend(other.restored_in_place);
        self.spawned.extend(other.spawned);
        self.orphaned.extend(other.orphaned);
        self.failed.extend(other.failed);
    }
}

struct Pending<'a> {
    key: &'a EntityKey,
    id: EntityId,
    payload: &'a ActorPayload,
}

/// Reconciles `actors` with the live entities of `world_id`.
///
/// Classification runs to completion first: live matches are collected and
/// missing spawned entities are constructed without activating them. Only
/// then are fields applied, constructions finished and transforms set.
pub fn restore_actors<H: HostWorld + ?Sized>(
    host: &mut H,
    codec: &EntityCodec,
    world_id: &WorldId,
    actors: &BTreeMap<EntityKey, ActorPayload>,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    let live = live_keys(host, world_id);

    let mut in_place = Vec::<Pending<'_>>::new();
    let mut deferred = Vec::<Pending<'_>>::new();
    for (key, payload) in actors {
        if key.is_none() || !payload.is_valid() {
            warn!(world = %world_id, key = %key, "restore_payload_invalid");
            report.failed.push(key.clone());
            continue;
        }
        if let Some(&id) = live.get(key) {
            in_place.push(Pending { key, id, payload });
            continue;
        }
        if !payload.was_spawned {
            warn!(world = %world_id, key = %key, "restore_orphaned_payload");
            report.orphaned.push(key.clone());
            continue;
        }
        match host.begin_deferred_spawn(
            world_id,
            &payload.entity.declared_type,
            key.local_name(),
            payload.transform,
        ) {
            Some(id) => deferred.push(Pending { key, id, payload }),
            None => {
                warn!(
                    world = %world_id,
                    key = %key,
                    declared_type = %payload.entity.declared_type,
                    "restore_spawn_rejected"
                );
                report.failed.push(key.clone());
            }
        }
    }

    for pending in in_place {
        if let Err(error) = codec.decode_into(host, Some(pending.id), &pending.payload.entity) {
            warn!(key = %pending.key, error = %error, "restore_decode_failed");
            report.failed.push(pending.key.clone());
            continue;
        }
        codec.notify_post_load(host, Some(pending.id));
        let keeps_transform = host
            .describe(pending.id)
            .is_some_and(|descriptor| descriptor.has_tag(tags::IGNORE_TRANSFORM));
        if !keeps_transform {
            host.teleport(pending.id, pending.payload.transform);
        }
        report.restored_in_place.push(pending.key.clone());
    }

    for pending in deferred {
        let decoded = codec.decode_into(host, Some(pending.id), &pending.payload.entity);
        host.finish_spawning(pending.id, pending.payload.transform);
        match decoded {
            Ok(()) => {
                codec.notify_post_load(host, Some(pending.id));
                report.spawned.push(pending.key.clone());
            }
            Err(error) => {
                warn!(key = %pending.key, error = %error, "restore_decode_failed");
                report.failed.push(pending.key.clone());
            }
        }
    }

    info!(
        world = %world_id,
        restored_in_place = report.restored_in_place.len(),
        spawned = report.spawned.len(),
        orphaned = report.orphaned.len(),
        failed = report.failed.len(),
        "world_restored"
    );
    report
}

fn live_keys<H: HostWorld + ?Sized>(host: &H, world_id: &WorldId) -> BTreeMap<EntityKey, EntityId> {
    let mut live = BTreeMap::new();
    for id in host.entities_in_world(world_id) {
        let key = resolve(host, Some(id));
        if key.is_none() {
            continue;
        }
        if let Some(previous) = live.insert(key.clone(), id) {
            warn!(key = %key, kept = ?id, dropped = ?previous, "duplicate_live_key");
        }
    }
    live
}
