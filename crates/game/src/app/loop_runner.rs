use std::process::ExitCode;

use game_serializer::{
    HostWorld, SaveManager, SceneWorld, SessionError, SlotRecord, SlotStorage, Transform, Vec3,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::gameplay::{self, Chest, Inventory, PlayerStats};

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no world transition is pending")]
    NoPendingWorld,
    #[error("no level is built for map {map}")]
    UnknownMap { map: String },
    #[error("entity {name} is missing after restore")]
    MissingEntity { name: &'static str },
}

#[derive(Debug, Serialize)]
struct SlotSummary<'a> {
    slot: usize,
    saved_time: &'a str,
    saved_map: &'a str,
    worlds: usize,
    persistent: usize,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        mut manager,
        save_dir,
    } = app;
    info!(save_dir = %save_dir.display(), "session_script_started");

    let outcome = run_session(&mut manager);
    manager.deinitialize();
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "session_script_failed");
            ExitCode::FAILURE
        }
    }
}

/// Plays one scripted session against the slot directory: new game, save,
/// rollback, a world transition and a load that switches world back.
pub(crate) fn run_session<S: SlotStorage>(manager: &mut SaveManager<S>) -> Result<(), RunError> {
    let mut scene = SceneWorld::new(gameplay::registry());
    let overworld = gameplay::build_overworld(&mut scene);
    let stats = gameplay::spawn_player_stats(&mut scene);
    let inventory = gameplay::spawn_inventory(&mut scene);

    manager.subscribe(|event| {
        info!(
            event = event.kind(),
            map = %event.record().saved_map,
            saved_time = %event.record().saved_time,
            "save_event"
        );
    });
    manager.initialize(&mut scene)?;
    let slot = manager.start_new_game(None)?;
    manager.world_ready(&mut scene, &gameplay::overworld())?;

    gameplay::spawn_loot(&mut scene, 40, Vec3::new(6.0, 0.0, 3.0));
    manager.cache_persistent_entity(&scene, inventory)?;
    if let Some(chest) = scene.component_mut::<Chest>(overworld.chest) {
        chest.opened = true;
        chest.gold = 0;
    }
    if let Some(bag) = scene.component_mut::<Inventory>(inventory) {
        bag.gold += 25;
    }
    manager.save_to_slot(&scene, slot)?;

    // Everything below the save is rolled back by the in-place load.
    if let Some(bag) = scene.component_mut::<Inventory>(inventory) {
        bag.items.push("cursed idol".to_string());
    }
    scene.set_transform(
        overworld.player,
        Transform::from_translation(Vec3::new(30.0, 0.0, -2.0)),
    );
    manager.load_from_slot(&mut scene, slot, false)?;
    log_inventory(manager, &scene);

    manager.world_unloading(&scene, &gameplay::overworld())?;
    scene.open_world(gameplay::DUNGEON);
    enter_pending_world(manager, &mut scene)?;

    if let Some(player) = scene.component_mut::<PlayerStats>(stats) {
        player.experience += 200;
        player.level = 2;
    }
    manager.save_session_state(&scene)?;

    manager.load_from_slot(&mut scene, slot, true)?;
    enter_pending_world(manager, &mut scene)?;

    let loot = scene
        .find_by_name(Some(&gameplay::overworld()), "Loot")
        .ok_or(RunError::MissingEntity { name: "Loot" })?;
    info!(
        loot_gold = scene.component::<Chest>(loot).map(|c| c.gold),
        level = scene.component::<PlayerStats>(stats).map(|p| p.level),
        "overworld_restored"
    );
    log_inventory(manager, &scene);
    log_slots(manager);
    Ok(())
}

/// Builds whichever map the scene was asked to open and hands it to the
/// manager.
fn enter_pending_world<S: SlotStorage>(
    manager: &mut SaveManager<S>,
    scene: &mut SceneWorld,
) -> Result<(), RunError> {
    let map = scene.take_pending_open().ok_or(RunError::NoPendingWorld)?;
    let world_id = match map.as_str() {
        gameplay::OVERWORLD => {
            gameplay::build_overworld(scene);
            gameplay::overworld()
        }
        gameplay::DUNGEON => {
            gameplay::build_dungeon(scene);
            gameplay::dungeon()
        }
        _ => return Err(RunError::UnknownMap { map }),
    };

    let report = manager.world_ready(scene, &world_id)?;
    info!(
        world = %world_id,
        in_place = report.restored_in_place.len(),
        spawned = report.spawned.len(),
        orphaned = report.orphaned.len(),
        "world_entered"
    );
    Ok(())
}

fn log_inventory<S: SlotStorage>(manager: &SaveManager<S>, scene: &SceneWorld) {
    let Some(held) = manager.pool().held().first().copied() else {
        warn!("inventory_not_held");
        return;
    };
    match scene.component::<Inventory>(held) {
        Some(bag) => info!(items = ?bag.items, gold = bag.gold, "inventory"),
        None => warn!(entity = ?held, "inventory_missing"),
    }
}

fn log_slots<S: SlotStorage>(manager: &mut SaveManager<S>) {
    let slots = manager.get_slots();
    for (slot, record) in slots.iter().enumerate() {
        let summary = summarize(slot, record);
        match serde_json::to_string(&summary) {
            Ok(json) => info!(summary = %json, "slot_summary"),
            Err(err) => warn!(slot, error = %err, "slot_summary_failed"),
        }
    }
}

fn summarize(slot: usize, record: &SlotRecord) -> SlotSummary<'_> {
    SlotSummary {
        slot,
        saved_time: &record.saved_time,
        saved_map: &record.saved_map,
        worlds: record.state.worlds.len(),
        persistent: record.state.persistent.len(),
    }
}

#[cfg(test)]
mod tests {
    use game_serializer::{FileSlotStorage, MemorySlotStorage, SerializerSettings};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn scripted_session_completes_in_memory() {
        let mut manager = SaveManager::new(SerializerSettings::default(), MemorySlotStorage::new());
        run_session(&mut manager).expect("session");

        let record = manager.current_save().expect("current save");
        assert_eq!(record.saved_map, gameplay::OVERWORLD);
        assert_eq!(record.state.persistent.len(), 1);
        assert!(!manager.is_loading());
        assert!(manager.session_save().is_some());
    }

    #[test]
    fn scripted_session_writes_slot_zero_to_disk() {
        let temp = TempDir::new().expect("temp");
        let mut manager = SaveManager::new(
            SerializerSettings::default(),
            FileSlotStorage::new(temp.path()),
        );
        run_session(&mut manager).expect("session");

        assert!(temp.path().join("save_0.sav").is_file());
        assert_eq!(manager.get_slots().len(), 1);
    }
}
