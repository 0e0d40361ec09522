use game_serializer::{
    tags, EntityId, EntityRole, EntitySpawn, Persistable, SceneWorld, Transform, TypeRegistry,
    Vec3, WorldId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) const OVERWORLD: &str = "Overworld";
pub(crate) const DUNGEON: &str = "Dungeon";

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Chest {
    pub(crate) gold: u32,
    pub(crate) opened: bool,
    /// Runtime-only; rebuilt after every load.
    pub(crate) glint_seconds: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ChestFields {
    gold: u32,
    opened: bool,
}

impl Persistable for Chest {
    const TYPE_NAME: &'static str = "Chest";
    type Fields = ChestFields;

    fn save_fields(&self) -> Self::Fields {
        ChestFields {
            gold: self.gold,
            opened: self.opened,
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.gold = fields.gold;
        self.opened = fields.opened;
    }

    fn post_data_loaded(&mut self) {
        self.glint_seconds = if self.opened { 0.0 } else { 1.5 };
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Door {
    pub(crate) open: bool,
    pub(crate) locked: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct DoorFields {
    open: bool,
    locked: bool,
}

impl Persistable for Door {
    const TYPE_NAME: &'static str = "Door";
    type Fields = DoorFields;

    fn save_fields(&self) -> Self::Fields {
        DoorFields {
            open: self.open,
            locked: self.locked,
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.open = fields.open;
        self.locked = fields.locked;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Inventory {
    pub(crate) items: Vec<String>,
    pub(crate) gold: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct InventoryFields {
    items: Vec<String>,
    gold: u32,
}

impl Persistable for Inventory {
    const TYPE_NAME: &'static str = "Inventory";
    type Fields = InventoryFields;

    fn save_fields(&self) -> Self::Fields {
        InventoryFields {
            items: self.items.clone(),
            gold: self.gold,
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.items = fields.items;
        self.gold = fields.gold;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PlayerStats {
    pub(crate) level: u32,
    pub(crate) experience: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PlayerStatsFields {
    level: u32,
    experience: u64,
}

impl Persistable for PlayerStats {
    const TYPE_NAME: &'static str = "PlayerStats";
    type Fields = PlayerStatsFields;

    fn save_fields(&self) -> Self::Fields {
        PlayerStatsFields {
            level: self.level,
            experience: self.experience,
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.level = fields.level;
        self.experience = fields.experience;
    }
}

pub(crate) fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Chest>()
        .register::<Door>()
        .register::<Inventory>()
        .register::<PlayerStats>();
    registry
}

pub(crate) fn overworld() -> WorldId {
    WorldId::new(OVERWORLD)
}

pub(crate) fn dungeon() -> WorldId {
    WorldId::new(DUNGEON)
}

fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_translation(Vec3::new(x, y, z))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OverworldHandles {
    pub(crate) chest: EntityId,
    pub(crate) gate: EntityId,
    pub(crate) player: EntityId,
}

/// Spawns the placed content of the Overworld: a chest, the dungeon gate,
/// static scenery and the player pawn.
pub(crate) fn build_overworld(scene: &mut SceneWorld) -> OverworldHandles {
    let world = overworld();
    scene.load_world(world.clone());
    scene.set_current_map(OVERWORLD);

    let chest = scene.spawn_placed(
        &world,
        EntitySpawn::persistable(
            "Chest",
            Chest {
                gold: 25,
                ..Chest::default()
            },
        )
        .with_tag(tags::SAVE)
        .at(at(4.0, 0.0, 2.0)),
    );
    let gate = scene.spawn_placed(
        &world,
        EntitySpawn::persistable(
            "DungeonGate",
            Door {
                open: false,
                locked: true,
            },
        )
        .with_tag(tags::SAVE)
        .with_tag(tags::IGNORE_TRANSFORM)
        .at(at(12.0, 0.0, 0.0)),
    );
    scene.spawn_placed(
        &world,
        EntitySpawn::plain("Boulder", "Scenery")
            .with_static_root()
            .at(at(-3.0, 0.0, 6.0)),
    );
    let player = scene.spawn_placed(
        &world,
        EntitySpawn::plain("Player", "Pawn")
            .with_role(EntityRole::Pawn)
            .at(at(0.0, 0.0, 0.0)),
    );
    scene.set_principal(Some(player));

    debug!(world = %world, entities = scene.entity_count_in(&world), "overworld_built");
    OverworldHandles {
        chest,
        gate,
        player,
    }
}

pub(crate) fn build_dungeon(scene: &mut SceneWorld) -> EntityId {
    let world = dungeon();
    scene.load_world(world.clone());
    scene.set_current_map(DUNGEON);

    let chest = scene.spawn_placed(
        &world,
        EntitySpawn::persistable(
            "BossChest",
            Chest {
                gold: 500,
                ..Chest::default()
            },
        )
        .with_tag(tags::SAVE)
        .at(at(0.0, -4.0, 20.0)),
    );
    debug!(world = %world, entities = scene.entity_count_in(&world), "dungeon_built");
    chest
}

/// Player stats live outside any world as the session actor.
pub(crate) fn spawn_player_stats(scene: &mut SceneWorld) -> EntityId {
    let stats = scene.spawn_transient(
        EntitySpawn::persistable(
            "PlayerStats",
            PlayerStats {
                level: 1,
                experience: 0,
            },
        )
        .with_role(EntityRole::PlayerState),
    );
    scene.set_rooted(stats, true);
    scene.set_session_actor(Some(stats));
    stats
}

pub(crate) fn spawn_inventory(scene: &mut SceneWorld) -> EntityId {
    scene.spawn_transient(EntitySpawn::persistable(
        "Inventory",
        Inventory {
            items: vec!["torch".to_string()],
            gold: 0,
        },
    ))
}

pub(crate) fn spawn_loot(scene: &mut SceneWorld, gold: u32, position: Vec3) -> EntityId {
    scene.spawn_runtime(
        &overworld(),
        EntitySpawn::persistable(
            "Loot",
            Chest {
                gold,
                ..Chest::default()
            },
        )
        .with_tag(tags::SAVE)
        .at(Transform::from_translation(position)),
    )
}
