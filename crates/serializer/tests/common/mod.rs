#![allow(dead_code)]

use game_serializer::{
    tags, EntitySpawn, Persistable, SceneWorld, Transform, TypeRegistry, Vec3, WorldId,
};
use serde::{Deserialize, Serialize};

pub const KEEP: &str = "Keep";
pub const CELLAR: &str = "Cellar";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Chest {
    pub coins: u32,
    pub locked: bool,
    pub sparkle_timer: f32,
    pub post_loads: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChestFields {
    pub coins: u32,
    pub locked: bool,
}

impl Persistable for Chest {
    const TYPE_NAME: &'static str = "Chest";
    type Fields = ChestFields;

    fn save_fields(&self) -> Self::Fields {
        ChestFields {
            coins: self.coins,
            locked: self.locked,
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.coins = fields.coins;
        self.locked = fields.locked;
    }

    fn post_data_loaded(&mut self) {
        self.post_loads += 1;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Satchel {
    pub items: Vec<String>,
    pub post_loads: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelFields {
    pub items: Vec<String>,
}

impl Persistable for Satchel {
    const TYPE_NAME: &'static str = "Satchel";
    type Fields = SatchelFields;

    fn save_fields(&self) -> Self::Fields {
        SatchelFields {
            items: self.items.clone(),
        }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.items = fields.items;
    }

    fn post_data_loaded(&mut self) {
        self.post_loads += 1;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Renown {
    pub score: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenownFields {
    pub score: i64,
}

impl Persistable for Renown {
    const TYPE_NAME: &'static str = "Renown";
    type Fields = RenownFields;

    fn save_fields(&self) -> Self::Fields {
        RenownFields { score: self.score }
    }

    fn load_fields(&mut self, fields: Self::Fields) {
        self.score = fields.score;
    }
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Chest>()
        .register::<Satchel>()
        .register::<Renown>();
    registry
}

pub fn keep() -> WorldId {
    WorldId::new(KEEP)
}

pub fn cellar() -> WorldId {
    WorldId::new(CELLAR)
}

/// Host with the Keep world loaded and nothing in it.
pub fn empty_keep() -> SceneWorld {
    let mut scene = SceneWorld::new(registry());
    scene.load_world(keep());
    scene.set_current_map(KEEP);
    scene
}

pub fn chest(coins: u32) -> Chest {
    Chest {
        coins,
        ..Chest::default()
    }
}

pub fn saved_chest(name: &str, coins: u32) -> EntitySpawn {
    EntitySpawn::persistable(name, chest(coins)).with_tag(tags::SAVE)
}

pub fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_translation(Vec3::new(x, y, z))
}
