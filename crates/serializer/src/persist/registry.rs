use std::collections::HashMap;

use tracing::debug;

use super::property::{ErasedPersistable, Persistable};

type Constructor = fn() -> Box<dyn ErasedPersistable>;

fn construct_default<T: Persistable + Default>() -> Box<dyn ErasedPersistable> {
    Box::new(T::default())
}

/// Constructor table for persistable types, keyed by `Persistable::TYPE_NAME`.
/// Restore can only create entities whose declared type is registered here.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Persistable + Default>(&mut self) -> &mut Self {
        let replaced = self
            .constructors
            .insert(T::TYPE_NAME, construct_default::<T> as Constructor)
            .is_some();
        debug!(type_name = T::TYPE_NAME, replaced, "persistable_type_registered");
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn construct(&self, type_name: &str) -> Option<Box<dyn ErasedPersistable>> {
        self.constructors.get(type_name).map(|construct| construct())
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names = self.constructors.keys().copied().collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default)]
    struct Barrel {
        contents: u8,
    }

    #[derive(Serialize, Deserialize)]
    struct BarrelFields {
        contents: u8,
    }

    impl Persistable for Barrel {
        const TYPE_NAME: &'static str = "Barrel";
        type Fields = BarrelFields;

        fn save_fields(&self) -> Self::Fields {
            BarrelFields {
                contents: self.contents,
            }
        }

        fn load_fields(&mut self, fields: Self::Fields) {
            self.contents = fields.contents;
        }
    }

    #[test]
    fn registered_types_construct_default_instances() {
        let mut registry = TypeRegistry::new();
        registry.register::<Barrel>();

        assert!(registry.contains("Barrel"));
        let built = registry.construct("Barrel").expect("barrel");
        assert_eq!(built.type_name(), "Barrel");
        assert_eq!(built.downcast_ref::<Barrel>().map(|b| b.contents), Some(0));
    }

    #[test]
    fn unknown_types_are_not_constructed() {
        let registry = TypeRegistry::new();
        assert!(registry.construct("Barrel").is_none());
        assert!(registry.type_names().is_empty());
    }
}
