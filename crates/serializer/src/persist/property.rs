use std::any::Any;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::persist::types::EntityKey;
use crate::scene::EntityId;

/// Opt-in marker for entity types that take part in persistence.
///
/// Only the data in `Fields` is saved; anything else on the entity is
/// runtime-only. Mark `Fields` with `#[serde(default)]` so saves written
/// before a field was added still load.
pub trait Persistable: 'static {
    const TYPE_NAME: &'static str;
    type Fields: Serialize + DeserializeOwned;

    fn save_fields(&self) -> Self::Fields;
    fn load_fields(&mut self, fields: Self::Fields);

    /// Runs once after a restore has applied this entity's fields.
    fn post_data_loaded(&mut self) {}
}

/// Object-safe view of a [`Persistable`] used by hosts and the restore path.
pub trait ErasedPersistable: Any {
    fn type_name(&self) -> &'static str;
    fn field_tree(&self) -> Result<Value, CodecError>;
    fn apply_field_tree(&mut self, tree: Value) -> Result<(), CodecError>;
    fn post_data_loaded(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Persistable> ErasedPersistable for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn field_tree(&self) -> Result<Value, CodecError> {
        serde_json::to_value(self.save_fields()).map_err(|source| CodecError::Encode {
            type_name: T::TYPE_NAME,
            source,
        })
    }

    fn apply_field_tree(&mut self, tree: Value) -> Result<(), CodecError> {
        let fields = serde_path_to_error::deserialize::<_, T::Fields>(tree).map_err(|error| {
            let path = error.path().to_string();
            CodecError::Decode {
                type_name: T::TYPE_NAME,
                path,
                message: error.into_inner().to_string(),
            }
        })?;
        self.load_fields(fields);
        Ok(())
    }

    fn post_data_loaded(&mut self) {
        Persistable::post_data_loaded(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn ErasedPersistable {
    pub fn downcast_ref<T: Persistable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Persistable>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Turns a field tree into bytes and back. The tree itself is produced by
/// serde from `Persistable::Fields`.
pub trait PropertyCodec {
    fn name(&self) -> &'static str;
    fn encode(&self, tree: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPropertyCodec;

impl PropertyCodec for JsonPropertyCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, tree: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(tree).map_err(|source| CodecError::Malformed { source })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|source| CodecError::Malformed { source })
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("entity {id:?} does not exist")]
    MissingEntity { id: Option<EntityId> },
    #[error("entity {key} has no persistable data")]
    NotPersistable { key: EntityKey },
    #[error("payload for {key} declares type {declared}, live entity is {actual}")]
    TypeMismatch {
        key: EntityKey,
        declared: String,
        actual: &'static str,
    },
    #[error("entity path could not be resolved for {id:?}")]
    UnresolvedIdentity { id: EntityId },
    #[error("failed to encode fields of {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode fields of {type_name} at {path}: {message}")]
    Decode {
        type_name: &'static str,
        path: String,
        message: String,
    },
    #[error("malformed field payload: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}
