use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod persist;
pub mod scene;
pub mod session;
pub mod storage;

pub use persist::{
    capture_world, exclusion_reason, is_included, resolve, restore_actors, restore_world, tags,
    ActorPayload, CodecError, EntityCodec, EntityKey, EntityPayload, ErasedPersistable,
    ExclusionReason, GameStateSnapshot, JsonPropertyCodec, Persistable, PersistentPool,
    PropertyCodec, RestoreReport, TypeRegistry, WorldId, WorldSnapshot,
};
pub use scene::{
    EntityDescriptor, EntityId, EntityRole, EntitySpawn, HostWorld, SceneWorld, SpawnState,
    Transform, Vec3,
};
pub use session::{
    ListenerId, SaveEvent, SaveManager, SerializerSettings, SessionError, SessionState,
    SettingsError,
};
pub use storage::{FileSlotStorage, MemorySlotStorage, SlotRecord, SlotStorage, StorageError};

pub const SAVE_DIR_ENV_VAR: &str = "GAME_SERIALIZER_SAVE_DIR";

#[derive(Debug, Error)]
pub enum SaveDirError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory slot files are written to: `GAME_SERIALIZER_SAVE_DIR` when
/// set, otherwise `saves/` next to the executable. Created if missing.
pub fn resolve_save_dir() -> Result<PathBuf, SaveDirError> {
    let dir = match env::var(SAVE_DIR_ENV_VAR) {
        Ok(value) => PathBuf::from(value),
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(SaveDirError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| SaveDirError::ExeHasNoParent(exe.clone()))?;
            exe_dir.join("saves")
        }
        Err(source) => {
            return Err(SaveDirError::EnvVar {
                var: SAVE_DIR_ENV_VAR,
                source,
            })
        }
    };

    fs::create_dir_all(&dir).map_err(|source| SaveDirError::CreateSaveDir {
        path: dir.clone(),
        source,
    })?;
    Ok(normalize_path(&dir))
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn normalize_keeps_missing_paths_unchanged() {
        let temp = TempDir::new().expect("temp");
        let missing = temp.path().join("not_created_yet");
        assert_eq!(normalize_path(&missing), missing);
    }
}
