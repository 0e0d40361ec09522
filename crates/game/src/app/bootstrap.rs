use std::env;
use std::path::PathBuf;

use game_serializer::{
    resolve_save_dir, FileSlotStorage, SaveDirError, SaveManager, SerializerSettings,
    SettingsError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SETTINGS_PATH_ENV_VAR: &str = "GAME_SERIALIZER_SETTINGS";

pub(crate) struct AppWiring {
    pub(crate) manager: SaveManager<FileSlotStorage>,
    pub(crate) save_dir: PathBuf,
}

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    SaveDir(#[from] SaveDirError),
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    init_tracing();
    info!("=== Save Serializer Demo Startup ===");

    let settings = load_settings()?;
    let save_dir = resolve_save_dir()?;
    info!(
        save_dir = %save_dir.display(),
        record_type = %settings.record_type,
        max_slot_scan = settings.max_slot_scan,
        "startup_settings"
    );

    let manager = SaveManager::new(settings, FileSlotStorage::new(save_dir.clone()));
    Ok(AppWiring { manager, save_dir })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Settings file named by `GAME_SERIALIZER_SETTINGS` if set, then any
/// `GAME_SERIALIZER_*` overrides on top.
fn load_settings() -> Result<SerializerSettings, StartupError> {
    let mut settings = match settings_path_from_env()? {
        Some(path) => SerializerSettings::load(&path)?,
        None => SerializerSettings::default(),
    };
    settings.apply_env()?;
    Ok(settings)
}

fn settings_path_from_env() -> Result<Option<PathBuf>, StartupError> {
    match env::var(SETTINGS_PATH_ENV_VAR) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(PathBuf::from(raw.trim()))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar {
            var: SETTINGS_PATH_ENV_VAR,
            source,
        }),
    }
}
