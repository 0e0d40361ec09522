mod events;
mod manager;
mod settings;

pub use events::{EventDispatcher, ListenerId, SaveEvent};
pub use manager::{SaveManager, SessionError, SessionState, SESSION_SAVE_NAME};
pub use settings::{
    SerializerSettings, SettingsError, AUTO_LOAD_ENV_VAR, DEFAULT_MAX_SLOT_SCAN,
    DEFAULT_RECORD_TYPE, MAX_SLOTS_ENV_VAR, SAVE_PREFIX_ENV_VAR,
};
