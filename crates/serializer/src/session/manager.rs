use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::persist::{
    capture_world, restore_world, CodecError, EntityCodec, EntityKey, GameStateSnapshot,
    PersistentPool, RestoreReport, WorldId, WorldSnapshot,
};
use crate::scene::{EntityId, HostWorld};
use crate::storage::{SlotRecord, SlotStorage, StorageError};

use super::events::{EventDispatcher, ListenerId, SaveEvent};
use super::settings::SerializerSettings;

/// Name of the in-memory checkpoint record.
pub const SESSION_SAVE_NAME: &str = "SessionSave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("save manager is not initialized")]
    NotInitialized,
    #[error("slot storage failed for {slot_name}: {source}")]
    Storage {
        slot_name: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no session save exists")]
    MissingSessionSave,
}

/// Owns the aggregate game state and maps it onto numbered slots.
#[derive(Debug)]
pub struct SaveManager<S: SlotStorage> {
    settings: SerializerSettings,
    storage: S,
    codec: EntityCodec,
    prefix: String,
    state: SessionState,
    current_slot: u32,
    is_loading: bool,
    awaiting_worlds: bool,
    saved_games: BTreeMap<u32, SlotRecord>,
    current: GameStateSnapshot,
    session_save: Option<SlotRecord>,
    pool: PersistentPool,
    events: EventDispatcher,
}

impl<S: SlotStorage> SaveManager<S> {
    pub fn new(settings: SerializerSettings, storage: S) -> Self {
        Self {
            prefix: settings.save_prefix.clone(),
            settings,
            storage,
            codec: EntityCodec::default(),
            state: SessionState::Uninitialized,
            current_slot: 0,
            is_loading: false,
            awaiting_worlds: false,
            saved_games: BTreeMap::new(),
            current: GameStateSnapshot::default(),
            session_save: None,
            pool: PersistentPool::new(),
            events: EventDispatcher::default(),
        }
    }

    pub fn with_codec(mut self, codec: EntityCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &SerializerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn current_slot(&self) -> u32 {
        self.current_slot
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn game_state(&self) -> &GameStateSnapshot {
        &self.current
    }

    pub fn pool(&self) -> &PersistentPool {
        &self.pool
    }

    pub fn session_save(&self) -> Option<&SlotRecord> {
        self.session_save.as_ref()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SaveEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn initialize<H: HostWorld + ?Sized>(&mut self, host: &mut H) -> Result<(), SessionError> {
        if self.state == SessionState::Active {
            debug!("save_manager_already_initialized");
            return Ok(());
        }
        self.state = SessionState::Active;
        info!(
            auto_load = self.settings.auto_load_on_begin,
            prefix = %self.prefix,
            "save_manager_initialized"
        );

        if self.settings.auto_load_on_begin {
            if self.load_from_slot(host, 0, false)?.is_none() {
                info!(slot_name = %self.indexed_save_name(0), "auto_load_slot_missing");
                self.create_session_save();
            }
        } else {
            self.create_session_save();
        }
        Ok(())
    }

    pub fn deinitialize(&mut self) {
        self.state = SessionState::Uninitialized;
        self.events.clear();
        self.pool.clear();
        self.is_loading = false;
        self.awaiting_worlds = false;
        info!("save_manager_deinitialized");
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Uninitialized => Err(SessionError::NotInitialized),
        }
    }

    pub fn indexed_save_name(&self, slot: u32) -> String {
        format!("{}save_{slot}", self.prefix)
    }

    pub fn assign_save_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
        self.saved_games.clear();
        info!(prefix = %self.prefix, "save_prefix_assigned");
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reads slots from 0 upward and stops at the first one that is missing
    /// or unreadable.
    pub fn get_slots(&mut self) -> Vec<SlotRecord> {
        self.saved_games.clear();
        for slot in 0..=self.settings.max_slot_scan {
            let slot_name = self.indexed_save_name(slot);
            match self.storage.read_slot(&slot_name) {
                Ok(Some(record)) => {
                    self.saved_games.insert(slot, record);
                }
                Ok(None) => {
                    debug!(slot_name = %slot_name, "slot_scan_stopped_at_missing");
                    break;
                }
                Err(error) => {
                    warn!(slot_name = %slot_name, error = %error, "slot_scan_stopped_at_unreadable");
                    break;
                }
            }
        }
        self.saved_games.values().cloned().collect()
    }

    /// Record of the current slot, if one has been read, written or created.
    pub fn current_save(&self) -> Option<&SlotRecord> {
        self.saved_games.get(&self.current_slot)
    }

    /// Record for `slot`, read from storage or created fresh when missing.
    /// A fresh record is only cached, not written.
    pub fn save_at_slot(&mut self, slot: u32) -> Result<&SlotRecord, SessionError> {
        let record = match self.saved_games.remove(&slot) {
            Some(record) => record,
            None => match self.read_record(slot)? {
                Some(record) => record,
                None => {
                    warn!(slot, "slot_record_created");
                    SlotRecord::new(self.settings.record_type.clone())
                }
            },
        };
        Ok(self.saved_games.entry(slot).or_insert(record))
    }

    pub fn world_state(&self, world_id: &WorldId) -> Option<&WorldSnapshot> {
        self.current.worlds.get(world_id)
    }

    pub fn cache_world_state(&mut self, world_id: WorldId, snapshot: WorldSnapshot) {
        self.current.worlds.insert(world_id, snapshot);
    }

    pub fn start_new_game(&mut self, slot: Option<u32>) -> Result<u32, SessionError> {
        self.ensure_active()?;
        let slot = match slot {
            Some(slot) => slot,
            None => self.get_slots().len() as u32,
        };
        self.current_slot = slot;
        self.current = GameStateSnapshot::default();
        self.pool.clear();

        let mut record = SlotRecord::new(self.settings.record_type.clone());
        record.stamp(Utc::now());
        self.write_record(slot, &record)?;
        self.saved_games.insert(slot, record.clone());

        info!(slot, slot_name = %self.indexed_save_name(slot), "new_game_started");
        self.events.emit(&SaveEvent::NewGame { slot, record });
        Ok(slot)
    }

    pub fn save_to_slot<H: HostWorld + ?Sized>(
        &mut self,
        host: &H,
        slot: u32,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.current_slot = slot;
        let mut record = self.record_to_overwrite(slot);
        self.save_session_to_record(host, &mut record);
        self.write_record(slot, &record)?;
        self.saved_games.insert(slot, record.clone());

        info!(
            slot,
            worlds = record.state.worlds.len(),
            persistent = record.state.persistent.len(),
            map = %record.saved_map,
            "game_saved"
        );
        self.events.emit(&SaveEvent::Saved {
            slot: Some(slot),
            record,
        });
        Ok(())
    }

    fn save_session_to_record<H: HostWorld + ?Sized>(&mut self, host: &H, record: &mut SlotRecord) {
        for world_id in host.registered_worlds() {
            let snapshot = capture_world(host, &self.codec, &world_id);
            self.current.worlds.insert(world_id, snapshot);
        }
        let persistent = self.pool.capture(host, &self.codec);
        let held = self.pool.held_keys().cloned().collect::<BTreeSet<_>>();
        self.current.persistent.retain(|key, _| held.contains(key));
        self.current.persistent.extend(persistent);
        self.current.session_actor = match host.session_actor() {
            Some(id) => self.codec.encode_actor(host, id).unwrap_or_else(|error| {
                warn!(entity = ?id, error = %error, "session_actor_capture_failed");
                Default::default()
            }),
            None => Default::default(),
        };

        if record.record_type.is_empty() {
            record.record_type = self.settings.record_type.clone();
        }
        record.state = self.current.clone();
        record.stamp(Utc::now());
        record.saved_map = host.current_map_name();
        record.game_options = host.game_options();
        match host.principal_transform() {
            Some(transform) => {
                record.principal_transform = transform;
                record.use_principal_transform = true;
            }
            None => {
                record.principal_transform = Default::default();
                record.use_principal_transform = false;
            }
        }
    }

    /// Reads `slot` and makes it the current game state. With
    /// `switch_world` the host is asked to open the saved map and worlds
    /// restore as they report ready; otherwise every registered world is
    /// restored now.
    pub fn load_from_slot<H: HostWorld + ?Sized>(
        &mut self,
        host: &mut H,
        slot: u32,
        switch_world: bool,
    ) -> Result<Option<SlotRecord>, SessionError> {
        self.ensure_active()?;
        let Some(record) = self.read_record(slot)? else {
            info!(slot, slot_name = %self.indexed_save_name(slot), "load_slot_missing");
            return Ok(None);
        };
        self.current_slot = slot;
        self.is_loading = true;
        self.saved_games.insert(slot, record.clone());

        if switch_world {
            self.awaiting_worlds = true;
            host.open_world(&record.saved_map);
        }
        let mut report = self.load_game_state(host, &record.state);
        if !switch_world {
            report.absorb(self.restore_live_worlds(host));
            self.is_loading = false;
        }

        info!(
            slot,
            map = %record.saved_map,
            switch_world,
            restored = report.restored_count(),
            orphaned = report.orphaned.len(),
            failed = report.failed.len(),
            "game_loaded"
        );
        self.events.emit(&SaveEvent::Loaded {
            slot,
            record: record.clone(),
        });
        Ok(Some(record))
    }

    fn load_game_state<H: HostWorld + ?Sized>(
        &mut self,
        host: &mut H,
        state: &GameStateSnapshot,
    ) -> RestoreReport {
        self.current = state.clone();
        let report = self.pool.restore(host, &self.codec, &self.current.persistent);

        let session_payload = &self.current.session_actor;
        if session_payload.is_valid() {
            match host.session_actor() {
                Some(id) => {
                    match self.codec.decode_into(host, Some(id), &session_payload.entity) {
                        Ok(()) => {
                            self.codec.notify_post_load(host, Some(id));
                        }
                        Err(error) => {
                            warn!(error = %error, "session_actor_restore_failed");
                        }
                    }
                }
                None => debug!("session_actor_absent_on_load"),
            }
        }
        report
    }

    fn restore_live_worlds<H: HostWorld + ?Sized>(&self, host: &mut H) -> RestoreReport {
        let mut report = RestoreReport::default();
        for world_id in host.registered_worlds() {
            if let Some(snapshot) = self.current.worlds.get(&world_id) {
                report.absorb(restore_world(host, &self.codec, snapshot));
            }
        }
        report
    }

    /// Host callback for a world that has finished loading. Restores it from
    /// the current game state, or starts an empty snapshot for a world seen
    /// for the first time.
    pub fn world_ready<H: HostWorld + ?Sized>(
        &mut self,
        host: &mut H,
        world_id: &WorldId,
    ) -> Result<RestoreReport, SessionError> {
        self.ensure_active()?;
        let report = match self.current.worlds.get(world_id) {
            Some(snapshot) => restore_world(host, &self.codec, snapshot),
            None => {
                self.current
                    .worlds
                    .insert(world_id.clone(), WorldSnapshot::new(world_id.clone()));
                debug!(world = %world_id, "world_snapshot_created");
                RestoreReport::default()
            }
        };
        if self.awaiting_worlds {
            self.awaiting_worlds = false;
            self.is_loading = false;
        }
        Ok(report)
    }

    /// Host callback for a world about to stream out. Its entities are
    /// captured into the current game state unless a load is replacing it.
    pub fn world_unloading<H: HostWorld + ?Sized>(
        &mut self,
        host: &H,
        world_id: &WorldId,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;
        if self.is_loading {
            debug!(world = %world_id, "world_unload_capture_skipped");
            return Ok(());
        }
        let snapshot = capture_world(host, &self.codec, world_id);
        self.cache_world_state(world_id.clone(), snapshot);
        Ok(())
    }

    pub fn create_session_save(&mut self) {
        self.session_save = Some(SlotRecord::new(self.settings.record_type.clone()));
        debug!(record = SESSION_SAVE_NAME, "session_save_created");
    }

    /// Checkpoints the live session into the in-memory session save.
    pub fn save_session_state<H: HostWorld + ?Sized>(&mut self, host: &H) -> Result<(), SessionError> {
        self.ensure_active()?;
        let mut record = self
            .session_save
            .take()
            .ok_or(SessionError::MissingSessionSave)?;
        self.save_session_to_record(host, &mut record);
        self.session_save = Some(record.clone());
        debug!(record = SESSION_SAVE_NAME, "session_state_saved");
        self.events.emit(&SaveEvent::Saved { slot: None, record });
        Ok(())
    }

    /// Restores the last session checkpoint into the live worlds.
    pub fn resume_session_state<H: HostWorld + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<RestoreReport, SessionError> {
        self.ensure_active()?;
        let state = self
            .session_save
            .as_ref()
            .map(|record| record.state.clone())
            .ok_or(SessionError::MissingSessionSave)?;
        let mut report = self.load_game_state(host, &state);
        report.absorb(self.restore_live_worlds(host));
        info!(restored = report.restored_count(), "session_state_resumed");
        Ok(report)
    }

    pub fn cache_persistent_entity<H: HostWorld + ?Sized>(
        &mut self,
        host: &H,
        id: EntityId,
    ) -> Result<EntityKey, SessionError> {
        self.ensure_active()?;
        let (key, payload) = self.pool.cache(host, &self.codec, id)?;
        self.current.persistent.insert(key.clone(), payload);
        info!(key = %key, "persistent_entity_cached");
        Ok(key)
    }

    pub fn release_persistent_entity<H: HostWorld + ?Sized>(
        &mut self,
        host: &H,
        id: EntityId,
    ) -> Result<bool, SessionError> {
        self.ensure_active()?;
        let Some(key) = self.pool.release(id) else {
            return Ok(false);
        };
        self.current.persistent.remove(&key);
        info!(
            key = %key,
            alive = host.describe(id).is_some(),
            "persistent_entity_released"
        );
        Ok(true)
    }

    pub fn delete_slot(&mut self, slot: u32) -> Result<bool, SessionError> {
        let slot_name = self.indexed_save_name(slot);
        self.saved_games.remove(&slot);
        self.storage
            .delete_slot(&slot_name)
            .map_err(|source| SessionError::Storage { slot_name, source })
    }

    /// Record a save to `slot` starts from. An unreadable slot is replaced
    /// by a fresh record rather than blocking the write.
    fn record_to_overwrite(&mut self, slot: u32) -> SlotRecord {
        if let Some(record) = self.saved_games.get(&slot) {
            return record.clone();
        }
        match self.read_record(slot) {
            Ok(Some(record)) => record,
            Ok(None) => SlotRecord::new(self.settings.record_type.clone()),
            Err(error) => {
                warn!(slot, error = %error, "unreadable_slot_overwritten");
                SlotRecord::new(self.settings.record_type.clone())
            }
        }
    }

    fn read_record(&self, slot: u32) -> Result<Option<SlotRecord>, SessionError> {
        let slot_name = self.indexed_save_name(slot);
        self.storage.read_slot(&slot_name).map_err(|source| {
            error!(slot_name = %slot_name, error = %source, "slot_read_failed");
            SessionError::Storage { slot_name, source }
        })
    }

    fn write_record(&mut self, slot: u32, record: &SlotRecord) -> Result<(), SessionError> {
        let slot_name = self.indexed_save_name(slot);
        self.storage.write_slot(&slot_name, record).map_err(|source| {
            error!(slot_name = %slot_name, error = %source, "slot_write_failed");
            SessionError::Storage { slot_name, source }
        })
    }
}
