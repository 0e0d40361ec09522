use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod atomic_io;
mod memory;
mod record;
mod slot_file;

pub use memory::MemorySlotStorage;
pub use record::{SlotRecord, SAVED_TIME_FORMAT};
pub use slot_file::{FileSlotStorage, SLOT_FILE_EXTENSION, SLOT_FORMAT_VERSION};

/// Named slot persistence. Writes replace the whole record.
pub trait SlotStorage {
    fn write_slot(&mut self, slot_name: &str, record: &SlotRecord) -> Result<(), StorageError>;
    /// `Ok(None)` when no record exists under `slot_name`.
    fn read_slot(&self, slot_name: &str) -> Result<Option<SlotRecord>, StorageError>;
    /// Returns whether a record was removed.
    fn delete_slot(&mut self, slot_name: &str) -> Result<bool, StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read/write slot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("slot file at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error("failed to encode slot {slot_name}: {source}")]
    Encode {
        slot_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse slot record at {path} ({field}): {message}")]
    Decode {
        path: PathBuf,
        field: String,
        message: String,
    },
    #[error("invalid slot name {slot_name:?}")]
    InvalidSlotName { slot_name: String },
    #[error("slot storage is read-only; refusing to write {slot_name}")]
    ReadOnly { slot_name: String },
}
