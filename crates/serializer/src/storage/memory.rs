use std::collections::BTreeMap;
use std::path::PathBuf;

use super::record::SlotRecord;
use super::{SlotStorage, StorageError};

/// Slot storage kept in memory, used by tests and hosts without a disk.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotStorage {
    slots: BTreeMap<String, SlotRecord>,
    read_only: bool,
    unreadable: Vec<String>,
}

impl MemorySlotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StorageError::ReadOnly`].
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Makes reads of `slot_name` fail as if the stored record were corrupt,
    /// until the slot is written again.
    pub fn mark_unreadable(&mut self, slot_name: impl Into<String>) {
        self.unreadable.push(slot_name.into());
    }

    pub fn slot_names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SlotStorage for MemorySlotStorage {
    fn write_slot(&mut self, slot_name: &str, record: &SlotRecord) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly {
                slot_name: slot_name.to_string(),
            });
        }
        self.unreadable.retain(|name| name != slot_name);
        self.slots.insert(slot_name.to_string(), record.clone());
        Ok(())
    }

    fn read_slot(&self, slot_name: &str) -> Result<Option<SlotRecord>, StorageError> {
        if self.unreadable.iter().any(|name| name == slot_name) {
            return Err(StorageError::InvalidFormat {
                path: PathBuf::from(slot_name),
                message: "record marked unreadable".to_string(),
            });
        }
        Ok(self.slots.get(slot_name).cloned())
    }

    fn delete_slot(&mut self, slot_name: &str) -> Result<bool, StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly {
                slot_name: slot_name.to_string(),
            });
        }
        Ok(self.slots.remove(slot_name).is_some())
    }
}
