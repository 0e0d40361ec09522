use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::atomic_io::write_bytes_atomic;
use super::record::SlotRecord;
use super::{SlotStorage, StorageError};

const MAGIC: &[u8; 4] = b"GSAV";
pub const SLOT_FORMAT_VERSION: u16 = 1;
pub const SLOT_FILE_EXTENSION: &str = "sav";

/// One file per slot under a root directory.
///
/// Layout: magic, `u16` format version, record type string, `u32` payload
/// length, SHA-256 of the payload, JSON payload. Integers are little endian
/// and strings carry a `u16` length prefix.
#[derive(Debug, Clone)]
pub struct FileSlotStorage {
    root: PathBuf,
}

impl FileSlotStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, slot_name: &str) -> Result<PathBuf, StorageError> {
        let valid = !slot_name.is_empty()
            && slot_name != "."
            && slot_name != ".."
            && !slot_name.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::InvalidSlotName {
                slot_name: slot_name.to_string(),
            });
        }
        Ok(self
            .root
            .join(format!("{slot_name}.{SLOT_FILE_EXTENSION}")))
    }
}

impl SlotStorage for FileSlotStorage {
    fn write_slot(&mut self, slot_name: &str, record: &SlotRecord) -> Result<(), StorageError> {
        let path = self.path_for(slot_name)?;
        let payload = serde_json::to_vec(record).map_err(|source| StorageError::Encode {
            slot_name: slot_name.to_string(),
            source,
        })?;
        let bytes = encode_container(&record.record_type, &payload, &path)?;
        write_bytes_atomic(&path, &bytes).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        info!(slot = slot_name, path = %path.display(), bytes = bytes.len(), "slot_written");
        Ok(())
    }

    fn read_slot(&self, slot_name: &str) -> Result<Option<SlotRecord>, StorageError> {
        let path = self.path_for(slot_name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        let (record_type, payload) = decode_container(&bytes, &path)?;
        let record = parse_record(payload, &path)?;
        if record.record_type != record_type {
            return Err(invalid_format(&path, "record type does not match header"));
        }
        debug!(slot = slot_name, path = %path.display(), "slot_read");
        Ok(Some(record))
    }

    fn delete_slot(&mut self, slot_name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(slot_name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(slot = slot_name, path = %path.display(), "slot_deleted");
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

fn encode_container(record_type: &str, payload: &[u8], path: &Path) -> Result<Vec<u8>, StorageError> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| invalid_format(path, "payload too large for u32 length"))?;
    let mut bytes = Vec::<u8>::with_capacity(payload.len() + 64);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SLOT_FORMAT_VERSION.to_le_bytes());
    write_string(&mut bytes, record_type, path)?;
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(&sha256_bytes(payload));
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn decode_container<'a>(bytes: &'a [u8], path: &Path) -> Result<(String, &'a [u8]), StorageError> {
    let mut cursor = 0usize;

    let magic = read_exact(bytes, &mut cursor, 4, path)?;
    if magic != MAGIC {
        return Err(invalid_format(path, "invalid magic"));
    }
    let version = read_u16(bytes, &mut cursor, path)?;
    if version != SLOT_FORMAT_VERSION {
        return Err(StorageError::InvalidFormat {
            path: path.to_path_buf(),
            message: format!("unsupported format version {version}, expected {SLOT_FORMAT_VERSION}"),
        });
    }
    let record_type = read_string(bytes, &mut cursor, path)?;
    let payload_len = read_u32(bytes, &mut cursor, path)? as usize;
    let expected_hash = read_exact(bytes, &mut cursor, 32, path)?;
    let payload = read_exact(bytes, &mut cursor, payload_len, path)?;
    if cursor != bytes.len() {
        return Err(invalid_format(path, "unexpected trailing bytes"));
    }
    if expected_hash != sha256_bytes(payload) {
        return Err(invalid_format(path, "payload hash mismatch"));
    }
    Ok((record_type, payload))
}

fn parse_record(payload: &[u8], path: &Path) -> Result<SlotRecord, StorageError> {
    let mut deserializer = serde_json::Deserializer::from_slice(payload);
    serde_path_to_error::deserialize::<_, SlotRecord>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        StorageError::Decode {
            path: path.to_path_buf(),
            field,
            message: error.into_inner().to_string(),
        }
    })
}

fn write_string(target: &mut Vec<u8>, value: &str, path: &Path) -> Result<(), StorageError> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| invalid_format(path, "string too long for u16 length"))?;
    target.extend_from_slice(&len.to_le_bytes());
    target.extend_from_slice(bytes);
    Ok(())
}

fn read_string(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<String, StorageError> {
    let len = read_u16(bytes, cursor, path)? as usize;
    let raw = read_exact(bytes, cursor, len, path)?;
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| invalid_format(path, "invalid UTF-8 string in header"))
}

fn read_u16(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u16, StorageError> {
    Ok(u16::from_le_bytes(
        read_exact(bytes, cursor, 2, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u16 encoding"))?,
    ))
}

fn read_u32(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u32, StorageError> {
    Ok(u32::from_le_bytes(
        read_exact(bytes, cursor, 4, path)?
            .try_into()
            .map_err(|_| invalid_format(path, "invalid u32 encoding"))?,
    ))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], StorageError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn invalid_format(path: &Path, message: &str) -> StorageError {
    StorageError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::scene::{Transform, Vec3};

    fn sample_record() -> SlotRecord {
        let mut record = SlotRecord::new("SavedGameState");
        record.saved_map = "Overworld".to_string();
        record.principal_transform = Transform::from_translation(Vec3::new(1.0, 0.0, 2.0));
        record.use_principal_transform = true;
        record
    }

    #[test]
    fn written_slot_reads_back() {
        let temp = TempDir::new().expect("temp");
        let mut storage = FileSlotStorage::new(temp.path());
        let record = sample_record();

        storage.write_slot("save_0", &record).expect("write");
        let loaded = storage.read_slot("save_0").expect("read").expect("present");

        assert_eq!(loaded, record);
        assert!(temp.path().join("save_0.sav").is_file());
    }

    #[test]
    fn missing_slot_reads_as_none_and_deletes_as_false() {
        let temp = TempDir::new().expect("temp");
        let mut storage = FileSlotStorage::new(temp.path());
        assert!(storage.read_slot("save_4").expect("read").is_none());
        assert!(!storage.delete_slot("save_4").expect("delete"));
    }

    #[test]
    fn tampered_payload_fails_hash_check() {
        let temp = TempDir::new().expect("temp");
        let mut storage = FileSlotStorage::new(temp.path());
        storage.write_slot("save_0", &sample_record()).expect("write");
        let path = storage.path_for("save_0").expect("path");
        let mut bytes = fs::read(&path).expect("read raw");
        let last = bytes.len() - 2;
        bytes[last] ^= 0x20;
        fs::write(&path, bytes).expect("rewrite");

        match storage.read_slot("save_0") {
            Err(StorageError::InvalidFormat { message, .. }) => {
                assert_eq!(message, "payload hash mismatch")
            }
            other => panic!("expected hash failure, got {other:?}"),
        }
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let storage = FileSlotStorage::new(temp.path());
        fs::write(temp.path().join("save_0.sav"), b"NOPE\x01\x00").expect("write junk");
        assert!(matches!(
            storage.read_slot("save_0"),
            Err(StorageError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn slot_names_cannot_escape_the_root() {
        let temp = TempDir::new().expect("temp");
        let storage = FileSlotStorage::new(temp.path());
        assert!(matches!(
            storage.path_for("../save_0"),
            Err(StorageError::InvalidSlotName { .. })
        ));
        assert!(storage.path_for("").is_err());
    }
}
