use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes through a sibling temp file so a crash never leaves a torn slot.
pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("slot");
    let tmp_name = format!("{file_name}.partial");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("save_0.sav");

        write_bytes_atomic(&path, b"first").expect("first write");
        write_bytes_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read(&path).expect("read"), b"second");
        assert!(!temp_path_for(&path).exists());
    }
}
