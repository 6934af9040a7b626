use crate::error::StateError;
use log::{debug, info};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Create the state directory if needed
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), StateError> {
    if !dir.exists() {
        info!("Creating cache dir: {}", dir.display());
    }
    fs::create_dir_all(dir).map_err(|e| StateError::io(dir, e))
}

/// Read a state file, treating a missing file as `None`
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, StateError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateError::io(path, e)),
    }
}

/// Replace `path` with `contents` via temp file, fsync and rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StateError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StateError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StateError::io(path, e.error))?;

    // Make the rename itself durable; not every filesystem supports this
    if let Ok(handle) = fs::File::open(dir) {
        if let Err(e) = handle.sync_all() {
            debug!("Directory fsync on {} failed: {}", dir.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("second"));

        // No temporary files are left behind
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("state");
        assert!(write_atomic(&path, b"x").is_err());
    }

    #[test]
    fn test_ensure_dir_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
