use crate::error::StateError;
use crate::state::state_file::{ensure_dir, read_optional, write_atomic};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Persistent cursor and pending buffer for System Event Log tailing
///
/// The cursor file holds a single hex line: the index of the last SEL
/// record whose alerts were fully delivered. The pending buffer holds the
/// raw `sel list` output of a cycle that has not committed yet; it is empty
/// whenever no cycle is in flight.
#[derive(Debug)]
pub struct SelStateStore {
    index_path: PathBuf,
    list_path: PathBuf,
}

impl SelStateStore {
    pub const INDEX_FILE: &'static str = "last_sel_index";
    pub const LIST_FILE: &'static str = "sel_list";

    /// Open (and create if needed) the store under `dir`
    ///
    /// Any I/O failure here is fatal to the sensor: running without a
    /// reliable cursor would either lose or endlessly repeat events.
    pub fn open(dir: &Path) -> Result<Self, StateError> {
        ensure_dir(dir)?;
        info!("Using cache dir: {}", dir.display());

        let store = Self {
            index_path: dir.join(Self::INDEX_FILE),
            list_path: dir.join(Self::LIST_FILE),
        };

        let index_text = read_optional(&store.index_path)?;
        if index_text.map_or(true, |t| t.trim().is_empty()) {
            store.set_cursor(0)?;
        }
        if read_optional(&store.list_path)?.is_none() {
            write_atomic(&store.list_path, b"")?;
        }
        Ok(store)
    }

    /// Last fully processed SEL index; an empty or absent file reads as 0
    pub fn cursor(&self) -> Result<u64, StateError> {
        let text = read_optional(&self.index_path)?.unwrap_or_default();
        let line = text.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(line, 16).map_err(|e| StateError::Corrupt {
            path: self.index_path.display().to_string(),
            reason: format!("{:?} is not a hex index: {}", line, e),
        })
    }

    /// Durably record the cursor
    pub fn set_cursor(&self, index: u64) -> Result<(), StateError> {
        debug!("Writing SEL cursor {:x}", index);
        write_atomic(&self.index_path, format!("{:x}\n", index).as_bytes())
    }

    /// Raw lines of the pending buffer (blank lines dropped)
    pub fn pending(&self) -> Result<Vec<String>, StateError> {
        let text = read_optional(&self.list_path)?.unwrap_or_default();
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether a previous cycle left unprocessed data behind
    pub fn has_pending(&self) -> Result<bool, StateError> {
        Ok(!self.pending()?.is_empty())
    }

    /// Atomically replace the pending buffer with freshly fetched log content
    pub fn replace_pending(&self, content: &str) -> Result<(), StateError> {
        write_atomic(&self.list_path, content.as_bytes())
    }

    /// Empty the pending buffer once a cycle has committed
    pub fn clear_pending(&self) -> Result<(), StateError> {
        write_atomic(&self.list_path, b"")
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_initialises_cursor_to_zero() {
        let dir = TempDir::new().unwrap();
        let store = SelStateStore::open(&dir.path().join("server")).unwrap();
        assert_eq!(store.cursor().unwrap(), 0);
        assert_eq!(fs::read_to_string(store.index_path()).unwrap(), "0\n");
        assert!(!store.has_pending().unwrap());
    }

    #[test]
    fn test_empty_index_file_reads_as_zero() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SelStateStore::INDEX_FILE), "").unwrap();
        let store = SelStateStore::open(dir.path()).unwrap();
        assert_eq!(store.cursor().unwrap(), 0);
    }

    #[test]
    fn test_cursor_is_hex_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SelStateStore::open(dir.path()).unwrap();
            store.set_cursor(0x1a).unwrap();
        }
        let index_text = fs::read_to_string(dir.path().join(SelStateStore::INDEX_FILE)).unwrap();
        assert_eq!(index_text, "1a\n");

        let store = SelStateStore::open(dir.path()).unwrap();
        assert_eq!(store.cursor().unwrap(), 0x1a);
    }

    #[test]
    fn test_existing_pending_buffer_preserved_on_open() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SelStateStore::LIST_FILE),
            "3 | 04/16/2019 | 05:29:09 | Fan #0x30 | Lower Critical going low | Asserted\n",
        )
        .unwrap();
        let store = SelStateStore::open(dir.path()).unwrap();
        assert!(store.has_pending().unwrap());
        assert_eq!(store.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_and_clear_pending() {
        let dir = TempDir::new().unwrap();
        let store = SelStateStore::open(dir.path()).unwrap();
        store.replace_pending("a\n\nb\n").unwrap();
        assert_eq!(store.pending().unwrap(), vec!["a".to_string(), "b".to_string()]);
        store.clear_pending().unwrap();
        assert!(!store.has_pending().unwrap());
        assert_eq!(fs::metadata(store.list_path()).unwrap().len(), 0);
    }

    #[test]
    fn test_corrupt_cursor_reported() {
        let dir = TempDir::new().unwrap();
        let store = SelStateStore::open(dir.path()).unwrap();
        fs::write(store.index_path(), "not-hex\n").unwrap();
        assert!(matches!(store.cursor(), Err(StateError::Corrupt { .. })));
    }
}
