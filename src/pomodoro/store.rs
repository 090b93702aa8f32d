//! Persistence ports for the timer snapshot

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};

use super::snapshot::{decode_snapshot, encode_snapshot, TimerSnapshot};

/// Where the timer snapshot lives between runs
///
/// Implementations only serialize; the timer manager owns every mutation.
pub trait SnapshotStore {
    /// Read the last saved snapshot, `None` if nothing was saved
    fn load(&self) -> StoreResult<Option<TimerSnapshot>>;

    /// Replace the saved snapshot with `snapshot` as a whole
    fn save(&self, snapshot: &TimerSnapshot) -> StoreResult<()>;

    /// Forget the saved snapshot
    fn clear(&self) -> StoreResult<()>;
}

/// Backup a corrupted file by renaming it with a .backup extension
fn backup_corrupted_file(path: &Path) {
    let backup_path = path.with_extension("json.backup");
    if let Err(e) = std::fs::rename(path, &backup_path) {
        tracing::warn!(
            "Failed to backup corrupted file {} to {}: {}",
            path.display(),
            backup_path.display(),
            e
        );
    } else {
        tracing::info!("Corrupted timer state backed up to {}", backup_path.display());
    }
}

/// JSON file store, written atomically via a temp file and rename
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> StoreResult<Option<TimerSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let decoded = String::from_utf8(std::fs::read(&self.path)?)
            .map_err(StoreError::from)
            .and_then(|content| {
                if content.trim().is_empty() {
                    Ok(None)
                } else {
                    decode_snapshot(&content).map(Some).map_err(StoreError::from)
                }
            });

        if let Err(e) = &decoded {
            tracing::error!("Timer state file is corrupted: {}", e);
            backup_corrupted_file(&self.path);
        }
        decoded
    }

    fn save(&self, snapshot: &TimerSnapshot) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = encode_snapshot(snapshot)?;
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store that keeps the encoded JSON text, so loads go through
/// the same decoding as the file store
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    content: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw text, as if a previous run had written it
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
        }
    }

    /// Raw text currently held
    pub fn content(&self) -> Option<String> {
        match self.content.lock() {
            Ok(content) => content.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, value: Option<String>) {
        match self.content.lock() {
            Ok(mut content) => *content = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> StoreResult<Option<TimerSnapshot>> {
        match self.content() {
            Some(content) => Ok(Some(decode_snapshot(&content)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &TimerSnapshot) -> StoreResult<()> {
        self.replace(Some(encode_snapshot(snapshot)?));
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.replace(None);
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for &S {
    fn load(&self) -> StoreResult<Option<TimerSnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &TimerSnapshot) -> StoreResult<()> {
        (**self).save(snapshot)
    }

    fn clear(&self) -> StoreResult<()> {
        (**self).clear()
    }
}
