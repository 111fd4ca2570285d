//! Generic key/value settings stores.
//!
//! The registry treats the store as an opaque string dictionary with
//! explicit save. Two implementations ship here: an in-memory store and a
//! flat TOML file.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::features::{ParseTriStateError, TriState};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A string-keyed settings store holding primitive values.
pub trait SettingsStore: Send + Sync {
    /// All keys currently present.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Raw value for a key, `None` when absent.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a raw value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Make pending changes durable.
    fn save(&self) -> StoreResult<()>;
}

/// Read a key as a tri-state, falling back to `default` when absent.
pub fn get_tri_state(
    store: &dyn SettingsStore,
    key: &str,
    default: TriState,
) -> StoreResult<std::result::Result<TriState, ParseTriStateError>> {
    Ok(match store.get(key)? {
        Some(raw) => raw.parse(),
        None => Ok(default),
    })
}

/// In-memory store. `save` is a no-op.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with values.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Copy of the current contents.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.read().keys().cloned().collect())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Settings kept in a flat TOML table on disk.
///
/// The file is read once on open; `save` rewrites it atomically.
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
    /// The file existed but could not be read or parsed.
    unreadable: AtomicBool,
}

impl TomlSettingsStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. So does an unreadable or
    /// corrupt one, after a warning; the first `save` moves it aside to
    /// `<path>.corrupt` instead of overwriting it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut unreadable = false;
        let values = if path.exists() {
            match read_table(&path) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable settings file: {}", e);
                    unreadable = true;
                    BTreeMap::new()
                }
            }
        } else {
            debug!("Settings file {} does not exist yet", path.display());
            BTreeMap::new()
        };

        Self {
            path,
            values: RwLock::new(values),
            unreadable: AtomicBool::new(unreadable),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file on disk was unreadable when opened and has not been
    /// replaced yet.
    pub fn is_unreadable(&self) -> bool {
        self.unreadable.load(Ordering::Acquire)
    }

    /// Path the unreadable file is moved to before the first save.
    pub fn corrupt_path(&self) -> PathBuf {
        let mut path = self.path.as_os_str().to_owned();
        path.push(".corrupt");
        PathBuf::from(path)
    }

    fn set_aside_unreadable(&self) {
        if !self.unreadable.swap(false, Ordering::AcqRel) {
            return;
        }
        let backup = self.corrupt_path();
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => warn!(
                "Moved unreadable settings file {} to {}",
                self.path.display(),
                backup.display()
            ),
            Err(e) => warn!(
                "Overwriting unreadable settings file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl SettingsStore for TomlSettingsStore {
    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.read().keys().cloned().collect())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        let table: toml::Table = self
            .values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), toml::Value::String(v.clone())))
            .collect();
        let content =
            toml::to_string_pretty(&table).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.set_aside_unreadable();
        atomic_write(&self.path, content.as_bytes())?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

fn read_table(path: &Path) -> StoreResult<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(path, &content)
}

fn parse_table(path: &Path, content: &str) -> StoreResult<BTreeMap<String, String>> {
    let table = content.parse::<toml::Table>().map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(table
        .into_iter()
        .map(|(key, value)| {
            let raw = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => b.to_string(),
                // Kept verbatim so readers can report it as malformed.
                other => other.to_string(),
            };
            (key, raw)
        })
        .collect())
}

/// Write through a synced temp file, then rename over `path`.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> StoreResult<()> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp).map_err(io_err)?;
    file.write_all(content).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(io_err)
}
