//! JSON document persistence in the app config directory.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    consts::{PERSIST_MAX_ATTEMPTS, PERSIST_RETRY_DELAY_MS},
    error::{Error, Result},
};

static FILE_SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_suffix() -> u64 {
    FILE_SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(unix)]
pub fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt as _;

    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            debug!(?path, %error, "restrict_file_permissions failed");
        }
    }
}

#[cfg(not(unix))]
pub fn restrict_file_permissions(_path: &Path) {}

/// Reads a JSON document. A missing file is `Ok(None)`; a corrupt one is moved
/// aside as `*.corrupt-<n>.json` and also reported as `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<T>(&content) {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            let backup_path = path.with_extension(format!("corrupt-{}.json", unique_suffix()));
            match fs::rename(path, &backup_path) {
                Ok(()) => warn!(
                    ?path,
                    backup = %backup_path.display(),
                    %error,
                    "moved corrupt document aside"
                ),
                Err(rename_error) => {
                    warn!(?path, %error, %rename_error, "corrupt document could not be moved")
                }
            }
            Ok(None)
        }
    }
}

/// Writes through a temp file and an atomic rename so a crash never leaves a
/// truncated document behind.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::Persist {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension(format!("tmp-{}", unique_suffix()));
    fs::write(&tmp_path, content).map_err(|source| Error::Persist {
        path: tmp_path.clone(),
        source,
    })?;
    restrict_file_permissions(&tmp_path);
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        Error::Persist {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// [`write_json_atomic`] with a few attempts and linear backoff.
pub fn write_json_with_retry<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut attempt = 1;
    loop {
        match write_json_atomic(path, value) {
            Ok(()) => return Ok(()),
            Err(error) if attempt < PERSIST_MAX_ATTEMPTS => {
                debug!(?path, attempt, %error, "persist failed, retrying");
                thread::sleep(Duration::from_millis(
                    PERSIST_RETRY_DELAY_MS * u64::from(attempt),
                ));
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

pub type UnreadCounts = BTreeMap<String, u32>;

/// Storage for the unread-count document.
pub trait UnreadStore: Send {
    /// Raw persisted counts; the aggregator filters unknown ids.
    fn load(&self) -> Result<UnreadCounts>;
    fn save(&self, counts: &UnreadCounts) -> Result<()>;
}

pub struct JsonUnreadStore {
    path: PathBuf,
}

impl JsonUnreadStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UnreadStore for JsonUnreadStore {
    fn load(&self) -> Result<UnreadCounts> {
        let raw: Option<BTreeMap<String, serde_json::Value>> = read_json(&self.path)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(id, value)| coerce_count(&value).map(|count| (id, count)))
            .collect())
    }

    fn save(&self, counts: &UnreadCounts) -> Result<()> {
        write_json_atomic(&self.path, counts)
    }
}

/// Accepts integers and integral floats from older documents; negative values clamp to 0.
fn coerce_count(value: &serde_json::Value) -> Option<u32> {
    if let Some(count) = value.as_u64() {
        return Some(u32::try_from(count).unwrap_or(u32::MAX));
    }
    if value.as_i64().is_some() {
        return Some(0);
    }
    value
        .as_f64()
        .filter(|count| count.is_finite())
        .map(|count| count.max(0.0).min(f64::from(u32::MAX)) as u32)
}

impl<S: UnreadStore + Sync> UnreadStore for std::sync::Arc<S> {
    fn load(&self) -> Result<UnreadCounts> {
        (**self).load()
    }

    fn save(&self, counts: &UnreadCounts) -> Result<()> {
        (**self).save(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_document_round_trips_as_flat_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonUnreadStore::new(dir.path().join("unread-state.json"));
        let counts: UnreadCounts = [("slack".to_string(), 4), ("teams".to_string(), 0)]
            .into_iter()
            .collect();

        store.save(&counts).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"slack": 4, "teams": 0}));
        assert_eq!(store.load().unwrap(), counts);
    }

    #[test]
    fn load_coerces_legacy_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unread-state.json");
        fs::write(&path, r#"{"slack": -2, "discord": 3.0, "x": "7", "teams": 1}"#).unwrap();

        let counts = JsonUnreadStore::new(&path).load().unwrap();
        assert_eq!(counts.get("slack"), Some(&0));
        assert_eq!(counts.get("discord"), Some(&3));
        assert_eq!(counts.get("x"), None);
        assert_eq!(counts.get("teams"), Some(&1));
    }

    #[test]
    fn corrupt_documents_are_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app-state.json");
        fs::write(&path, "{ definitely not json").unwrap();

        let loaded: Option<serde_json::Value> = read_json(&path).unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists());
        let moved = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().contains("corrupt-"));
        assert!(moved);
    }

    #[test]
    fn missing_documents_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<UnreadCounts> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }
}
