//! Generic JSON-file-backed persisted map (spec §6, §9): replaces the
//! source's package-level global caches with an explicit, injectable store
//! the factory and v2 download client each own an instance of.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

pub struct PersistedMap<V> {
    path: PathBuf,
    state: RwLock<HashMap<String, V>>,
}

impl<V> PersistedMap<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn open(path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::decode("create persisted cache directory", e))?;
            set_permissions(parent, 0o755);
        }

        let state = fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();

        Ok(Self { path, state: RwLock::new(state) })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.state.read().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: String, value: V) -> Result<(), Error> {
        {
            let mut guard = self.state.write().unwrap();
            guard.insert(key, value);
        }
        self.flush()
    }

    fn flush(&self) -> Result<(), Error> {
        let guard = self.state.read().unwrap();
        let json = serde_json::to_string_pretty(&*guard).map_err(|e| Error::decode("serialize persisted cache", e))?;
        drop(guard);

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| Error::decode("write persisted cache", e))?;
            file.write_all(json.as_bytes()).map_err(|e| Error::decode("write persisted cache", e))?;
        }
        set_permissions(&tmp_path, 0o644);

        fs::rename(&tmp_path, &self.path).map_err(|e| Error::decode("install persisted cache", e))?;
        Ok(())
    }

    /// Clears in-memory and on-disk state, implementing the `reset_for_tests()`
    /// capability called for in spec §9 as a replacement for package-level
    /// global state.
    pub fn reset_for_tests(&self) {
        self.state.write().unwrap().clear();
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) {
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(mode);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Entry {
        protocol: String,
    }

    #[test]
    fn set_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let map: PersistedMap<Entry> = PersistedMap::open(path.clone()).unwrap();
        map.set("https://example.test".to_string(), Entry { protocol: "v3".to_string() }).unwrap();

        let reopened: PersistedMap<Entry> = PersistedMap::open(path).unwrap();
        assert_eq!(reopened.get("https://example.test"), Some(Entry { protocol: "v3".to_string() }));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let map: PersistedMap<Entry> = PersistedMap::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(map.get("anything"), None);
    }

    #[test]
    fn reset_for_tests_clears_state_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let map: PersistedMap<Entry> = PersistedMap::open(path.clone()).unwrap();
        map.set("k".to_string(), Entry { protocol: "v2".to_string() }).unwrap();

        map.reset_for_tests();
        assert_eq!(map.get("k"), None);
        assert!(!path.exists());
    }
}
