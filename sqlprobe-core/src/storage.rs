//! Per-application JSON blob store on the platform user-data directories.
//!
//! Documents live under the roaming data root (`dirs::data_dir`); the
//! backup and recovery folders hang off the local data root
//! (`dirs::data_local_dir`), mirroring the APPDATA / LOCALAPPDATA split on
//! Windows. Backup and recovery are destination builders only; the write
//! step is not implemented.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, SqlProbeError};

/// Folder under the local root holding backups.
const BACKUP_FOLDER: &str = "backup";

/// Folder under the local root holding recovery files.
const RECOVERY_FOLDER: &str = "recovery";

/// JSON document store keyed by filename under a per-application data root.
#[derive(Debug, Clone)]
pub struct AppDataStore {
    app_name: String,
    data_dir: PathBuf,
    local_dir: PathBuf,
}

impl AppDataStore {
    /// Creates a store rooted at the platform user-data directories for
    /// `app_name`, creating the data root if absent.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the platform provides no user-data
    /// directory, or an `Io` error if the data root cannot be created.
    pub fn new(app_name: &str) -> Result<Self> {
        let data_root = dirs::data_dir()
            .ok_or_else(|| SqlProbeError::configuration("no platform user-data directory"))?;
        let local_root = dirs::data_local_dir()
            .ok_or_else(|| SqlProbeError::configuration("no platform local-data directory"))?;

        Self::with_roots(
            app_name,
            data_root.join(app_name),
            local_root.join(app_name),
        )
    }

    /// Creates a store with explicit roots. Used by tests and by callers
    /// that relocate the store.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the data root cannot be created.
    pub fn with_roots(
        app_name: &str,
        data_dir: impl Into<PathBuf>,
        local_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let store = Self {
            app_name: app_name.to_string(),
            data_dir: data_dir.into(),
            local_dir: local_dir.into(),
        };
        fs::create_dir_all(&store.data_dir).map_err(|e| {
            SqlProbeError::io(
                format!("create data directory '{}'", store.data_dir.display()),
                e,
            )
        })?;
        Ok(store)
    }

    /// Application name the store was created for.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Root holding the JSON documents.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Serializes `data` as JSON at `<data root>/<filename>`.
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error if `data` cannot be encoded, or an
    /// `Io` error if the file cannot be written.
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.data_dir.join(filename);
        let json = serde_json::to_string(data)
            .map_err(|e| SqlProbeError::serialization(format!("encode '{filename}'"), e))?;
        fs::write(&path, json)
            .map_err(|e| SqlProbeError::io(format!("write '{}'", path.display()), e))?;
        debug!("saved '{}'", path.display());
        Ok(())
    }

    /// Like [`save`](Self::save), appending a `.json` extension when the
    /// filename lacks one.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn save_user<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        if filename.ends_with(".json") {
            self.save(filename, data)
        } else {
            self.save(&format!("{filename}.json"), data)
        }
    }

    /// Loads and decodes the document at `<data root>/<filename>`, or `None`
    /// if no such document exists.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if an existing file cannot be read, or a
    /// `Serialization` error if its contents cannot be decoded.
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.data_dir.join(filename);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| SqlProbeError::io(format!("read '{}'", path.display()), e))?;
        let data = serde_json::from_str(&json)
            .map_err(|e| SqlProbeError::serialization(format!("decode '{filename}'"), e))?;
        Ok(Some(data))
    }

    /// Deletes the document at `<data root>/<filename>`. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if an existing file cannot be removed.
    pub fn delete(&self, filename: &str) -> Result<()> {
        let path = self.data_dir.join(filename);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| SqlProbeError::io(format!("delete '{}'", path.display()), e))?;
        }
        Ok(())
    }

    /// Filenames currently stored under the data root.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the data root cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| {
            SqlProbeError::io(format!("read data directory '{}'", self.data_dir.display()), e)
        })?;

        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Computes the backup destination for `filename` (a `~`-prefixed file
    /// under the local root's backup folder), creating the folder if absent.
    ///
    /// TODO: the write step is missing; serialize the document to the
    /// returned path once a backup format is settled.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the backup folder cannot be created.
    pub fn backup_destination(&self, filename: &str) -> Result<PathBuf> {
        let folder = self.local_dir.join(BACKUP_FOLDER);
        fs::create_dir_all(&folder).map_err(|e| {
            SqlProbeError::io(format!("create backup directory '{}'", folder.display()), e)
        })?;
        Ok(folder.join(tilde_prefixed(filename)))
    }

    /// Computes the recovery destination for `filename` (a `~`-prefixed
    /// `.bak` file under the local root's recovery folder), creating the
    /// folder if absent.
    ///
    /// TODO: the write step is missing here as well.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the recovery folder cannot be created.
    pub fn recovery_destination(&self, filename: &str) -> Result<PathBuf> {
        let folder = self.local_dir.join(RECOVERY_FOLDER);
        fs::create_dir_all(&folder).map_err(|e| {
            SqlProbeError::io(format!("create recovery directory '{}'", folder.display()), e)
        })?;

        let mut name = tilde_prefixed(filename);
        if !name.ends_with(".bak") {
            name.push_str(".bak");
        }
        Ok(folder.join(name))
    }
}

fn tilde_prefixed(filename: &str) -> String {
    if filename.starts_with('~') {
        filename.to_string()
    } else {
        format!("~{filename}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    fn store(dir: &TempDir) -> AppDataStore {
        AppDataStore::with_roots(
            "sqlprobe-tests",
            dir.path().join("data"),
            dir.path().join("local"),
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let doc = Doc {
            name: "probe".to_string(),
            count: 3,
        };

        store.save("state.json", &doc).unwrap();
        assert_eq!(store.load::<Doc>("state.json").unwrap(), Some(doc));

        store.delete("state.json").unwrap();
        assert_eq!(store.load::<Doc>("state.json").unwrap(), None);
        // idempotent
        store.delete("state.json").unwrap();
    }

    #[test]
    fn test_save_user_appends_json_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let doc = Doc {
            name: "probe".to_string(),
            count: 1,
        };

        store.save_user("session", &doc).unwrap();
        assert_eq!(store.list().unwrap(), vec!["session.json".to_string()]);

        store.save_user("other.json", &doc).unwrap();
        assert_eq!(
            store.list().unwrap(),
            vec!["other.json".to_string(), "session.json".to_string()]
        );
    }

    #[test]
    fn test_load_missing_document_is_absent() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load::<Doc>("missing.json").unwrap(), None);
    }

    #[test]
    fn test_backup_destination_computes_path_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let dest = store.backup_destination("state.json").unwrap();
        assert_eq!(
            dest,
            dir.path().join("local").join("backup").join("~state.json")
        );
        assert!(dest.parent().unwrap().exists());
        // the write step is unimplemented
        assert!(!dest.exists());

        // already-prefixed names are left alone
        let dest = store.backup_destination("~state.json").unwrap();
        assert!(dest.ends_with("backup/~state.json"));
    }

    #[test]
    fn test_recovery_destination_adds_bak_suffix() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let dest = store.recovery_destination("state.json").unwrap();
        assert_eq!(
            dest,
            dir.path()
                .join("local")
                .join("recovery")
                .join("~state.json.bak")
        );
        assert!(!dest.exists());

        let dest = store.recovery_destination("~old.bak").unwrap();
        assert!(dest.ends_with("recovery/~old.bak"));
    }
}
