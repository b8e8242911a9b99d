//! INI configuration store with default-section fallback.
//!
//! Parsing is delegated to the `config` crate; values are kept as plain
//! strings and parsed on demand by the typed getters. Lookups that miss both
//! the named section and the `DEFAULT` section return `None` and log a single
//! warning; callers must handle absence rather than rely on a default value.
//! A missing backing file is repaired by writing a fixed default file; a
//! malformed or unreadable file is fatal at load time.
//!
//! Section and key lookups are case-insensitive: names are folded to
//! lowercase at load, matching the option-name folding of classic INI
//! readers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use tracing::{debug, warn};

use crate::error::{Result, SqlProbeError};

/// Section name backing fallback lookups.
const DEFAULT_SECTION: &str = "default";

/// Contents written when the backing file is missing. Fixed bootstrap
/// defaults, not a user-configurable template.
const DEFAULT_FILE_CONTENTS: &str = "\
[DEFAULT]
app_name = sqlprobe
log_file = logs/sqlprobe.log
sample_index = 86
";

/// Read-only view over one INI file: named sections of string key/value
/// pairs, with the `DEFAULT` section inherited as a fallback for every other
/// section.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigStore {
    /// Loads the store from `path`, creating the file with fixed defaults if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the file exists but cannot be
    /// parsed, or an `Io` error if the default file cannot be written.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "config file '{}' not found, writing defaults",
                path.display()
            );
            reset_defaults(path)?;
        }

        let inner = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .map_err(|e| {
                SqlProbeError::configuration(format!(
                    "failed to read config file '{}': {e}",
                    path.display()
                ))
            })?;

        let parsed: BTreeMap<String, BTreeMap<String, String>> =
            inner.try_deserialize().map_err(|e| {
                SqlProbeError::configuration(format!(
                    "malformed config file '{}': {e}",
                    path.display()
                ))
            })?;

        // fold section and key names to lowercase so lookups stay
        // case-insensitive regardless of how the file was written
        let sections = parsed
            .into_iter()
            .map(|(section, entries)| {
                (
                    section.to_lowercase(),
                    entries
                        .into_iter()
                        .map(|(key, value)| (key.to_lowercase(), value))
                        .collect(),
                )
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key` in `section`, falling back to the
    /// `DEFAULT` section. `None` (with one warning) when both miss.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        debug!("getting '{key}' from section '{section}'");
        let section_lc = section.to_lowercase();
        let key_lc = key.to_lowercase();

        let value = self
            .sections
            .get(&section_lc)
            .and_then(|entries| entries.get(&key_lc))
            .or_else(|| {
                self.sections
                    .get(DEFAULT_SECTION)
                    .and_then(|entries| entries.get(&key_lc))
            });

        match value {
            Some(v) => Some(v.clone()),
            None => {
                warn!("key '{key}' not found in section '{section}' or defaults");
                None
            }
        }
    }

    /// Integer variant of [`get`](Self::get). A present but unparseable value
    /// behaves exactly like a missing key.
    #[must_use]
    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        let raw = self.get(section, key)?;
        match raw.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("key '{key}' in section '{section}' is not an integer ({raw:?}): {e}");
                None
            }
        }
    }

    /// Float variant of [`get`](Self::get).
    #[must_use]
    pub fn get_float(&self, section: &str, key: &str) -> Option<f64> {
        let raw = self.get(section, key)?;
        match raw.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("key '{key}' in section '{section}' is not a float ({raw:?}): {e}");
                None
            }
        }
    }

    /// Boolean variant of [`get`](Self::get). Accepts `1/yes/true/on` and
    /// `0/no/false/off`, case-insensitively.
    #[must_use]
    pub fn get_boolean(&self, section: &str, key: &str) -> Option<bool> {
        let raw = self.get(section, key)?;
        match raw.trim().to_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Some(true),
            "0" | "no" | "false" | "off" => Some(false),
            other => {
                warn!("key '{key}' in section '{section}' is not a boolean ({other:?})");
                None
            }
        }
    }

    /// Comma-delimited list variant of [`get`](Self::get). Splits on commas
    /// without trimming; an empty value yields one empty-string element.
    #[must_use]
    pub fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        let raw = self.get(section, key)?;
        Some(raw.split(',').map(str::to_string).collect())
    }

    /// Returns the mapping for `section` with `DEFAULT` keys merged in as
    /// fallbacks, or `None` (with one warning) if the section does not exist.
    #[must_use]
    pub fn get_section(&self, section: &str) -> Option<BTreeMap<String, String>> {
        let section_lc = section.to_lowercase();
        if section_lc == DEFAULT_SECTION {
            return Some(self.sections.get(DEFAULT_SECTION).cloned().unwrap_or_default());
        }

        match self.sections.get(&section_lc) {
            Some(entries) => {
                let mut merged = self
                    .sections
                    .get(DEFAULT_SECTION)
                    .cloned()
                    .unwrap_or_default();
                merged.extend(entries.clone());
                Some(merged)
            }
            None => {
                warn!("section '{section}' not found");
                None
            }
        }
    }

    /// Named section names in deterministic (sorted) order, excluding the
    /// default section.
    #[must_use]
    pub fn get_sections(&self) -> Vec<String> {
        self.sections
            .keys()
            .filter(|name| name.as_str() != DEFAULT_SECTION)
            .cloned()
            .collect()
    }
}

/// Writes the fixed default configuration file at `path`. The only
/// persistence path the store has.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be written.
pub fn reset_defaults(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            SqlProbeError::io(format!("create config directory '{}'", parent.display()), e)
        })?;
    }
    fs::write(path, DEFAULT_FILE_CONTENTS)
        .map_err(|e| SqlProbeError::io(format!("write default config '{}'", path.display()), e))
}
