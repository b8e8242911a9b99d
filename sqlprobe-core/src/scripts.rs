//! Discovery of `.sql` script files.
//!
//! A read-only view over a directory, recomputed on every call. Nothing is
//! cached between discoveries.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SqlProbeError};

/// Default script folder, relative to the working directory.
const SCRIPTS_DIR: &str = "scripts";

/// Returns the default scripts directory under the current working
/// directory, creating it if absent.
///
/// # Errors
///
/// Returns an `Io` error if the working directory cannot be resolved or the
/// folder cannot be created.
pub fn default_scripts_dir() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| SqlProbeError::io("resolve current working directory", e))?;
    let dir = cwd.join(SCRIPTS_DIR);
    fs::create_dir_all(&dir)
        .map_err(|e| SqlProbeError::io(format!("create scripts directory '{}'", dir.display()), e))?;
    Ok(dir)
}

/// Lists the `.sql` files directly under `path`, sorted by file name.
///
/// With no path the default `scripts/` folder is used (created if absent).
/// An explicitly supplied path that does not exist is a `ScriptNotFound`
/// fault.
///
/// # Errors
///
/// Returns `ScriptNotFound` for a missing explicit path, or `Io` if the
/// directory cannot be read.
pub fn locate_scripts(path: Option<&Path>) -> Result<Vec<PathBuf>> {
    let dir = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SqlProbeError::script_not_found(p));
            }
            p.to_path_buf()
        }
        None => default_scripts_dir()?,
    };

    let entries = fs::read_dir(&dir)
        .map_err(|e| SqlProbeError::io(format!("read scripts directory '{}'", dir.display()), e))?;

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    scripts.sort();

    debug!("located {} script(s) under '{}'", scripts.len(), dir.display());
    Ok(scripts)
}

/// File names of a located script set.
#[must_use]
pub fn script_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect()
}

/// Reads the full text of one script, trimmed of surrounding whitespace.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be read.
pub fn read_script(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| SqlProbeError::io(format!("read script '{}'", path.display()), e))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locates_only_sql_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.sql"), "SELECT 2").unwrap();
        fs::write(dir.path().join("a.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a script").unwrap();
        fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let scripts = locate_scripts(Some(dir.path())).unwrap();
        let names = script_names(&scripts);
        assert_eq!(names, vec!["a.sql".to_string(), "b.sql".to_string()]);
    }

    #[test]
    fn test_explicit_missing_path_is_a_fault() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nowhere");

        let err = locate_scripts(Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, SqlProbeError::ScriptNotFound { .. }));
        assert_eq!(err.category(), "ScriptNotFound");
    }

    #[test]
    fn test_empty_directory_yields_empty_set() {
        let dir = TempDir::new().unwrap();
        assert!(locate_scripts(Some(dir.path())).unwrap().is_empty());
    }

    #[test]
    fn test_read_script_trims_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("probe.sql");
        fs::write(&path, "\n  SELECT 1;\n\n").unwrap();

        assert_eq!(read_script(&path).unwrap(), "SELECT 1;");
    }
}
