//! Path resolution for fintrack-sync configuration and data files.
//!
//! All data is stored in `~/.fintrack/` (or `$FINTRACK_HOME`):
//! - `config.yaml` - Main configuration file
//! - `fintrack.db` - SQLite database holding the sync queue and its history

use std::path::PathBuf;

use crate::error::FintrackError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "FINTRACK_HOME";

/// Paths to fintrack-sync configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.fintrack/`
    pub root: PathBuf,
    /// Config file: `~/.fintrack/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.fintrack/fintrack.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve the data root from `$FINTRACK_HOME`, else `~/.fintrack`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, FintrackError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            FintrackError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".fintrack")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("fintrack.db"),
            root,
        }
    }

    /// Ensure the data root exists, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), FintrackError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                FintrackError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-fintrack");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("fintrack.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("data"));

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
    }
}
