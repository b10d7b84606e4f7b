//! Engine configuration.
//!
//! ## Learning: Serde for Serialization
//!
//! `#[derive(Serialize, Deserialize)]` generates the code that converts
//! these structs to and from TOML. `#[serde(default)]` fills missing fields
//! from `Default::default()`, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! [tabstops]
//! backref_conflict = "reject"
//!
//! [editor]
//! line_ending = "crlf"
//! ```

use livetext_buffer::{BufferConfig, LineEnding};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::parser::BackrefConflictPolicy;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Snippet and tabstop behavior
    pub tabstops: TabstopConfig,

    /// Buffer settings for new documents
    pub editor: EditorConfig,
}

impl Config {
    /// Loads config from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::load_from_default_path() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Using default config: {}", err);
                Self::default()
            }
        }
    }

    /// Loads config from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn load_from_default_path() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("livetext").join("config.toml"))
    }

    /// Saves the config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path()?)
    }

    /// Saves the config to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Buffer configuration for new documents.
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_history: self.editor.undo_limit,
            line_ending: self.editor.line_ending,
        }
    }
}

/// Snippet and tabstop behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabstopConfig {
    /// What to do when a backref is defined twice with different text
    pub backref_conflict: BackrefConflictPolicy,

    /// Select the first tabstop right after inserting a snippet
    pub select_first_tabstop: bool,

    /// Inserting a snippet replaces the selection
    pub replace_selection: bool,
}

impl Default for TabstopConfig {
    fn default() -> Self {
        Self {
            backref_conflict: BackrefConflictPolicy::default(),
            select_first_tabstop: true,
            replace_selection: true,
        }
    }
}

/// Buffer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Line ending appended for zero-width markers at the end of a buffer
    pub line_ending: LineEnding,

    /// Undo history limit
    pub undo_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::Lf,
            undo_limit: 1000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tabstops.backref_conflict, BackrefConflictPolicy::Warn);
        assert!(config.tabstops.select_first_tabstop);
        assert_eq!(config.editor.undo_limit, 1000);
        assert_eq!(config.buffer_config().line_ending, LineEnding::Lf);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[tabstops]\nbackref_conflict = \"reject\"\n\n[editor]\nline_ending = \"crlf\"\n",
        )
        .unwrap();
        assert_eq!(config.tabstops.backref_conflict, BackrefConflictPolicy::Reject);
        assert!(config.tabstops.replace_selection);
        assert_eq!(config.editor.line_ending, LineEnding::CrLf);
        assert_eq!(config.editor.undo_limit, 1000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.tabstops.select_first_tabstop = false;
        config.editor.undo_limit = 50;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tabstops]\nbackref_conflict = \"sometimes\"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::load_from(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
