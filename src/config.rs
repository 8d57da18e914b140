//! Configuration management for Shiori.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use crate::filter::ScanlatorMatch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "Shiori";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Default filename of the durable pending tracker update queue.
const PENDING_TRACKING_FILENAME: &str = "pending_tracking.json";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Merged-source deduplication settings.
    pub merge: MergeConfig,

    /// Tracker synchronization settings.
    pub tracking: TrackingConfig,

    /// Reader chapter list settings.
    pub reader: ReaderConfig,

    /// Chapter list filtering settings.
    pub filter: FilterConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Merged-source deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Languages whose titles carry no reliable volume numbering.
    /// Merged chapters for these titles are matched on chapter number alone.
    pub number_only_languages: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            number_only_languages: vec!["ko".to_string(), "zh".to_string(), "zh-hk".to_string()],
        }
    }
}

/// Tracker synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Delay before a "mark as read" is pushed to trackers, in milliseconds.
    pub debounce_delay_ms: u64,

    /// Push progress to trackers when chapters are marked read from a list.
    pub update_on_mark_read: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: 3000,
            update_on_mark_read: true,
        }
    }
}

impl TrackingConfig {
    /// Returns the debounce delay as a duration.
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

/// Reader chapter list configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReaderConfig {
    /// Skip chapters already read when moving between chapters.
    pub skip_read: bool,

    /// Skip chapters hidden by the title's chapter filters.
    pub skip_filtered: bool,

    /// Keep a single chapter per chapter number.
    pub skip_duplicates: bool,
}

/// Chapter list filtering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// Whether a chapter is hidden when any or all of its groups are excluded.
    pub scanlator_match: ScanlatorMatch,
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for the pending tracking queue.
    /// Defaults to the config directory.
    pub data_directory: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking.debounce_delay_ms > 60_000 {
            return Err(ConfigError::InvalidValue {
                key: "tracking.debounce_delay_ms".to_string(),
                message: "must be at most 60000".to_string(),
            });
        }

        if let Some(lang) = self
            .merge
            .number_only_languages
            .iter()
            .find(|l| l.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "merge.number_only_languages".to_string(),
                message: format!("contains an empty language code ({:?})", lang),
            });
        }

        Ok(())
    }

    /// Returns the effective data directory, using config or default.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.data_directory {
            Ok(dir.clone())
        } else {
            Self::config_dir()
        }
    }

    /// Returns the path of the pending tracking queue file.
    pub fn pending_tracking_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(PENDING_TRACKING_FILENAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking.debounce_delay_ms, 3000);
        assert_eq!(config.tracking.debounce_delay(), Duration::from_secs(3));
        assert!(config.tracking.update_on_mark_read);
        assert!(!config.reader.skip_read);
        assert_eq!(config.filter.scanlator_match, ScanlatorMatch::Any);
        assert!(
            config
                .merge
                .number_only_languages
                .contains(&"ko".to_string())
        );
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.reader.skip_read = true;
        config.filter.scanlator_match = ScanlatorMatch::All;
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert!(loaded.reader.skip_read);
        assert_eq!(loaded.filter.scanlator_match, ScanlatorMatch::All);
        assert_eq!(
            loaded.merge.number_only_languages,
            config.merge.number_only_languages
        );
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.tracking.debounce_delay_ms, 3000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[reader]\nskip_filtered = true\n").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(config.reader.skip_filtered);
        assert!(!config.reader.skip_read);
        assert_eq!(config.tracking.debounce_delay_ms, 3000);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.tracking.debounce_delay_ms = 120_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.merge.number_only_languages.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pending_path_uses_data_directory() {
        let mut config = Config::default();
        config.paths.data_directory = Some(PathBuf::from("/tmp/shiori-data"));
        assert_eq!(
            config.pending_tracking_path().unwrap(),
            PathBuf::from("/tmp/shiori-data").join(PENDING_TRACKING_FILENAME)
        );
    }
}
