//! Settings persistence
//!
//! Resolves the platform configuration directory, loads the settings
//! file or falls back to defaults when none exists, and saves changes
//! back to the same place. An explicit path can stand in for the
//! platform one, which is what tests and portable installs use.

use std::path::{Path, PathBuf};

use brickpub_core::event_bus::SettingsEvent;
use brickpub_core::{emit, AppEvent, SettingsError};

use crate::config::Config;

const CONFIG_DIR: &str = "brickpub";
const CONFIG_FILE: &str = "settings.toml";

/// A [`Config`] bound to the file it came from
#[derive(Debug, Clone)]
pub struct SettingsPersistence {
    config: Config,
    path: PathBuf,
}

impl SettingsPersistence {
    /// Platform path of the settings file
    ///
    /// # Errors
    /// Returns a settings error when the platform has no configuration
    /// directory.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let base = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(base.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load settings from the platform location
    ///
    /// A missing file is not an error; defaults are used and the first
    /// save creates it.
    ///
    /// # Errors
    /// Returns a settings error when the platform has no configuration
    /// directory or the file exists but cannot be parsed.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Self::default_path()?)
    }

    /// Defaults bound to a path, without touching the disk
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            config: Config::default(),
            path: path.into(),
        }
    }

    /// Load settings from an explicit path, defaults when absent
    ///
    /// # Errors
    /// Returns a settings error when the file exists but cannot be
    /// parsed or fails validation.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let config = if path.is_file() {
            let config = Config::load_from_file(&path)?;
            let _ = emit!(AppEvent::Settings(SettingsEvent::Loaded {
                path: path.clone(),
            }));
            config
        } else {
            Config::default()
        };
        Ok(Self { config, path })
    }

    /// Save settings back to where they were loaded from
    ///
    /// # Errors
    /// Returns a settings error when the directory or file cannot be
    /// written.
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::SaveFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        self.config.save_to_file(&self.path)?;
        let _ = emit!(AppEvent::Settings(SettingsEvent::Saved {
            path: self.path.clone(),
        }));
        Ok(())
    }

    /// File the settings live in
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Validate the current settings
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickpub_core::MessageRouting;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = SettingsPersistence::load_from(dir.path().join("settings.toml")).unwrap();
        assert_eq!(persistence.config(), &Config::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut persistence = SettingsPersistence::load_from(&path).unwrap();
        persistence.config_mut().render.fade = true;
        persistence.config_mut().messages.build_mod = MessageRouting::LogOnly;
        persistence.config_mut().add_recent_file("tower.mpd".into());
        persistence.save().unwrap();

        let reloaded = SettingsPersistence::load_from(&path).unwrap();
        assert_eq!(reloaded.config(), persistence.config());
    }

    #[test]
    fn test_invalid_file_reports_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let error = SettingsPersistence::load_from(&path).unwrap_err();
        assert!(matches!(error, SettingsError::LoadFailed { .. }));
    }

    #[test]
    fn test_invalid_values_never_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut persistence = SettingsPersistence::load_from(&path).unwrap();
        persistence.config_mut().render.camera_fov = -1.0;
        assert!(persistence.save().is_err());
        assert!(!path.exists());
    }
}
