//! Configuration for BrickPub
//!
//! Settings are organized into sections: rendering (external tool,
//! image size, camera and fade defaults), message routing, and the
//! recent-files list. The aggregate [`Config`] loads and saves JSON or
//! TOML by file extension and validates values on both paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use brickpub_core::constants::{
    CAMERA_FOV_MAX, CAMERA_FOV_MIN, DEFAULT_FADE_COLOR, DEFAULT_FADE_OPACITY,
    DEFAULT_HIGHLIGHT_COLOR, DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH,
};
use brickpub_core::{MessageBucket, MessageDispatcher, MessageRouting, SettingsError};

/// External renderer and image settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Renderer executable; rendering is disabled when unset.
    #[serde(default)]
    pub renderer_path: Option<PathBuf>,
    /// Extra arguments placed before the generated ones.
    #[serde(default)]
    pub renderer_args: Vec<String>,
    /// Step image width in pixels.
    pub image_width: u32,
    /// Step image height in pixels.
    pub image_height: u32,
    /// Default camera field of view in degrees.
    pub camera_fov: f32,
    /// Default camera latitude in degrees.
    pub camera_latitude: f32,
    /// Default camera longitude in degrees.
    pub camera_longitude: f32,
    /// Whether fade variant files are produced.
    #[serde(default)]
    pub fade: bool,
    /// Colour faded parts take.
    pub fade_color: u32,
    /// Fade opacity in percent.
    pub fade_opacity: u8,
    /// Whether highlight variant files are produced.
    #[serde(default)]
    pub highlight: bool,
    /// Colour highlighted parts take.
    pub highlight_color: u32,
    /// Directory working files are written to; a temporary directory
    /// is used when unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Directory step images are written to; defaults beside the
    /// working files when unset.
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            renderer_path: None,
            renderer_args: Vec::new(),
            image_width: DEFAULT_IMAGE_WIDTH,
            image_height: DEFAULT_IMAGE_HEIGHT,
            camera_fov: 25.0,
            camera_latitude: 23.0,
            camera_longitude: 45.0,
            fade: false,
            fade_color: DEFAULT_FADE_COLOR,
            fade_opacity: DEFAULT_FADE_OPACITY,
            highlight: false,
            highlight_color: DEFAULT_HIGHLIGHT_COLOR,
            work_dir: None,
            image_dir: None,
        }
    }
}

/// Message routing, one entry per diagnostic bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageSettings {
    #[serde(default)]
    pub parse: MessageRouting,
    #[serde(default)]
    pub insert: MessageRouting,
    #[serde(default)]
    pub include_file: MessageRouting,
    #[serde(default)]
    pub build_mod: MessageRouting,
    #[serde(default)]
    pub build_mod_edit: MessageRouting,
    #[serde(default)]
    pub annotation: MessageRouting,
    #[serde(default)]
    pub configuration: MessageRouting,
}

impl MessageSettings {
    /// Push the routing table onto a dispatcher
    pub fn apply(&self, messages: &MessageDispatcher) {
        messages.set_routing(MessageBucket::Parse, self.parse);
        messages.set_routing(MessageBucket::Insert, self.insert);
        messages.set_routing(MessageBucket::IncludeFile, self.include_file);
        messages.set_routing(MessageBucket::BuildMod, self.build_mod);
        messages.set_routing(MessageBucket::BuildModEdit, self.build_mod_edit);
        messages.set_routing(MessageBucket::Annotation, self.annotation);
        messages.set_routing(MessageBucket::Configuration, self.configuration);
    }
}

/// Recently opened documents, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentFiles {
    /// Paths in most-recent-first order.
    pub entries: Vec<PathBuf>,
    /// How many entries are kept.
    pub capacity: usize,
}

impl Default for RecentFiles {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            capacity: 10,
        }
    }
}

impl RecentFiles {
    /// Record a file as most recently used
    pub fn add(&mut self, path: PathBuf) {
        self.entries.retain(|f| f != &path);
        self.entries.insert(0, path);
        self.entries.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Top-level settings aggregate
///
/// Aggregates all settings sections and provides file I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Renderer and image settings.
    pub render: RenderSettings,
    /// Diagnostic routing.
    pub messages: MessageSettings,
    /// Recent files.
    pub recent: RecentFiles,
}

impl Config {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file, JSON or TOML by extension
    ///
    /// # Errors
    /// Returns a settings error when the file cannot be read, parsed,
    /// or fails validation.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(path, &e))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| load_failed(path, &e))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| load_failed(path, &e))?
        } else {
            return Err(SettingsError::LoadFailed {
                path: path.display().to_string(),
                reason: "config file must be .json or .toml".to_string(),
            });
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file, JSON or TOML by extension
    ///
    /// The content goes to a sibling temporary file first and is moved
    /// into place, so a crash mid-save cannot truncate the old file.
    ///
    /// # Errors
    /// Returns a settings error when validation or the write fails.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self).map_err(|e| save_failed(path, &e))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self).map_err(|e| save_failed(path, &e))?
        } else {
            return Err(SettingsError::SaveFailed {
                path: path.display().to_string(),
                reason: "config file must be .json or .toml".to_string(),
            });
        };

        let staging = path.with_extension("tmp");
        std::fs::write(&staging, content).map_err(|e| save_failed(path, &e))?;
        std::fs::rename(&staging, path).map_err(|e| save_failed(path, &e))?;
        Ok(())
    }

    /// Reject out-of-range values before use
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.render.image_width == 0 || self.render.image_height == 0 {
            return Err(invalid(
                "render.image_size",
                "image dimensions must be > 0",
            ));
        }

        if !(CAMERA_FOV_MIN..=CAMERA_FOV_MAX).contains(&self.render.camera_fov) {
            return Err(invalid(
                "render.camera_fov",
                format!(
                    "field of view must be within {CAMERA_FOV_MIN} to {CAMERA_FOV_MAX} degrees"
                ),
            ));
        }

        if self.render.fade_opacity > 100 {
            return Err(invalid(
                "render.fade_opacity",
                "opacity is a percentage, 0 to 100",
            ));
        }

        if self.recent.capacity == 0 {
            return Err(invalid("recent.capacity", "capacity must be > 0"));
        }

        Ok(())
    }

    /// Record a file as most recently opened
    pub fn add_recent_file(&mut self, path: PathBuf) {
        self.recent.add(path);
    }
}

fn load_failed(path: &Path, error: &dyn std::fmt::Display) -> SettingsError {
    SettingsError::LoadFailed {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn save_failed(path: &Path, error: &dyn std::fmt::Display) -> SettingsError {
    SettingsError::SaveFailed {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn invalid(setting: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue {
        setting: setting.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_fov_is_rejected() {
        let mut config = Config::default();
        config.render.camera_fov = 9999.0;
        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            SettingsError::InvalidValue { ref setting, .. } if setting == "render.camera_fov"
        ));
    }

    #[test]
    fn test_opacity_above_percent_scale_is_rejected() {
        let mut config = Config::default();
        config.render.fade_opacity = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recent_files_dedupe_and_trim() {
        let mut recent = RecentFiles {
            capacity: 3,
            ..RecentFiles::default()
        };
        recent.add(PathBuf::from("a.mpd"));
        recent.add(PathBuf::from("b.mpd"));
        recent.add(PathBuf::from("a.mpd"));
        recent.add(PathBuf::from("c.mpd"));
        recent.add(PathBuf::from("d.mpd"));

        let entries: Vec<&Path> = recent.iter().collect();
        assert_eq!(
            entries,
            vec![
                Path::new("d.mpd"),
                Path::new("c.mpd"),
                Path::new("a.mpd"),
            ]
        );
    }

    #[test]
    fn test_toml_round_trip_preserves_sections() {
        let mut config = Config::default();
        config.render.fade = true;
        config.render.renderer_path = Some(PathBuf::from("/usr/bin/brickview"));
        config.messages.parse = MessageRouting::LogOnly;
        config.add_recent_file(PathBuf::from("castle.mpd"));

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_routing_lands_on_the_dispatcher() {
        let settings = MessageSettings {
            insert: MessageRouting::Silenced,
            ..MessageSettings::default()
        };
        let messages = MessageDispatcher::new();
        settings.apply(&messages);

        assert_eq!(messages.routing(MessageBucket::Insert), MessageRouting::Silenced);
        assert_eq!(messages.routing(MessageBucket::Parse), MessageRouting::Surface);
    }
}
