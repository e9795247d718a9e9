//! Player settings
//!
//! Stored as XML in the user's config directory
//! (`<config>/SurfacePlayer/settings.xml`). A missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::LogConfig;

/// Resampling filter used when the backend converts frames to RGB24
///
/// Source and destination geometry are always equal, so this only affects
/// chroma upsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScalingAlgorithm {
    FastBilinear,
    #[default]
    Bilinear,
    Bicubic,
    Point,
    Area,
    Lanczos,
}

fn default_true() -> bool {
    true
}

fn default_snapshot_every() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "SurfacePlayerSettings")]
pub struct PlayerSettings {
    #[serde(rename = "scaling", default)]
    pub scaling: ScalingAlgorithm,

    /// Present frames the decoder still buffers when the container ends
    #[serde(rename = "flushDecoderAtEof", default = "default_true")]
    pub flush_decoder_at_eof: bool,

    /// Image-sequence surface: save every Nth presented frame (1-1000)
    #[serde(rename = "snapshotEvery", default = "default_snapshot_every")]
    pub snapshot_every: u32,

    /// Default tracing filter when no environment override is set
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,

    #[serde(rename = "logJson", default)]
    pub log_json: bool,

    /// Log file path; file logging is off when unset
    #[serde(rename = "logFile", default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            scaling: ScalingAlgorithm::default(),
            flush_decoder_at_eof: true,
            snapshot_every: default_snapshot_every(),
            log_level: default_log_level(),
            log_json: false,
            log_file: None,
        }
    }
}

impl PlayerSettings {
    /// Clamp values to their valid ranges
    pub fn clamp(&mut self) {
        self.snapshot_every = self.snapshot_every.clamp(1, 1000);
        if self.log_level.trim().is_empty() {
            self.log_level = default_log_level();
        }
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("SurfacePlayer");
            p.push("settings.xml");
            p
        })
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = from_str(&contents)?;
        settings.clamp();
        Ok(settings)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable settings: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to an XML file, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let xml = to_string(self)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted)?;
        Ok(())
    }

    /// Save to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to_file(&path)
    }

    /// Logging configuration described by these settings
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            file_enabled: self.log_file.is_some(),
            file_path: self.log_file.as_ref().map(PathBuf::from),
            json_format: self.log_json,
            default_level: self.log_level.clone(),
            ..LogConfig::default()
        }
    }
}

/// Settings-related errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PlayerSettings::default();
        assert_eq!(settings.scaling, ScalingAlgorithm::Bilinear);
        assert!(settings.flush_decoder_at_eof);
        assert_eq!(settings.snapshot_every, 1);
        assert_eq!(settings.log_level, "info");
        assert!(settings.log_file.is_none());
    }

    #[test]
    fn test_clamping() {
        let mut settings = PlayerSettings {
            snapshot_every: 0,
            log_level: "  ".to_string(),
            ..PlayerSettings::default()
        };
        settings.clamp();
        assert_eq!(settings.snapshot_every, 1);
        assert_eq!(settings.log_level, "info");

        settings.snapshot_every = 5000;
        settings.clamp();
        assert_eq!(settings.snapshot_every, 1000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.xml");
        let settings = PlayerSettings {
            scaling: ScalingAlgorithm::Lanczos,
            flush_decoder_at_eof: false,
            snapshot_every: 10,
            log_level: "debug".to_string(),
            log_json: true,
            log_file: Some("/tmp/player.log".to_string()),
        };

        settings.save_to_file(&path).unwrap();
        let loaded = PlayerSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        fs::write(
            &path,
            "<SurfacePlayerSettings><snapshotEvery>0</snapshotEvery></SurfacePlayerSettings>",
        )
        .unwrap();

        let loaded = PlayerSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded.snapshot_every, 1);
        assert!(loaded.flush_decoder_at_eof);
        assert_eq!(loaded.scaling, ScalingAlgorithm::Bilinear);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PlayerSettings::load_from_file(&dir.path().join("missing.xml")),
            Err(SettingsError::Io(_))
        ));

        let path = dir.path().join("bad.xml");
        fs::write(
            &path,
            "<SurfacePlayerSettings><snapshotEvery>many</snapshotEvery></SurfacePlayerSettings>",
        )
        .unwrap();
        assert!(matches!(
            PlayerSettings::load_from_file(&path),
            Err(SettingsError::XmlParse(_))
        ));
    }

    #[test]
    fn test_log_config() {
        let settings = PlayerSettings {
            log_file: Some("player.log".to_string()),
            ..PlayerSettings::default()
        };
        let config = settings.log_config();
        assert!(config.file_enabled);
        assert!(config.console_enabled);
        assert_eq!(config.file_path, Some(PathBuf::from("player.log")));
    }
}
