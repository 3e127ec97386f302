//! Configuration persistence for shotdrop settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upload endpoint
pub const DEFAULT_UPLOAD_URL: &str = "https://s.h4ks.com/api/";

const MIB: u64 = 1024 * 1024;

/// Video container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
}

impl Container {
    /// Get file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
        }
    }
}

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Upload endpoint accepting a multipart `file` field
    pub upload_url: String,
    /// Largest file the upload service accepts, in MiB
    pub max_file_size_mb: u64,
    /// Headroom below the upload ceiling at which recordings auto-stop, in MiB
    pub size_margin_mb: u64,
    /// Shortcut shown to the user for screenshots (bound by the desktop to `shotdrop --screenshot`)
    pub screenshot_hotkey: String,
    /// Shortcut shown to the user for recording (bound by the desktop to `shotdrop --toggle-recording`)
    pub record_hotkey: String,
    /// Whether to show desktop notifications
    pub notification_enabled: bool,
    /// Recording framerate
    pub video_framerate: u32,
    /// Video container format
    pub video_container: Container,
    /// Explicit encoder binary (None = look up `ffmpeg` on PATH)
    pub encoder_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            max_file_size_mb: 64,
            size_margin_mb: 1,
            screenshot_hotkey: "<alt>+<print_screen>".to_string(),
            record_hotkey: "<ctrl>+<alt>+<print_screen>".to_string(),
            notification_enabled: true,
            video_framerate: 30,
            video_container: Container::Mp4,
            encoder_path: None,
        }
    }
}

impl AppConfig {
    /// Directory name under the platform config dir
    pub const ID: &'static str = "shotdrop";

    /// Upload ceiling in bytes, at least 1 MiB
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.max(1).saturating_mul(MIB)
    }

    /// Size at which a recording is stopped automatically, in bytes
    ///
    /// The margin is capped at half the ceiling.
    pub fn recording_size_limit(&self) -> u64 {
        let ceiling = self.max_file_size_bytes();
        let margin = self.size_margin_mb.saturating_mul(MIB).min(ceiling / 2);
        ceiling - margin
    }

    /// Path of the config file, if the platform has a config dir
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("Could not resolve a config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))
            .and_then(|json| serde_json::from_str(&json).context("Failed to parse config file"))
        {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Error loading config, using defaults: {:#}", err);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload_url, DEFAULT_UPLOAD_URL);
        assert_eq!(config.video_framerate, 30);
        assert_eq!(config.video_container.extension(), "mp4");
        assert!(config.notification_enabled);
    }

    #[test]
    fn test_size_limit_leaves_one_mib_margin() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size_bytes(), 64 * MIB);
        assert_eq!(config.recording_size_limit(), 63 * MIB);
        assert_eq!(
            config.max_file_size_bytes() - config.recording_size_limit(),
            MIB
        );
    }

    #[test]
    fn test_huge_sizes_saturate() {
        let config = AppConfig {
            max_file_size_mb: u64::MAX,
            size_margin_mb: u64::MAX,
            ..AppConfig::default()
        };
        assert_eq!(config.max_file_size_bytes(), u64::MAX);
        assert_eq!(config.recording_size_limit(), u64::MAX - u64::MAX / 2);
    }

    #[test]
    fn test_margin_never_swallows_the_ceiling() {
        let config = AppConfig {
            max_file_size_mb: 2,
            size_margin_mb: 5,
            ..AppConfig::default()
        };
        assert_eq!(config.recording_size_limit(), MIB);

        let zero = AppConfig {
            max_file_size_mb: 0,
            size_margin_mb: 0,
            ..AppConfig::default()
        };
        assert_eq!(zero.max_file_size_bytes(), MIB);
        assert_eq!(zero.recording_size_limit(), MIB);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"video_framerate": 60, "video_container": "mkv"}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.video_framerate, 60);
        assert_eq!(config.video_container, Container::Mkv);
        assert_eq!(config.upload_url, DEFAULT_UPLOAD_URL);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            notification_enabled: false,
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path), config);
    }
}
