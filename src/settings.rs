//! Application preferences.
//!
//! Stored as JSON in the platform config directory. The default output folder
//! lives here and is passed into each request explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::converter::{ConvertError, EncoderSettings, FfmpegBackend};

/// User preferences persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Folder converted files go to when none is chosen per file
    #[serde(rename = "defaultOutputDir", skip_serializing_if = "Option::is_none")]
    pub default_output_dir: Option<PathBuf>,

    /// Explicit FFmpeg binary, overriding the search
    #[serde(rename = "ffmpegPath", skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Encoding parameters
    pub encoder: EncoderSettings,

    /// Upper bound on a single conversion, in seconds
    #[serde(rename = "timeoutSecs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Preferences {
    /// Get the preferences file path
    fn get_prefs_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("MovConverter");
            p.push("preferences.json");
            p
        })
    }

    /// Load preferences from config directory
    pub fn load() -> Self {
        match Self::get_prefs_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load preferences from a file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable preferences");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save preferences to config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::get_prefs_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "Saved preferences");
        Ok(())
    }

    pub fn set_default_output_dir(&mut self, path: PathBuf) {
        self.default_output_dir = Some(path);
    }

    /// Get the default output directory if it still exists
    pub fn default_output_dir(&self) -> Option<&Path> {
        self.default_output_dir.as_deref().filter(|p| p.is_dir())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Locate FFmpeg and configure a backend from these preferences.
    pub fn ffmpeg_backend(&self) -> Result<FfmpegBackend, ConvertError> {
        Ok(FfmpegBackend::locate(self.ffmpeg_path.as_deref())?
            .with_settings(self.encoder.clone())
            .with_timeout(self.timeout()))
    }
}

/// Settings-related errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
}
