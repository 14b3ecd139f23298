//! Encoder parameters and speed presets.

use serde::{Deserialize, Serialize};

/// x264 speed/compression trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    /// Fastest encoding, larger files
    Veryfast,
    Fast,
    /// Balanced speed and file size (default)
    #[default]
    Medium,
    /// Best compression, slower encoding
    Slow,
}

impl SpeedPreset {
    /// Returns the value passed to `-preset`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            SpeedPreset::Veryfast => "veryfast",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SpeedPreset::Veryfast => "Very Fast",
            SpeedPreset::Fast => "Fast",
            SpeedPreset::Medium => "Balanced",
            SpeedPreset::Slow => "Quality",
        }
    }

    /// All available presets.
    pub fn all() -> &'static [SpeedPreset] {
        &[
            SpeedPreset::Veryfast,
            SpeedPreset::Fast,
            SpeedPreset::Medium,
            SpeedPreset::Slow,
        ]
    }
}

/// Fixed encoding parameters handed to FFmpeg for every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub video_codec: String,
    /// Constant Rate Factor; lower is better quality
    pub crf: u8,
    pub preset: SpeedPreset,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            crf: 23,
            preset: SpeedPreset::Medium,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl EncoderSettings {
    /// Codec arguments, placed between the input and the output flags.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-preset".to_string(),
            self.preset.ffmpeg_name().to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}
