//! Parser for FFmpeg's `-progress` output.
//!
//! The stream is a sequence of `key=value` records separated by `\n` or `\r`.
//! Only three keys matter:
//!
//! - `duration`: total media length in seconds, read once
//! - `out_time_ms`: current output position in microseconds (despite the name)
//! - `progress`: `continue` while running, `end` once the encoder is done
//!
//! Everything else is noise and is skipped.

use super::request::ConversionProgress;

/// Stateful progress-stream parser for one conversion.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration_seconds: Option<f64>,
    finished: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a duration that was obtained some other way (e.g. ffprobe).
    pub fn with_duration(duration_seconds: f64) -> Self {
        let mut parser = Self::default();
        parser.set_duration(duration_seconds);
        parser
    }

    /// Total duration, once known.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    /// Whether `progress=end` has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn set_duration(&mut self, seconds: f64) {
        if self.duration_seconds.is_none() && seconds.is_finite() && seconds > 0.0 {
            self.duration_seconds = Some(seconds);
        }
    }

    /// Parse one record. Returns the progress it implies, if any.
    pub fn feed_line(&mut self, line: &str) -> Option<ConversionProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "duration" => {
                if let Ok(seconds) = value.parse::<f64>() {
                    self.set_duration(seconds);
                }
                None
            }
            "out_time_ms" => {
                let micros = value.parse::<f64>().ok()?;
                let duration = self.duration_seconds?;
                let seconds = micros / 1_000_000.0;
                Some(ConversionProgress::new((seconds / duration).min(1.0)))
            }
            "progress" => {
                if value == "end" {
                    self.finished = true;
                    Some(ConversionProgress::COMPLETE)
                } else {
                    None
                }
            }
            other => {
                tracing::trace!(key = other, "Ignoring progress key");
                None
            }
        }
    }

    /// Parse a chunk that may hold several records.
    pub fn feed_chunk(&mut self, chunk: &str) -> Vec<ConversionProgress> {
        chunk
            .split(['\n', '\r'])
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| self.feed_line(line))
            .collect()
    }
}
