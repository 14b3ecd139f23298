//! Conversion requests, outcomes and the path rules around them.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::ConvertError;

/// Extension accepted from drops and dialogs.
pub const INPUT_EXTENSION: &str = "mov";

/// Extension every output file gets.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// File name offered when no input has been chosen yet.
const FALLBACK_FILE_NAME: &str = "converted.mp4";

/// A single MOV -> MP4 conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl ConversionRequest {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
        }
    }

    /// Build a request that writes `<output_dir>/<stem>.mp4`.
    ///
    /// The input must carry the MOV extension.
    pub fn into_dir(input_path: PathBuf, output_dir: &Path) -> Result<Self, ConvertError> {
        validate_input(&input_path)?;
        let output_path = output_path_for(&input_path, output_dir);
        Ok(Self::new(input_path, output_path))
    }

    /// Check and prepare the file system before anything is spawned.
    ///
    /// Fails if the input is missing, the output directory cannot be created,
    /// or a stale output file cannot be removed.
    pub fn prepare(&self) -> Result<(), ConvertError> {
        if !self.input_path.is_file() {
            return Err(ConvertError::InputNotFound(self.input_path.clone()));
        }

        if let Some(dir) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !dir.is_dir() {
                fs::create_dir_all(dir).map_err(|e| ConvertError::OutputDirectoryUnavailable {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?;
                tracing::debug!(dir = %dir.display(), "Created output directory");
            }
        }

        if self.output_path.exists() {
            if self.writes_over_input() {
                return Err(ConvertError::OutputOverwriteFailed {
                    path: self.output_path.clone(),
                    reason: "output is the input file".to_string(),
                });
            }
            fs::remove_file(&self.output_path).map_err(|e| ConvertError::OutputOverwriteFailed {
                path: self.output_path.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!(output = %self.output_path.display(), "Removed stale output file");
        }

        Ok(())
    }

    fn writes_over_input(&self) -> bool {
        match (
            fs::canonicalize(&self.input_path),
            fs::canonicalize(&self.output_path),
        ) {
            (Ok(input), Ok(output)) => input == output,
            _ => false,
        }
    }

    /// Input file name for display.
    pub fn input_filename(&self) -> String {
        self.input_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Fraction of a conversion that has completed, always within `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ConversionProgress(f64);

impl ConversionProgress {
    pub const COMPLETE: ConversionProgress = ConversionProgress(1.0);

    pub fn new(fraction: f64) -> Self {
        if fraction.is_nan() {
            return Self(0.0);
        }
        Self(fraction.clamp(0.0, 1.0))
    }

    pub fn fraction(&self) -> f64 {
        self.0
    }

    /// Whole percent, for labels.
    pub fn percent(&self) -> u32 {
        (self.0 * 100.0).floor() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.0 >= 1.0
    }
}

/// Terminal result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Success,
    Failure(ConvertError),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success)
    }

    /// Diagnostic text for a failure.
    pub fn message(&self) -> Option<String> {
        match self {
            ConversionOutcome::Success => None,
            ConversionOutcome::Failure(e) => Some(e.to_string()),
        }
    }

    /// Encoder exit code for a failure, where one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ConversionOutcome::Success => None,
            ConversionOutcome::Failure(e) => e.exit_code(),
        }
    }
}

impl From<Result<(), ConvertError>> for ConversionOutcome {
    fn from(result: Result<(), ConvertError>) -> Self {
        match result {
            Ok(()) => ConversionOutcome::Success,
            Err(e) => ConversionOutcome::Failure(e),
        }
    }
}

/// Check if a path carries the MOV extension (case-insensitive).
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false)
}

/// Reject anything that is not a MOV file.
pub fn validate_input(path: &Path) -> Result<(), ConvertError> {
    if is_supported_input(path) {
        Ok(())
    } else {
        Err(ConvertError::UnsupportedInputType(path.to_path_buf()))
    }
}

/// Generate `<output_dir>/<stem>.mp4` for an input file.
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(suggested_file_name(Some(input)))
}

/// File name offered by the save dialog.
pub fn suggested_file_name(input: Option<&Path>) -> String {
    input
        .and_then(|p| p.file_stem())
        .map(|stem| format!("{}.{}", stem.to_string_lossy(), OUTPUT_EXTENSION))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Force the MP4 extension onto a chosen output path.
pub fn with_mp4_extension(path: PathBuf) -> PathBuf {
    let already_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(OUTPUT_EXTENSION))
        .unwrap_or(false);
    if already_mp4 {
        path
    } else {
        path.with_extension(OUTPUT_EXTENSION)
    }
}
