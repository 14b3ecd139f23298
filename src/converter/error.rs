//! Conversion errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can end a conversion.
///
/// I/O causes are kept as their display text so the error can be cloned into
/// UI state and sent across threads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("Input file not found at {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("Cannot create output directory {}: {reason}", path.display())]
    OutputDirectoryUnavailable { path: PathBuf, reason: String },
    #[error("Cannot overwrite existing output file {}: {reason}", path.display())]
    OutputOverwriteFailed { path: PathBuf, reason: String },
    #[error("FFmpeg binary not found. Please install FFmpeg or set its path in the preferences")]
    EncoderNotFound,
    #[error("Failed to launch FFmpeg: {0}")]
    ProcessLaunchFailed(String),
    #[error("{}", nonzero_exit_message(*code, message))]
    ProcessNonZeroExit { code: Option<i32>, message: String },
    #[error("{0}")]
    PlatformExportFailed(String),
    #[error("Export was cancelled")]
    PlatformExportCancelled,
    #[error("Please select a MOV file ({})", .0.display())]
    UnsupportedInputType(PathBuf),
    #[error("Conversion was cancelled")]
    Cancelled,
    #[error("Conversion timed out after {:.1}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

fn nonzero_exit_message(code: Option<i32>, message: &str) -> String {
    let status = match code {
        Some(code) => format!("FFmpeg exited with code {}", code),
        None => "FFmpeg was terminated by a signal".to_string(),
    };
    if message.is_empty() {
        status
    } else {
        format!("{}: {}", status, message)
    }
}

impl ConvertError {
    /// Short title for the blocking alert shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            ConvertError::InputNotFound(_) => "File Not Found",
            ConvertError::OutputDirectoryUnavailable { .. } => "Output Folder Unavailable",
            ConvertError::OutputOverwriteFailed { .. } => "Cannot Overwrite File",
            ConvertError::EncoderNotFound => "FFmpeg Not Found",
            ConvertError::ProcessLaunchFailed(_) => "Launch Failed",
            ConvertError::ProcessNonZeroExit { .. } => "Conversion Failed",
            ConvertError::PlatformExportFailed(_) => "Export Failed",
            ConvertError::PlatformExportCancelled => "Export Cancelled",
            ConvertError::UnsupportedInputType(_) => "Invalid File",
            ConvertError::Cancelled => "Cancelled",
            ConvertError::TimedOut(_) => "Timed Out",
        }
    }

    /// Exit code of the encoder process, if the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ConvertError::ProcessNonZeroExit { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the conversion ended because someone asked it to stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ConvertError::Cancelled | ConvertError::PlatformExportCancelled)
    }
}
