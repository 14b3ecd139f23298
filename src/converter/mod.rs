//! MOV to MP4 Converter Module
//!
//! Converts QuickTime movies to MP4, either through the FFmpeg CLI or a
//! platform export session.

mod backend;
mod coordinator;
mod error;
pub(crate) mod export;
mod ffmpeg;
mod formats;
mod progress;
mod request;

pub use backend::{CancelToken, TranscodeBackend};
pub use coordinator::{ConversionEvent, ConversionHandle, TranscodeCoordinator};
pub use error::ConvertError;
pub use export::{
    ExportOptions, ExportPreset, ExportSession, ExportSessionBackend, ExportSessionFactory,
    ExportStatus, OutputFileType,
};
pub use ffmpeg::FfmpegBackend;
pub use formats::{EncoderSettings, SpeedPreset};
pub use progress::ProgressParser;
pub use request::{
    is_supported_input, output_path_for, suggested_file_name, validate_input, with_mp4_extension,
    ConversionOutcome, ConversionProgress, ConversionRequest,
};
