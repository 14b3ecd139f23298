//! MOV Converter - QuickTime to MP4 conversion
//!
//! The conversion core lives in [`converter`]; [`app`] is the desktop window
//! built on top of it.

pub mod app;
pub mod converter;
pub mod settings;
pub mod telemetry;

pub use converter::{
    ConversionOutcome, ConversionProgress, ConversionRequest, ConvertError, TranscodeCoordinator,
};
pub use app::ConverterApp;
pub use settings::Preferences;
