//! Platform export-session backend.
//!
//! Some platforms ship a native transcoding job (an "export session") instead
//! of an encoder binary. Such a session is started asynchronously, exposes a
//! progress fraction that can be polled, and eventually settles into a
//! terminal status. This module drives any session behind
//! [`ExportSessionFactory`]; the platform binding itself lives with the
//! embedding application.

use std::path::Path;
use std::thread;
use std::time::Duration;

use super::backend::{CancelToken, Deadline, TranscodeBackend};
use super::error::ConvertError;
use super::request::{ConversionProgress, ConversionRequest};

/// Interval between progress polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quality preset requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportPreset {
    #[default]
    HighestQuality,
    MediumQuality,
    LowQuality,
    Passthrough,
}

/// Output container requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFileType {
    #[default]
    Mp4,
}

/// Options handed to the platform when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub preset: ExportPreset,
    pub file_type: OutputFileType,
    pub optimize_for_network_use: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            preset: ExportPreset::HighestQuality,
            file_type: OutputFileType::Mp4,
            optimize_for_network_use: true,
        }
    }
}

/// Status reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Waiting,
    Exporting,
    Completed,
    Failed,
    Cancelled,
    /// Any other platform status, carrying its raw value.
    Other(i64),
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportStatus::Waiting | ExportStatus::Exporting)
    }
}

/// A running platform export.
pub trait ExportSession: Send {
    /// Fraction complete in `0.0..=1.0`.
    fn progress(&self) -> f32;

    fn status(&self) -> ExportStatus;

    /// Platform description of a failure.
    fn error_description(&self) -> Option<String>;

    fn cancel(&mut self);
}

/// Creates and starts platform export sessions.
pub trait ExportSessionFactory: Send + Sync {
    fn start(
        &self,
        input: &Path,
        output: &Path,
        options: &ExportOptions,
    ) -> Result<Box<dyn ExportSession>, ConvertError>;
}

/// Backend that polls a platform export session until it settles.
pub struct ExportSessionBackend<F> {
    factory: F,
    options: ExportOptions,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl<F: ExportSessionFactory> ExportSessionBackend<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            options: ExportOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<F: ExportSessionFactory> TranscodeBackend for ExportSessionBackend<F> {
    fn name(&self) -> &'static str {
        "export-session"
    }

    fn transcode(
        &self,
        request: &ConversionRequest,
        on_progress: &mut dyn FnMut(ConversionProgress),
        cancel: &CancelToken,
    ) -> Result<(), ConvertError> {
        let mut session =
            self.factory
                .start(&request.input_path, &request.output_path, &self.options)?;
        let deadline = Deadline::start(self.timeout);

        let status = loop {
            let status = session.status();
            on_progress(ConversionProgress::new(session.progress() as f64));
            if status.is_terminal() {
                break status;
            }

            if cancel.is_cancelled() {
                session.cancel();
                return Err(ConvertError::Cancelled);
            }
            if let Err(e) = Deadline::check(&deadline) {
                session.cancel();
                return Err(e);
            }

            thread::sleep(self.poll_interval);
        };

        match status {
            ExportStatus::Completed => Ok(()),
            ExportStatus::Failed => Err(ConvertError::PlatformExportFailed(
                session
                    .error_description()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )),
            ExportStatus::Cancelled => Err(ConvertError::PlatformExportCancelled),
            other => {
                tracing::warn!(status = ?other, "Export ended with unexpected status");
                Err(ConvertError::PlatformExportFailed(
                    "Export ended with unknown status".to_string(),
                ))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedFactory;
    use super::*;
    use std::sync::atomic::Ordering;

    fn backend(factory: ScriptedFactory) -> ExportSessionBackend<ScriptedFactory> {
        ExportSessionBackend::new(factory).with_poll_interval(Duration::from_millis(1))
    }

    fn run(backend: &ExportSessionBackend<ScriptedFactory>, cancel: &CancelToken) -> (Vec<f64>, Result<(), ConvertError>) {
        let request = ConversionRequest::new("/in.mov", "/out.mp4");
        let mut seen = Vec::new();
        let result = backend.transcode(&request, &mut |p| seen.push(p.fraction()), cancel);
        (seen, result)
    }

    #[test]
    fn test_completed_session() {
        let factory = ScriptedFactory::new(vec![
            (0.0, ExportStatus::Waiting),
            (0.5, ExportStatus::Exporting),
            (1.0, ExportStatus::Completed),
        ]);
        let (seen, result) = run(&backend(factory), &CancelToken::new());
        assert_eq!(result, Ok(()));
        assert_eq!(seen, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_failed_session_reports_description() {
        let mut factory = ScriptedFactory::new(vec![
            (0.25, ExportStatus::Exporting),
            (0.25, ExportStatus::Failed),
        ]);
        factory.error = Some("The operation could not be completed".to_string());
        let (_, result) = run(&backend(factory), &CancelToken::new());
        assert_eq!(
            result,
            Err(ConvertError::PlatformExportFailed(
                "The operation could not be completed".to_string()
            ))
        );
    }

    #[test]
    fn test_cancelled_and_unknown_status() {
        let factory = ScriptedFactory::new(vec![(0.1, ExportStatus::Cancelled)]);
        let (_, result) = run(&backend(factory), &CancelToken::new());
        assert_eq!(result, Err(ConvertError::PlatformExportCancelled));

        let factory = ScriptedFactory::new(vec![(0.1, ExportStatus::Other(0))]);
        let (_, result) = run(&backend(factory), &CancelToken::new());
        assert_eq!(
            result,
            Err(ConvertError::PlatformExportFailed(
                "Export ended with unknown status".to_string()
            ))
        );
    }

    #[test]
    fn test_user_cancel_cancels_session() {
        let factory = ScriptedFactory::new(vec![(0.3, ExportStatus::Exporting)]);
        let cancelled = factory.cancelled.clone();
        let cancel = CancelToken::new();
        cancel.cancel();

        let (_, result) = run(&backend(factory), &cancel);
        assert_eq!(result, Err(ConvertError::Cancelled));
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_timeout_cancels_session() {
        let factory = ScriptedFactory::new(vec![(0.3, ExportStatus::Exporting)]);
        let cancelled = factory.cancelled.clone();
        let backend = backend(factory).with_timeout(Some(Duration::from_millis(20)));

        let (_, result) = run(&backend, &CancelToken::new());
        assert_eq!(result, Err(ConvertError::TimedOut(Duration::from_millis(20))));
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
