//! Runs one conversion at a time against a chosen backend.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver};

use super::backend::{CancelToken, TranscodeBackend};
use super::error::ConvertError;
use super::request::{ConversionOutcome, ConversionProgress, ConversionRequest};

/// Coordinates conversions: checks preconditions, runs the backend, keeps
/// progress monotonic and delivers exactly one outcome per request.
///
/// Conversions on one coordinator never overlap; a second call waits for the
/// first to finish.
pub struct TranscodeCoordinator {
    backend: Box<dyn TranscodeBackend>,
    active: Mutex<()>,
}

impl TranscodeCoordinator {
    pub fn new(backend: impl TranscodeBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn TranscodeBackend>) -> Self {
        Self {
            backend,
            active: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Convert a file, blocking until the backend is done.
    ///
    /// `on_progress` sees non-decreasing values ending in 1.0 on success;
    /// `on_complete` is called exactly once, after the last progress update.
    pub fn convert<P, C>(&self, request: ConversionRequest, on_progress: P, on_complete: C)
    where
        P: FnMut(ConversionProgress),
        C: FnOnce(ConversionOutcome),
    {
        self.convert_with_cancel(request, &CancelToken::new(), on_progress, on_complete);
    }

    /// Same as [`convert`](Self::convert), stoppable through `cancel`.
    pub fn convert_with_cancel<P, C>(
        &self,
        request: ConversionRequest,
        cancel: &CancelToken,
        mut on_progress: P,
        on_complete: C,
    ) where
        P: FnMut(ConversionProgress),
        C: FnOnce(ConversionOutcome),
    {
        let outcome = ConversionOutcome::from(self.run(&request, cancel, &mut on_progress));
        on_complete(outcome);
    }

    fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ConversionProgress),
    ) -> Result<(), ConvertError> {
        let _active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let started_at = Instant::now();

        tracing::info!(
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            backend = self.backend.name(),
            "Starting conversion"
        );

        let result = self.run_locked(request, cancel, on_progress);

        match &result {
            Ok(()) => tracing::info!(
                output = %request.output_path.display(),
                elapsed_secs = started_at.elapsed().as_secs_f64(),
                "Conversion complete"
            ),
            Err(e) => tracing::warn!(
                input = %request.input_path.display(),
                exit_code = ?e.exit_code(),
                error = %e,
                "Conversion failed"
            ),
        }
        result
    }

    fn run_locked(
        &self,
        request: &ConversionRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ConversionProgress),
    ) -> Result<(), ConvertError> {
        request.prepare()?;
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let mut monitor = ProgressMonitor::default();
        self.backend
            .transcode(request, &mut |p| monitor.report(p, on_progress), cancel)?;
        monitor.finish(on_progress);
        Ok(())
    }

    /// Run a conversion on a background thread.
    ///
    /// Progress and the outcome arrive as [`ConversionEvent`]s on the
    /// returned handle.
    pub fn spawn(self: &Arc<Self>, request: ConversionRequest) -> ConversionHandle {
        let (event_tx, events) = unbounded::<ConversionEvent>();
        let cancel = CancelToken::new();

        let coordinator = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let worker_tx = event_tx.clone();
        let spawned = thread::Builder::new()
            .name("transcode".to_string())
            .spawn(move || {
                coordinator.convert_with_cancel(
                    request,
                    &worker_cancel,
                    |p| {
                        let _ = worker_tx.send(ConversionEvent::Progress(p));
                    },
                    |outcome| {
                        let _ = worker_tx.send(ConversionEvent::Finished(outcome));
                    },
                );
            });

        let worker = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                let _ = event_tx.send(ConversionEvent::Finished(ConversionOutcome::Failure(
                    ConvertError::ProcessLaunchFailed(format!("failed to start worker: {}", e)),
                )));
                None
            }
        };

        ConversionHandle {
            events,
            cancel,
            worker,
        }
    }
}

/// Drops regressions and repeats, and makes sure 1.0 is reported last.
#[derive(Debug, Default)]
struct ProgressMonitor {
    last: Option<ConversionProgress>,
}

impl ProgressMonitor {
    fn report(&mut self, progress: ConversionProgress, sink: &mut dyn FnMut(ConversionProgress)) {
        if self.last.map_or(true, |last| progress > last) {
            self.last = Some(progress);
            sink(progress);
        }
    }

    fn finish(&mut self, sink: &mut dyn FnMut(ConversionProgress)) {
        self.report(ConversionProgress::COMPLETE, sink);
    }
}

/// Message from a background conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    Progress(ConversionProgress),
    /// Always the last event for a conversion.
    Finished(ConversionOutcome),
}

/// Handle to a conversion started with [`TranscodeCoordinator::spawn`].
///
/// Dropping the handle cancels a conversion that is still running.
pub struct ConversionHandle {
    events: Receiver<ConversionEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl ConversionHandle {
    /// Ask the conversion to stop. It finishes with a cancelled failure.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Poll for events (non-blocking).
    pub fn poll_events(&self) -> Vec<ConversionEvent> {
        self.events.try_iter().collect()
    }

    /// Raw event channel, for `select!` or blocking reads.
    pub fn events(&self) -> &Receiver<ConversionEvent> {
        &self.events
    }

    /// Block until the outcome arrives.
    pub fn wait(mut self) -> ConversionOutcome {
        let outcome = loop {
            match self.events.recv() {
                Ok(ConversionEvent::Finished(outcome)) => break outcome,
                Ok(ConversionEvent::Progress(_)) => {}
                Err(_) => {
                    break ConversionOutcome::Failure(ConvertError::ProcessLaunchFailed(
                        "conversion worker stopped unexpectedly".to_string(),
                    ))
                }
            }
        };
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        outcome
    }
}

impl Drop for ConversionHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.cancel();
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::export::scripted::ScriptedFactory;
    use crate::converter::export::{ExportSessionBackend, ExportStatus};
    use std::cell::RefCell;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn export_coordinator(factory: ScriptedFactory) -> TranscodeCoordinator {
        TranscodeCoordinator::new(
            ExportSessionBackend::new(factory).with_poll_interval(Duration::from_millis(1)),
        )
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Progress(f64),
        Done(ConversionOutcome),
    }

    fn collect(coordinator: &TranscodeCoordinator, request: ConversionRequest) -> Vec<Seen> {
        let seen = RefCell::new(Vec::new());
        coordinator.convert(
            request,
            |p| seen.borrow_mut().push(Seen::Progress(p.fraction())),
            |outcome| seen.borrow_mut().push(Seen::Done(outcome)),
        );
        seen.into_inner()
    }

    fn input_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let input = dir.path().join("clip.mov");
        fs::write(&input, b"mov").unwrap();
        input
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(vec![
            (0.2, ExportStatus::Exporting),
            (0.1, ExportStatus::Exporting),
            (0.6, ExportStatus::Exporting),
            (0.6, ExportStatus::Exporting),
            (0.9, ExportStatus::Completed),
        ]);
        let coordinator = export_coordinator(factory);
        let request = ConversionRequest::new(input_file(&dir), dir.path().join("clip.mp4"));

        let seen = collect(&coordinator, request);
        let expected: Vec<Seen> = [0.2f32, 0.6, 0.9]
            .iter()
            .map(|v| Seen::Progress(*v as f64))
            .chain([Seen::Progress(1.0), Seen::Done(ConversionOutcome::Success)])
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_missing_input_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(vec![(1.0, ExportStatus::Completed)]);
        let started = factory.started.clone();
        let coordinator = export_coordinator(factory);
        let missing = dir.path().join("gone.mov");

        let seen = collect(&coordinator, ConversionRequest::new(&missing, dir.path().join("gone.mp4")));
        assert_eq!(
            seen,
            vec![Seen::Done(ConversionOutcome::Failure(ConvertError::InputNotFound(missing)))]
        );
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_outcome_comes_after_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = ScriptedFactory::new(vec![
            (0.4, ExportStatus::Exporting),
            (0.4, ExportStatus::Failed),
        ]);
        factory.error = Some("disk full".to_string());
        let coordinator = export_coordinator(factory);
        let request = ConversionRequest::new(input_file(&dir), dir.path().join("clip.mp4"));

        let seen = collect(&coordinator, request);
        assert_eq!(
            seen,
            vec![
                Seen::Progress(0.4f32 as f64),
                Seen::Done(ConversionOutcome::Failure(ConvertError::PlatformExportFailed(
                    "disk full".to_string()
                ))),
            ]
        );
    }

    /// Backend that records how many jobs overlap.
    struct SlowBackend {
        running: AtomicUsize,
        max_running: Arc<AtomicUsize>,
    }

    impl TranscodeBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn transcode(
            &self,
            _request: &ConversionRequest,
            on_progress: &mut dyn FnMut(ConversionProgress),
            _cancel: &CancelToken,
        ) -> Result<(), ConvertError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            on_progress(ConversionProgress::new(0.5));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_conversions_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir);
        let max_running = Arc::new(AtomicUsize::new(0));
        let backend = SlowBackend {
            running: AtomicUsize::new(0),
            max_running: Arc::clone(&max_running),
        };
        let coordinator = Arc::new(TranscodeCoordinator::new(backend));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                coordinator.spawn(ConversionRequest::new(
                    &input,
                    dir.path().join(format!("out{}.mp4", i)),
                ))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.wait(), ConversionOutcome::Success);
        }
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_delivers_events_then_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(vec![
            (0.5, ExportStatus::Exporting),
            (1.0, ExportStatus::Completed),
        ]);
        let coordinator = Arc::new(export_coordinator(factory));
        let handle = coordinator.spawn(ConversionRequest::new(
            input_file(&dir),
            dir.path().join("clip.mp4"),
        ));

        let events: Vec<ConversionEvent> = handle.events().iter().collect();
        assert_eq!(
            events,
            vec![
                ConversionEvent::Progress(ConversionProgress::new(0.5)),
                ConversionEvent::Progress(ConversionProgress::COMPLETE),
                ConversionEvent::Finished(ConversionOutcome::Success),
            ]
        );
    }

    #[test]
    fn test_handle_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new(vec![(0.1, ExportStatus::Exporting)]);
        let coordinator = Arc::new(export_coordinator(factory));
        let handle = coordinator.spawn(ConversionRequest::new(
            input_file(&dir),
            dir.path().join("clip.mp4"),
        ));

        handle.cancel();
        let outcome = handle.wait();
        assert_eq!(outcome, ConversionOutcome::Failure(ConvertError::Cancelled));
        assert_eq!(outcome.message().as_deref(), Some("Conversion was cancelled"));
    }
}
