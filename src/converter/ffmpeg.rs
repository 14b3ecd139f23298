//! FFmpeg process backend.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;

use super::backend::{CancelToken, Deadline, TranscodeBackend};
use super::error::ConvertError;
use super::formats::EncoderSettings;
use super::progress::ProgressParser;
use super::request::{ConversionProgress, ConversionRequest};

/// How often the supervisor checks for exit, cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs conversions through an FFmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    /// Path to FFmpeg binary
    ffmpeg_path: PathBuf,
    /// Path to FFprobe binary (for duration lookup)
    ffprobe_path: Option<PathBuf>,
    settings: EncoderSettings,
    timeout: Option<Duration>,
}

impl FfmpegBackend {
    /// Create a backend, searching for the binaries.
    ///
    /// `configured` is an explicit FFmpeg path from the preferences; it wins
    /// over the search when it points at a file.
    pub fn locate(configured: Option<&Path>) -> Result<Self, ConvertError> {
        let ffmpeg_path = find_ffmpeg(configured)?;
        let ffprobe_path = find_ffprobe(&ffmpeg_path);
        tracing::info!(
            ffmpeg = %ffmpeg_path.display(),
            ffprobe = ?ffprobe_path,
            "Located FFmpeg"
        );

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            settings: EncoderSettings::default(),
            timeout: None,
        })
    }

    /// Use a specific FFmpeg binary without searching. No FFprobe is used.
    pub fn with_path(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: None,
            settings: EncoderSettings::default(),
            timeout: None,
        }
    }

    pub fn with_ffprobe(mut self, ffprobe_path: Option<PathBuf>) -> Self {
        self.ffprobe_path = ffprobe_path;
        self
    }

    pub fn with_settings(mut self, settings: EncoderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Build the FFmpeg invocation for a request. The output path is the
    /// final positional argument.
    pub fn build_command(&self, request: &ConversionRequest) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-i")
            .arg(&request.input_path)
            .args(self.settings.ffmpeg_args())
            .args([
                "-y",                   // Overwrite output
                "-progress", "pipe:1",  // Progress to stdout
            ])
            .arg(&request.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Ask FFprobe for the container duration in seconds.
    ///
    /// A probe that fails only costs progress reporting, so it yields `None`.
    /// Cancellation and the deadline still apply while it runs.
    fn probe_duration(
        &self,
        input: &Path,
        cancel: &CancelToken,
        deadline: &Option<Deadline>,
    ) -> Result<Option<f64>, ConvertError> {
        let Some(ffprobe) = self.ffprobe_path.as_ref() else {
            return Ok(None);
        };

        let spawned = Command::new(ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to run FFprobe");
                return Ok(None);
            }
        };
        let reader = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut json = String::new();
                let _ = out.read_to_string(&mut json);
                json
            })
        });

        let waited = wait_bounded(&mut child, cancel, deadline);
        if waited.is_err() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let json = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match waited? {
            Some(status) if status.success() => Ok(parse_probe_duration(&json)),
            Some(status) => {
                tracing::warn!(code = ?status.code(), "FFprobe could not read input");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Wait for the child while forwarding progress.
    fn supervise(
        &self,
        child: &mut Child,
        progress_rx: &Receiver<ConversionProgress>,
        on_progress: &mut dyn FnMut(ConversionProgress),
        cancel: &CancelToken,
        deadline: &Option<Deadline>,
    ) -> Result<ExitStatus, ConvertError> {
        let mut stream_open = true;

        loop {
            if stream_open {
                match progress_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(progress) => on_progress(progress),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => stream_open = false,
                }
            } else {
                thread::sleep(POLL_INTERVAL);
            }

            if cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }
            Deadline::check(deadline)?;

            let status = child.try_wait().map_err(|e| {
                ConvertError::ProcessLaunchFailed(format!("failed to wait for FFmpeg: {}", e))
            })?;
            if let Some(status) = status {
                return Ok(status);
            }
        }
    }
}

impl TranscodeBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn transcode(
        &self,
        request: &ConversionRequest,
        on_progress: &mut dyn FnMut(ConversionProgress),
        cancel: &CancelToken,
    ) -> Result<(), ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let deadline = Deadline::start(self.timeout);

        let parser = match self.probe_duration(&request.input_path, cancel, &deadline)? {
            Some(duration) => {
                tracing::debug!(duration, "Probed input duration");
                ProgressParser::with_duration(duration)
            }
            None => ProgressParser::new(),
        };

        let mut cmd = self.build_command(request);
        tracing::debug!(command = ?cmd, "Spawning FFmpeg");

        let mut child = cmd
            .spawn()
            .map_err(|e| ConvertError::ProcessLaunchFailed(e.to_string()))?;
        let readers = StreamReaders::attach(&mut child, parser);

        let result =
            self.supervise(&mut child, &readers.progress_rx, on_progress, cancel, &deadline);
        if result.is_err() {
            let _ = child.kill();
            let _ = child.wait();
        }

        // Readers are joined on every path, including cancellation.
        let (pending, stderr) = readers.detach();
        let status = result?;

        for progress in pending {
            on_progress(progress);
        }

        if status.success() {
            Ok(())
        } else {
            Err(ConvertError::ProcessNonZeroExit {
                code: status.code(),
                message: stderr.trim().to_string(),
            })
        }
    }
}

/// The one reader per child stream.
struct StreamReaders {
    progress_rx: Receiver<ConversionProgress>,
    stdout: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
}

impl StreamReaders {
    fn attach(child: &mut Child, parser: ProgressParser) -> Self {
        let (progress_tx, progress_rx) = unbounded();
        let stdout = child
            .stdout
            .take()
            .map(|out| thread::spawn(move || pump_progress(out, parser, progress_tx)));
        let stderr = child
            .stderr
            .take()
            .map(|err| thread::spawn(move || collect_stderr(err)));

        Self {
            progress_rx,
            stdout,
            stderr,
        }
    }

    /// Join both readers. Returns progress still queued and the stderr text.
    fn detach(mut self) -> (Vec<ConversionProgress>, String) {
        if let Some(handle) = self.stdout.take() {
            let _ = handle.join();
        }
        let pending = self.progress_rx.try_iter().collect();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        (pending, stderr)
    }
}

/// Poll a child until it exits, giving up on cancellation or the deadline.
///
/// `Ok(None)` means the exit status could not be read.
fn wait_bounded(
    child: &mut Child,
    cancel: &CancelToken,
    deadline: &Option<Deadline>,
) -> Result<Option<ExitStatus>, ConvertError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to wait for FFprobe");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
        }
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        Deadline::check(deadline)?;
        thread::sleep(POLL_INTERVAL);
    }
}

fn pump_progress(mut stdout: ChildStdout, mut parser: ProgressParser, tx: Sender<ConversionProgress>) {
    let mut buf = [0u8; 4096];
    let mut pending = Vec::new();

    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                if let Some(records) = take_complete_records(&mut pending) {
                    for progress in parser.feed_chunk(&records) {
                        let _ = tx.send(progress);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "Progress stream read failed");
                break;
            }
        }
    }

    // Last record may lack a delimiter
    for progress in parser.feed_chunk(&String::from_utf8_lossy(&pending)) {
        let _ = tx.send(progress);
    }
}

/// Split off every record that has seen its `\n` or `\r` terminator.
fn take_complete_records(pending: &mut Vec<u8>) -> Option<String> {
    let end = pending.iter().rposition(|b| matches!(b, b'\n' | b'\r'))?;
    let complete: Vec<u8> = pending.drain(..=end).collect();
    Some(String::from_utf8_lossy(&complete).into_owned())
}

fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut bytes) {
        tracing::warn!(error = %e, "Error stream read failed");
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Pull `format.duration` out of `ffprobe -print_format json -show_format`.
fn parse_probe_duration(json: &str) -> Option<f64> {
    let probe: ProbeOutput = serde_json::from_str(json).ok()?;
    let duration = probe.format?.duration?.trim().parse::<f64>().ok()?;
    (duration.is_finite() && duration > 0.0).then_some(duration)
}

/// Find FFmpeg binary in various locations.
fn find_ffmpeg(configured: Option<&Path>) -> Result<PathBuf, ConvertError> {
    // 1. Explicit path from preferences
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "Configured FFmpeg path does not exist, searching");
    }

    // 2. Check system PATH using which crate
    if let Ok(path) = which::which("ffmpeg") {
        return Ok(path);
    }

    // 3. Check common install locations
    common_locations("ffmpeg")
        .into_iter()
        .find(|p| p.is_file())
        .ok_or(ConvertError::EncoderNotFound)
}

/// Find FFprobe, preferring the one next to FFmpeg.
fn find_ffprobe(ffmpeg_path: &Path) -> Option<PathBuf> {
    let sibling = ffmpeg_path.with_file_name(if cfg!(target_os = "windows") {
        "ffprobe.exe"
    } else {
        "ffprobe"
    });
    if sibling.is_file() {
        return Some(sibling);
    }

    if let Ok(path) = which::which("ffprobe") {
        return Some(path);
    }

    common_locations("ffprobe").into_iter().find(|p| p.is_file())
}

fn common_locations(binary: &str) -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "macos") {
        &["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
    } else if cfg!(target_os = "windows") {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else {
        &["/usr/bin", "/usr/local/bin"]
    };
    let file_name = if cfg!(target_os = "windows") {
        format!("{}.exe", binary)
    } else {
        binary.to_string()
    };

    dirs.iter().map(|d| Path::new(d).join(&file_name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_build_command() {
        let backend = FfmpegBackend::with_path("/opt/ffmpeg");
        let request = ConversionRequest::new("/videos/in.mov", "/out/in.mp4");
        let cmd = backend.build_command(&request);

        assert_eq!(cmd.get_program(), OsStr::new("/opt/ffmpeg"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        let expected = [
            "-hide_banner", "-i", "/videos/in.mov", "-c:v", "h264", "-crf", "23", "-preset",
            "medium", "-c:a", "aac", "-b:a", "128k", "-y", "-progress", "pipe:1", "/out/in.mp4",
        ];
        assert_eq!(args, expected.iter().map(OsStr::new).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_probe_duration() {
        let json = r#"{"format": {"filename": "in.mov", "duration": "12.480000", "size": "100"}}"#;
        assert_eq!(parse_probe_duration(json), Some(12.48));
        assert_eq!(parse_probe_duration(r#"{"format": {"duration": "N/A"}}"#), None);
        assert_eq!(parse_probe_duration(r#"{"streams": []}"#), None);
        assert_eq!(parse_probe_duration("not json"), None);
    }

    #[test]
    fn test_partial_record_is_held_back() {
        let mut pending = b"duration=10\rout_time_ms=50".to_vec();
        assert_eq!(take_complete_records(&mut pending).as_deref(), Some("duration=10\r"));
        assert_eq!(pending, b"out_time_ms=50");

        assert_eq!(take_complete_records(&mut pending), None);
        pending.extend_from_slice(b"00000\nprogress=continue\r");
        assert_eq!(
            take_complete_records(&mut pending).as_deref(),
            Some("out_time_ms=5000000\nprogress=continue\r")
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn test_configured_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("my-ffmpeg");
        std::fs::write(&binary, b"").unwrap();
        assert_eq!(find_ffmpeg(Some(&binary)).unwrap(), binary);
    }
}
