//! The capability every transcoding backend provides.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ConvertError;
use super::request::{ConversionProgress, ConversionRequest};

/// A way of turning a prepared request into an MP4.
///
/// Implementations block until the job is finished and report progress
/// through `on_progress` from the calling thread. The coordinator has already
/// checked the input and cleared the output path before `transcode` runs.
pub trait TranscodeBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn transcode(
        &self,
        request: &ConversionRequest,
        on_progress: &mut dyn FnMut(ConversionProgress),
        cancel: &CancelToken,
    ) -> Result<(), ConvertError>;
}

/// Shared flag used to ask a running conversion to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Wall-clock bound on a single job.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    limit: Duration,
    expires_at: Instant,
}

impl Deadline {
    pub(crate) fn start(limit: Option<Duration>) -> Option<Self> {
        limit.map(|limit| Self {
            limit,
            expires_at: Instant::now() + limit,
        })
    }

    pub(crate) fn check(deadline: &Option<Self>) -> Result<(), ConvertError> {
        match deadline {
            Some(d) if Instant::now() >= d.expires_at => Err(ConvertError::TimedOut(d.limit)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::check(&Deadline::start(None)).is_ok());
        assert!(Deadline::check(&Deadline::start(Some(Duration::from_secs(60)))).is_ok());
        assert_eq!(
            Deadline::check(&Deadline::start(Some(Duration::ZERO))),
            Err(ConvertError::TimedOut(Duration::ZERO))
        );
    }
}
