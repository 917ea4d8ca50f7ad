//! Local media capture boundary

use super::stream::{MediaConstraints, MediaStream};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Local audio/video capture
///
/// Implementations prompt for device access; a refusal is reported as
/// [`Error::MediaAccessDenied`].
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Capture a stream with the requested tracks
    async fn capture(&self, constraints: MediaConstraints) -> Result<MediaStream>;
}

/// Capture that produces synthetic streams without touching devices
///
/// Used by the demo CLI; can be switched to deny access.
#[derive(Debug, Default)]
pub struct SyntheticCapture {
    denied: AtomicBool,
    latency: Duration,
    requests: AtomicUsize,
}

impl SyntheticCapture {
    /// Capture that always grants access
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture that waits `latency` before answering, like a permission prompt
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Grant or deny subsequent requests
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Number of capture requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    async fn capture(&self, constraints: MediaConstraints) -> Result<MediaStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.denied.load(Ordering::SeqCst) {
            warn!("Synthetic capture denied ({:?})", constraints);
            return Err(Error::MediaAccessDenied(
                "permission denied by user".to_string(),
            ));
        }

        if !constraints.audio && !constraints.video {
            return Err(Error::MediaAccessDenied(
                "no audio or video track requested".to_string(),
            ));
        }

        let stream = MediaStream::new(constraints);
        debug!("Synthetic capture produced stream {}", stream.id());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_capture_grants() {
        let capture = SyntheticCapture::new();
        let stream = capture.capture(MediaConstraints::default()).await.unwrap();

        assert!(stream.has_audio() && stream.has_video());
        assert_eq!(capture.request_count(), 1);
    }

    #[tokio::test]
    async fn test_synthetic_capture_denies() {
        let capture = SyntheticCapture::new();
        capture.set_denied(true);

        let result = capture.capture(MediaConstraints::default()).await;
        assert!(matches!(result, Err(Error::MediaAccessDenied(_))));
    }

    #[test]
    fn test_synthetic_capture_needs_a_track() {
        let capture = SyntheticCapture::new();
        let none = MediaConstraints {
            audio: false,
            video: false,
        };

        tokio_test::assert_err!(tokio_test::block_on(capture.capture(none)));
        tokio_test::assert_ok!(tokio_test::block_on(
            capture.capture(MediaConstraints::audio_only())
        ));
        assert_eq!(capture.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_capture_latency() {
        let capture = SyntheticCapture::with_latency(Duration::from_millis(250));
        let started = tokio::time::Instant::now();

        capture.capture(MediaConstraints::audio_only()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
