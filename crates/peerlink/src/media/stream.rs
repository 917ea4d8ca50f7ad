//! Media stream handles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Tracks requested from the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture a video track
    pub video: bool,
    /// Capture an audio track
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl MediaConstraints {
    /// Audio without video
    pub fn audio_only() -> Self {
        Self {
            video: false,
            audio: true,
        }
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Microphone / remote audio
    Audio,
    /// Camera / remote video
    Video,
}

/// One live audio or video track
pub struct MediaTrack {
    kind: TrackKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether the track still holds its device / network resources
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track; returns true if it was live
    pub fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }
}

/// An audio/video stream
///
/// Dropping the stream stops all of its tracks.
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Create a live stream carrying the requested tracks
    pub fn new(constraints: MediaConstraints) -> Self {
        let mut tracks = Vec::with_capacity(2);
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks of this stream
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Whether the stream carries audio
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    /// Whether the stream carries video
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }

    /// Track layout of this stream
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: self.has_video(),
            audio: self.has_audio(),
        }
    }

    /// Descriptor handed to the presentation layer
    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id.clone(),
            audio: self.has_audio(),
            video: self.has_video(),
        }
    }

    /// Whether any track is still live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track
    pub fn stop(&self) {
        let stopped = self.tracks.iter().filter(|t| t.stop()).count();
        if stopped > 0 {
            debug!("Stopped {} track(s) of stream {}", stopped, self.id);
        }
    }

    /// Read-only view of track liveness that outlives the stream
    pub fn monitor(&self) -> StreamMonitor {
        StreamMonitor {
            flags: self.tracks.iter().map(|t| Arc::clone(&t.live)).collect(),
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("audio", &self.has_audio())
            .field("video", &self.has_video())
            .field("live", &self.is_live())
            .finish()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Presentation-side description of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream identifier
    pub id: String,
    /// Carries audio
    pub audio: bool,
    /// Carries video
    pub video: bool,
}

/// Observes whether a stream's tracks were released
#[derive(Debug, Clone)]
pub struct StreamMonitor {
    flags: Vec<Arc<AtomicBool>>,
}

impl StreamMonitor {
    /// True once every track has been stopped
    pub fn is_released(&self) -> bool {
        self.flags.iter().all(|f| !f.load(Ordering::SeqCst))
    }
}
