//! Local and remote media streams
//!
//! Streams are owned by the live media call; the presentation layer only sees
//! [`StreamInfo`] descriptors.

pub mod capture;
pub mod stream;

pub use capture::{MediaCapture, SyntheticCapture};
pub use stream::{MediaConstraints, MediaStream, MediaTrack, StreamInfo, StreamMonitor, TrackKind};
