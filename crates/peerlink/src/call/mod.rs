//! Media call management
//!
//! Handles the single live audio/video call, including the accept/reject gate
//! for inbound offers.

mod media_call;

pub use media_call::{CallDecider, CallDirection, CallState, IncomingCall, MediaCall, MediaCallManager};
