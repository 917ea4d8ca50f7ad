//! Configuration types for the orchestrator

use crate::media::MediaConstraints;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for [`crate::Orchestrator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tracks requested from local media capture (default: audio + video)
    pub media: MediaConstraints,

    /// What to do with a second inbound data channel (default: replace and close)
    pub incoming_channel_policy: IncomingChannelPolicy,

    /// Seconds to wait for the signaling transport to assign an identity
    /// (default: 30, range: 1-300). Applied by callers at the boundary.
    pub identity_timeout_secs: u64,

    /// Rendezvous identity to request instead of a transport-assigned one
    pub preferred_peer_id: Option<String>,
}

/// Handling of an inbound data channel while another one is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingChannelPolicy {
    /// Track the new channel and close the previous one (default)
    #[default]
    ReplaceAndClose,
    /// Keep the current channel and close the new one
    RejectWhileBusy,
}

impl FromStr for IncomingChannelPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "replace" | "replace_and_close" => Ok(Self::ReplaceAndClose),
            "reject" | "reject_while_busy" => Ok(Self::RejectWhileBusy),
            other => Err(format!(
                "unknown channel policy '{}', expected replace_and_close or reject_while_busy",
                other
            )),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            media: MediaConstraints::default(),
            incoming_channel_policy: IncomingChannelPolicy::default(),
            identity_timeout_secs: 30,
            preferred_peer_id: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Identity timeout as a [`Duration`]
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_timeout_secs)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `media` requests neither audio nor video
    /// - `identity_timeout_secs` is not in range 1-300
    /// - `preferred_peer_id` is set but blank
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.media.audio && !self.media.video {
            return Err(Error::InvalidConfig(
                "media must request at least one of audio or video".to_string(),
            ));
        }

        if self.identity_timeout_secs == 0 || self.identity_timeout_secs > 300 {
            return Err(Error::InvalidConfig(format!(
                "identity_timeout_secs must be in range 1-300, got {}",
                self.identity_timeout_secs
            )));
        }

        if let Some(peer_id) = &self.preferred_peer_id {
            if peer_id.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "preferred_peer_id must not be blank".to_string(),
                ));
            }
        }

        Ok(())
    }
}
