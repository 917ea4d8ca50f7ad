//! Message log

use serde::{Deserialize, Serialize};

/// Which side produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Sent from this process
    Local,
    /// Received from the remote peer
    Remote,
}

/// One entry of the message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 1-based position in the log, assigned at append time
    pub sequence: u64,
    /// Producer of the message
    pub origin: Origin,
    /// Message text
    pub payload: String,
}

/// Append-only, ordered message record
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_sequence: u64,
}

impl MessageLog {
    /// Empty log
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Append a message, assigning the next sequence number
    pub fn append(&mut self, origin: Origin, payload: impl Into<String>) -> &Message {
        // Default-constructed logs start at zero
        let sequence = self.next_sequence.max(1);
        self.next_sequence = sequence + 1;

        self.messages.push(Message {
            sequence,
            origin,
            payload: payload.into(),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// All messages in append order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_independent_of_origin() {
        let mut log = MessageLog::new();
        log.append(Origin::Local, "a");
        log.append(Origin::Remote, "b");
        log.append(Origin::Remote, "c");
        log.append(Origin::Local, "d");

        let sequences: Vec<u64> = log.messages().iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(log.messages()[1].origin, Origin::Remote);
    }

    #[test]
    fn test_default_log_starts_at_one() {
        let mut log = MessageLog::default();
        assert!(log.is_empty());
        assert_eq!(log.append(Origin::Local, "x").sequence, 1);
        assert_eq!(log.append(Origin::Local, "y").sequence, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_message_serialization() {
        let mut log = MessageLog::new();
        let message = log.append(Origin::Remote, "hello").clone();

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"origin\":\"remote\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
