//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::session::Phase;

/// Session phase as reported over IPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No image selected
    Empty,
    /// Text extraction in flight
    Detecting,
    /// Text available, playback idle
    Ready,
    /// Speech output active
    Playing,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Empty
    }
}

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// An image was picked in the UI; `path: null` means the picker
    /// was dismissed
    SelectImage { path: Option<PathBuf> },

    /// Read the recognized text aloud
    Play,

    /// Halt playback
    Stop,

    /// Discard image and text
    Clear,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Command accepted and forwarded to the session machine
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A session event occurred; `announcement` is the line the client
    /// hands to the platform screen reader
    Session {
        event: SessionEvent,
        announcement: String,
    },
}

impl From<SessionEvent> for Notification {
    fn from(event: SessionEvent) -> Self {
        let announcement = event.announcement().to_string();
        Notification::Session {
            event,
            announcement,
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current session phase
    pub phase: SessionPhase,

    /// Whether recognized text is available for playback
    pub has_text: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: SessionPhase::default(),
            has_text: false,
            uptime_secs: 0,
        }
    }
}

/// Convert internal Phase to IPC SessionPhase
impl From<Phase> for SessionPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Empty => SessionPhase::Empty,
            Phase::Detecting => SessionPhase::Detecting,
            Phase::Ready => SessionPhase::Ready,
            Phase::Playing => SessionPhase::Playing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SelectImage {
            path: Some(PathBuf::from("/tmp/photo.jpg")),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("select_image"));
        assert!(json.contains("photo.jpg"));
    }

    #[test]
    fn test_canceled_selection_round_trips() {
        let json = r#"{"type":"select_image","path":null}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::SelectImage { path: None }));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("empty"));
    }

    #[test]
    fn test_notification_carries_announcement() {
        let notification = Notification::from(SessionEvent::Cleared);
        let json = serde_json::to_string(&notification).unwrap();
        assert!(json.contains("cleared"));
        assert!(json.contains("Content cleared"));
    }
}
