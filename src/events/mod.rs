//! Events module for session transitions
//!
//! Every session transition emits one of these events. Subscribed IPC
//! clients relay the `announcement` text to the platform screen reader.

use serde::{Deserialize, Serialize};

/// Events emitted by the session machine during transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// An image was selected; text detection is starting
    ImageSelected,

    /// Text detection finished successfully
    TextDetected {
        /// Number of characters recognized
        characters: usize,
    },

    /// Text detection failed; the session holds no text
    ExtractionFailed,

    /// Speech playback started
    PlaybackStarted,

    /// Speech playback ran to completion
    PlaybackFinished {
        /// Duration in milliseconds that playback was active
        duration_ms: u64,
    },

    /// Speech playback was interrupted by the user
    PlaybackStopped,

    /// Image and text were discarded
    Cleared,
}

impl SessionEvent {
    /// Screen-reader announcement for this event
    pub fn announcement(&self) -> &'static str {
        match self {
            SessionEvent::ImageSelected => "Image selected. Analyzing text...",
            SessionEvent::TextDetected { .. } => "Text detected. Ready for playback.",
            SessionEvent::ExtractionFailed => "Error analyzing image. Please try again.",
            SessionEvent::PlaybackStarted => "Audio playback starting",
            SessionEvent::PlaybackFinished { .. } => "Audio playback finished",
            SessionEvent::PlaybackStopped => "Audio playback stopped",
            SessionEvent::Cleared => "Content cleared",
        }
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ImageSelected => write!(f, "IMAGE_SELECTED"),
            SessionEvent::TextDetected { characters } => {
                write!(f, "TEXT_DETECTED ({} chars)", characters)
            }
            SessionEvent::ExtractionFailed => write!(f, "EXTRACTION_FAILED"),
            SessionEvent::PlaybackStarted => write!(f, "PLAYBACK_STARTED"),
            SessionEvent::PlaybackFinished { duration_ms } => {
                write!(f, "PLAYBACK_FINISHED ({}ms)", duration_ms)
            }
            SessionEvent::PlaybackStopped => write!(f, "PLAYBACK_STOPPED"),
            SessionEvent::Cleared => write!(f, "CLEARED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::TextDetected { characters: 42 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("text_detected"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"playback_stopped"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, SessionEvent::PlaybackStopped));
    }

    #[test]
    fn test_announcements_are_nonempty() {
        let events = [
            SessionEvent::ImageSelected,
            SessionEvent::TextDetected { characters: 1 },
            SessionEvent::ExtractionFailed,
            SessionEvent::PlaybackStarted,
            SessionEvent::PlaybackFinished { duration_ms: 10 },
            SessionEvent::PlaybackStopped,
            SessionEvent::Cleared,
        ];
        for event in events {
            assert!(!event.announcement().is_empty());
        }
    }
}
