//! Synthesizer trait and playback signal types

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::config::{DEFAULT_LANGUAGE, DEFAULT_RATE};

/// Options applied to a single utterance
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    /// BCP-47 language tag, e.g. "pt-BR"
    pub language: String,
    /// Rate multiplier, 1.0 = the engine's normal speed
    pub rate: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            rate: DEFAULT_RATE,
        }
    }
}

/// Signals emitted over the lifetime of one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechSignal {
    /// Audio output has begun
    Started,
    /// Audio output ran to completion
    Finished,
}

/// Errors that can occur when starting playback
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to launch speech program `{program}`: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
}

/// Handle for halting an in-flight utterance.
///
/// Dropping the handle also halts output, so an utterance cannot outlive
/// the session that started it.
pub struct UtteranceHandle {
    stop_tx: oneshot::Sender<()>,
}

impl UtteranceHandle {
    pub fn new(stop_tx: oneshot::Sender<()>) -> Self {
        Self { stop_tx }
    }

    /// Halt output. Returns immediately; does not wait for confirmation.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
    }
}

/// A started utterance: its signal stream plus a stop handle
pub struct Utterance {
    pub signals: mpsc::Receiver<SpeechSignal>,
    pub handle: UtteranceHandle,
}

/// Produces audible output from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn speak(&self, text: &str, options: &SpeechOptions)
        -> Result<Utterance, SpeechError>;
}
