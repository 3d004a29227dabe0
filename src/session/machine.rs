//! Core session machine implementation
//!
//! Applies pure transitions to the Session value, drives the image
//! source, text extractor, and synthesizer, and discards late results
//! from superseded requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::events::SessionEvent;
use crate::ocr::{ExtractionError, TextExtractor};
use crate::source::ImageSource;
use crate::speech::{SpeechOptions, SpeechSignal, Synthesizer, Utterance, UtteranceHandle};

/// The four phases of a scan-to-speech session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No image selected
    Empty,
    /// Image selected, text extraction in flight
    Detecting,
    /// Text available, playback idle
    Ready,
    /// Speech output active
    Playing,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Empty => write!(f, "Empty"),
            Phase::Detecting => write!(f, "Detecting"),
            Phase::Ready => write!(f, "Ready"),
            Phase::Playing => write!(f, "Playing"),
        }
    }
}

/// The single session value: selected image, recognized text, phase.
///
/// Transitions consume the session and return a new one; all effects
/// live in [`SessionMachine`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    image: Option<PathBuf>,
    recognized_text: Option<String>,
    phase: Phase,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    pub fn recognized_text(&self) -> Option<&str> {
        self.recognized_text.as_deref()
    }

    /// A new selection discards prior text and playback before
    /// detection starts.
    pub fn begin_detection(self, image: PathBuf) -> Session {
        Session {
            image: Some(image),
            recognized_text: None,
            phase: Phase::Detecting,
        }
    }

    pub fn complete_detection(self, text: String) -> Session {
        match self.phase {
            Phase::Detecting => Session {
                recognized_text: Some(text),
                phase: Phase::Ready,
                ..self
            },
            _ => self,
        }
    }

    /// The image stays selected so the user can see what failed.
    pub fn fail_detection(self) -> Session {
        match self.phase {
            Phase::Detecting => Session {
                recognized_text: None,
                phase: Phase::Empty,
                ..self
            },
            _ => self,
        }
    }

    /// Playing requires text; without it the session is unchanged.
    pub fn begin_playback(self) -> Session {
        if self.recognized_text.is_some() {
            Session {
                phase: Phase::Playing,
                ..self
            }
        } else {
            self
        }
    }

    pub fn end_playback(self) -> Session {
        match self.phase {
            Phase::Playing => Session {
                phase: Phase::Ready,
                ..self
            },
            _ => self,
        }
    }
}

/// User actions driving the session, forwarded from IPC
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// An image was chosen; `None` means the picker was dismissed
    SelectImage { path: Option<PathBuf> },
    /// Read the recognized text aloud
    Play,
    /// Halt playback
    Stop,
    /// Discard image and text
    Clear,
}

/// Completions from spawned service calls, tagged with the request
/// token current when the call was issued
enum Resolution {
    Extraction {
        token: u64,
        result: Result<String, ExtractionError>,
    },
    Speech {
        token: u64,
        signal: SpeechSignal,
    },
}

/// The machine that owns the session and its collaborators
pub struct SessionMachine {
    session: Session,
    /// Bumped on every selection; extraction results with an older
    /// token are discarded (last request wins)
    extraction_token: u64,
    /// Bumped on every play and every halt; guards stale speech signals
    playback_token: u64,
    playback_started_at: Option<Instant>,
    active_utterance: Option<UtteranceHandle>,
    source: Arc<dyn ImageSource>,
    extractor: Arc<dyn TextExtractor>,
    synthesizer: Arc<dyn Synthesizer>,
    speech_options: SpeechOptions,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionMachine {
    pub fn new(
        source: Arc<dyn ImageSource>,
        extractor: Arc<dyn TextExtractor>,
        synthesizer: Arc<dyn Synthesizer>,
        speech_options: SpeechOptions,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session: Session::new(),
            extraction_token: 0,
            playback_token: 0,
            playback_started_at: None,
            active_utterance: None,
            source,
            extractor,
            synthesizer,
            speech_options,
            event_tx,
        }
    }

    /// Get the current session value
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the machine, processing commands until the channel closes
    pub async fn run(&mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        info!("session machine started in Empty phase");

        let (resolution_tx, mut resolution_rx) = mpsc::channel(16);

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &resolution_tx).await,
                        None => break,
                    }
                }
                Some(resolution) = resolution_rx.recv() => {
                    self.handle_resolution(resolution);
                }
            }
        }

        info!("session machine stopped");
    }

    async fn handle_command(
        &mut self,
        command: SessionCommand,
        resolution_tx: &mpsc::Sender<Resolution>,
    ) {
        match command {
            SessionCommand::SelectImage { path: None } => {
                // Picker dismissed without a choice. Benign.
                debug!("image selection canceled");
            }
            SessionCommand::SelectImage { path: Some(path) } => {
                self.select_image(path, resolution_tx).await;
            }
            SessionCommand::Play => self.play(resolution_tx).await,
            SessionCommand::Stop => self.stop(),
            SessionCommand::Clear => self.clear(),
        }
    }

    async fn select_image(&mut self, path: PathBuf, resolution_tx: &mpsc::Sender<Resolution>) {
        // A new selection supersedes everything already in flight.
        self.halt_playback();
        self.extraction_token += 1;
        let token = self.extraction_token;

        self.apply(|session| session.begin_detection(path.clone()));
        self.emit(SessionEvent::ImageSelected);

        let image = match self.source.load(&path).await {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load selected image");
                self.apply(Session::fail_detection);
                self.emit(SessionEvent::ExtractionFailed);
                return;
            }
        };

        info!(
            path = %image.path.display(),
            bytes = image.bytes.len(),
            "image loaded, starting text detection"
        );

        let extractor = Arc::clone(&self.extractor);
        let resolution_tx = resolution_tx.clone();
        tokio::spawn(async move {
            let result = extractor.extract_text(&image.bytes).await;
            let _ = resolution_tx
                .send(Resolution::Extraction { token, result })
                .await;
        });
    }

    async fn play(&mut self, resolution_tx: &mpsc::Sender<Resolution>) {
        if self.session.phase() != Phase::Ready {
            // Covers both "no text yet" and "already playing".
            debug!(phase = %self.session.phase(), "play ignored");
            return;
        }
        let text = match self.session.recognized_text() {
            Some(text) => text.to_owned(),
            None => return,
        };

        self.playback_token += 1;
        let token = self.playback_token;

        match self.synthesizer.speak(&text, &self.speech_options).await {
            Ok(Utterance {
                mut signals,
                handle,
            }) => {
                // Replacing the handle halts any straggler utterance.
                self.active_utterance = Some(handle);
                let resolution_tx = resolution_tx.clone();
                tokio::spawn(async move {
                    while let Some(signal) = signals.recv().await {
                        if resolution_tx
                            .send(Resolution::Speech { token, signal })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to start speech playback");
            }
        }
    }

    fn stop(&mut self) {
        if self.session.phase() != Phase::Playing {
            debug!(phase = %self.session.phase(), "stop ignored");
            return;
        }
        self.halt_playback();
        self.apply(Session::end_playback);
        self.emit(SessionEvent::PlaybackStopped);
    }

    fn clear(&mut self) {
        let was_playing = self.session.phase() == Phase::Playing;
        self.halt_playback();
        // Orphan any in-flight detection as well.
        self.extraction_token += 1;
        if was_playing {
            self.emit(SessionEvent::PlaybackStopped);
        }
        self.apply(|_| Session::new());
        self.emit(SessionEvent::Cleared);
    }

    /// Kill the active utterance and invalidate its signals
    fn halt_playback(&mut self) {
        if let Some(handle) = self.active_utterance.take() {
            handle.stop();
        }
        self.playback_token += 1;
        self.playback_started_at = None;
    }

    fn handle_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Extraction { token, result } => {
                if token != self.extraction_token {
                    debug!(
                        token,
                        current = self.extraction_token,
                        "discarding stale extraction result"
                    );
                    return;
                }
                match result {
                    Ok(text) => {
                        let characters = text.chars().count();
                        info!(characters, "text detection complete");
                        self.apply(|session| session.complete_detection(text));
                        self.emit(SessionEvent::TextDetected { characters });
                    }
                    Err(e) => {
                        warn!(error = %e, "text detection failed");
                        self.apply(Session::fail_detection);
                        self.emit(SessionEvent::ExtractionFailed);
                    }
                }
            }
            Resolution::Speech { token, signal } => {
                if token != self.playback_token {
                    debug!(
                        token,
                        current = self.playback_token,
                        "discarding stale playback signal"
                    );
                    return;
                }
                match signal {
                    SpeechSignal::Started => {
                        if self.session.phase() == Phase::Ready {
                            self.playback_started_at = Some(Instant::now());
                            self.apply(Session::begin_playback);
                            self.emit(SessionEvent::PlaybackStarted);
                        }
                    }
                    SpeechSignal::Finished => {
                        if self.session.phase() == Phase::Playing {
                            let duration_ms = self
                                .playback_started_at
                                .map(|t| t.elapsed().as_millis() as u64)
                                .unwrap_or(0);
                            self.playback_started_at = None;
                            self.active_utterance = None;
                            self.apply(Session::end_playback);
                            self.emit(SessionEvent::PlaybackFinished { duration_ms });
                        }
                    }
                }
            }
        }
    }

    /// Apply a pure transition to the session, logging phase changes
    fn apply(&mut self, transition: impl FnOnce(Session) -> Session) {
        let old = self.session.phase();
        let next = transition(std::mem::take(&mut self.session));
        let new = next.phase();
        if new != old {
            info!(from = %old, to = %new, "session transition");
        }
        self.session = next;
    }

    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }
}
