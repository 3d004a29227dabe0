//! scanspeak-daemon: Background daemon for scan-to-speech accessibility
//!
//! This daemon owns one scan-to-speech session and provides:
//! - Explicit session machine (image -> text -> playback)
//! - Cloud text detection via the Vision annotate API
//! - Speech playback through the platform speech program
//! - IPC server for UI client communication, with announcement
//!   notifications for screen readers

mod config;
mod events;
mod ipc;
mod lifecycle;
mod ocr;
mod session;
mod source;
mod speech;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::ocr::{TextExtractor, VisionExtractor};
use crate::session::{Phase, SessionMachine};
use crate::source::{FileImageSource, ImageSource};
use crate::speech::{CommandSynthesizer, SpeechOptions, Synthesizer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "scanspeak-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    let api_key = config
        .vision_api_key
        .clone()
        .context("SCANSPEAK_VISION_API_KEY is not set")?;

    // External collaborators
    let source: Arc<dyn ImageSource> = Arc::new(FileImageSource::new());
    let extractor: Arc<dyn TextExtractor> = Arc::new(VisionExtractor::new(api_key));
    let synthesizer: Arc<dyn Synthesizer> = match &config.speech_command {
        Some(program) => Arc::new(CommandSynthesizer::new(program.clone())),
        None => Arc::new(CommandSynthesizer::platform_default()),
    };
    let speech_options = SpeechOptions {
        language: config.language.clone(),
        rate: config.rate,
    };

    // Create channels for inter-component communication
    // IPC server -> session machine
    let (command_tx, command_rx) = mpsc::channel(32);
    // Session machine -> IPC server (announcements for subscribed clients)
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);

    // Create the session machine
    let mut machine = SessionMachine::new(
        source,
        extractor,
        synthesizer,
        speech_options,
        event_tx.clone(),
    );

    // Create IPC server
    let server = Server::new(&config.socket_path, command_tx, event_tx.clone())?;

    // Subscribe to session events to keep the status snapshot current
    let mut status_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the session machine (processes IPC commands)
        _ = machine.run(command_rx) => {
            info!("session machine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Mirror session events into the IPC status snapshot
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => {
                        debug!(%event, "session event");
                        let (phase, has_text) = match &event {
                            SessionEvent::ImageSelected => (Phase::Detecting, false),
                            SessionEvent::TextDetected { .. } => (Phase::Ready, true),
                            SessionEvent::ExtractionFailed => (Phase::Empty, false),
                            SessionEvent::PlaybackStarted => (Phase::Playing, true),
                            SessionEvent::PlaybackFinished { .. }
                            | SessionEvent::PlaybackStopped => (Phase::Ready, true),
                            SessionEvent::Cleared => (Phase::Empty, false),
                        };
                        server_for_events.set_phase(phase, has_text).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        _ = lifecycle::shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("scanspeak-daemon stopped");

    Ok(())
}
