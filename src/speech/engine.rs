//! Process-backed speech engine
//!
//! Drives the platform speech program (`say` on macOS, `espeak-ng`
//! elsewhere). Started is signaled once the process spawns, Finished when
//! it exits on its own; stopping kills the process.

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{SpeechError, SpeechOptions, SpeechSignal, Synthesizer, Utterance, UtteranceHandle};

/// Baseline speaking rate of the platform engines, in words per minute.
/// The rate multiplier from `SpeechOptions` scales this.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Synthesizer that shells out to a speech program
pub struct CommandSynthesizer {
    program: String,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Pick the speech program this platform ships with
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("say")
        } else {
            Self::new("espeak-ng")
        }
    }

    fn build_command(&self, text: &str, options: &SpeechOptions) -> Command {
        let wpm = (BASE_WORDS_PER_MINUTE * options.rate).round() as u32;
        let mut command = Command::new(&self.program);

        // `say` takes only a rate; espeak variants also take a voice.
        // Anything else (a configured wrapper) receives the text alone.
        if self.program.ends_with("say") {
            command.arg("-r").arg(wpm.to_string());
        } else if self.program.contains("espeak") {
            command
                .arg("-v")
                .arg(options.language.to_lowercase())
                .arg("-s")
                .arg(wpm.to_string());
        }
        command.arg(text);
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn speak(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> Result<Utterance, SpeechError> {
        let mut child =
            self.build_command(text, options)
                .spawn()
                .map_err(|source| SpeechError::Launch {
                    program: self.program.clone(),
                    source,
                })?;

        debug!(program = %self.program, chars = text.len(), "speech process spawned");

        let (signal_tx, signal_rx) = mpsc::channel(2);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = signal_tx.send(SpeechSignal::Started).await;

            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            warn!(?status, "speech process exited with failure");
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to wait on speech process");
                        }
                        _ => {}
                    }
                    let _ = signal_tx.send(SpeechSignal::Finished).await;
                }
                // Fires on an explicit stop or when the handle is dropped.
                _ = stop_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill speech process");
                    }
                }
            }
        });

        Ok(Utterance {
            signals: signal_rx,
            handle: UtteranceHandle::new(stop_tx),
        })
    }
}
