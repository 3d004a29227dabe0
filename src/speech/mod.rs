//! Speech synthesis module
//!
//! The session machine talks to the speech device through the
//! `Synthesizer` trait: start an utterance, observe its start/finish
//! signals, stop it early.

mod engine;
mod synthesizer;

pub use engine::CommandSynthesizer;
pub use synthesizer::{
    SpeechError, SpeechOptions, SpeechSignal, Synthesizer, Utterance, UtteranceHandle,
};
