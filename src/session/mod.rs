//! Session module for the scan-to-speech lifecycle
//!
//! One session at a time moves through four phases:
//! - Empty: no image selected
//! - Detecting: image selected, text extraction in flight
//! - Ready: text available, playback idle
//! - Playing: speech output active

mod machine;

pub use machine::{Phase, Session, SessionCommand, SessionMachine};
