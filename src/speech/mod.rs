//! Speech capabilities behind explicit adapters.
//!
//! Each adapter owns its engine, exposes its current state, and publishes
//! state changes on a `watch` channel. Engines are traits so the terminal
//! build can drive external speech programs while tests use in-memory ones.

pub mod command;
pub mod input;
pub mod output;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use command::{CommandRecognizer, CommandSynthesizer};
pub use input::{RecognitionEvent, SpeechToText};
pub use output::TextToSpeech;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech is not supported on this system")]
    Unsupported,
    #[error("failed to start speech program: {0}")]
    Spawn(String),
    #[error("speech engine error: {0}")]
    Engine(String),
}

/// Resolve a program name against `PATH`. Paths containing a separator are
/// checked as given.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}
