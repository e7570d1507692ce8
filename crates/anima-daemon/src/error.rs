//! Error types for the brain subsystem.

use thiserror::Error;

use crate::brain::Emotion;

/// Failures the brain recovers from locally. None of these ever leave the
/// tick task or the self-talk loop; they are logged and the opportunity is
/// skipped.
#[derive(Debug, Error)]
pub enum BrainError {
    /// The current emotion does not list the target among its transitions.
    #[error("invalid emotion transition: {from} -> {to}")]
    InvalidTransition { from: Emotion, to: Emotion },

    /// A name that is not part of the emotion set.
    #[error("unknown emotion: {0}")]
    UnknownEmotion(String),

    #[error("unknown host state: {0}")]
    UnknownHostState(String),

    /// The text generator call itself failed.
    #[error("text generation failed: {0}")]
    Generation(#[from] anyhow::Error),

    /// The text generator answered, but not with the expected JSON shape.
    #[error("malformed generator response: {0}")]
    MalformedResponse(String),
}

pub type BrainResult<T> = std::result::Result<T, BrainError>;
