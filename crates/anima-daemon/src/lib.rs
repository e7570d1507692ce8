pub mod brain;
pub mod bridge;
pub mod character;
pub mod config;
pub mod error;
pub mod expression;
pub mod llm;
pub mod tts;

pub use brain::BrainSystem;
pub use error::{BrainError, BrainResult};
