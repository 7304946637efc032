//! Error types for the capture and analysis pipeline

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The radio could not be reached or configured. Ends the session.
    #[error("radio connection failed: {0}")]
    Connection(String),

    #[error("invalid {name}: {value} (must be a positive number)")]
    InvalidInput { name: &'static str, value: f64 },

    #[error("{samples} samples is too short for a single {n_fft} point frame")]
    InsufficientData { samples: usize, n_fft: usize },

    #[error("render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
