//! Error taxonomy for a survey run.
//!
//! Decode termination is deliberately absent: a stream that ends or fails
//! mid-read simply ends the record sequence.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurveyError {
    /// The video could not be opened. Nothing has been written.
    #[error("video source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    /// The source opened but cannot be timestamped (fps missing, zero or non-finite).
    #[error("invalid video source: {0}")]
    InvalidSource(String),

    /// The detector failed on a sampled frame. Aborts the run.
    #[error("detector '{backend}' failed on frame {frame_index}: {reason}")]
    Detector {
        backend: String,
        frame_index: u64,
        reason: String,
    },

    /// An output file could not be created or written. For annotated frames
    /// this is logged and the pass continues.
    #[error("failed to persist frame to {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// Transport-level failure talking to the remote description API.
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// An image handed to the describe client could not be read or encoded.
    /// No request was sent.
    #[error("image input error: {0}")]
    ImageInput(String),

    #[error("output table error: {0}")]
    Output(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("survey worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, SurveyError>;
