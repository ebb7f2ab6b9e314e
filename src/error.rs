//! Error taxonomy for opening, mixing and playing tracks.
//!
//! Every error is `Clone + PartialEq` so it can be returned to the caller and
//! broadcast through the transport event channel at the same time.

use std::path::Path;

use thiserror::Error;

/// Failure to open or decode an audio file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No path was supplied.
    #[error("empty file path")]
    EmptyPath,

    /// The file does not exist.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// The file exists but could not be opened or read.
    #[error("unable to read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The container or codec is not supported by the decode facility.
    #[error("unsupported audio in {path}: {reason}")]
    Unsupported { path: String, reason: String },

    /// Decoding failed part-way through the stream.
    #[error("stream error in {path}: {reason}")]
    Stream { path: String, reason: String },
}

impl DecodeError {
    pub(crate) fn unreadable(path: &Path, reason: impl ToString) -> Self {
        Self::Unreadable {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: &Path, reason: impl ToString) -> Self {
        Self::Unsupported {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn stream(path: &Path, reason: impl ToString) -> Self {
        Self::Stream {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to build or drive the mix graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A source format cannot be converted into the mixing format.
    #[error("format unsupported: {0}")]
    FormatUnsupported(String),

    /// The operation needs attached sources.
    #[error("mix graph has no attached sources")]
    NotAttached,

    /// The attached sources were already handed to an output node.
    #[error("mix graph start already scheduled")]
    AlreadyScheduled,
}

/// Failure of the shared output engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The output device or session could not be started.
    #[error("audio hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// The engine was asked to route audio while stopped.
    #[error("audio engine is not running")]
    NotRunning,
}

/// Any failure surfaced by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
