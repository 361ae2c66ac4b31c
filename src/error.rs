// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Error type shared by the store, the timer, and the exporters.
//!
//! No variant is fatal: the CLI reports it and the user re-attempts the action.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The persisted store exists but could not be read or parsed.
    #[error("Failed to load session data from {path}: {details}")]
    Load { path: PathBuf, details: String },

    /// Writing the store failed; the in-memory mapping is kept.
    #[error("Failed to save session data to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Client already exists: {0}")]
    DuplicateClient(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Please select a client first.")]
    NoClientSelected,

    #[error("A timer is already running for {0}.")]
    AlreadyRunning(String),

    #[error("No timer is running.")]
    NotRunning,

    /// Shutdown guard.
    #[error("You must stop the timer before closing the application.")]
    TimerRunning,

    #[error("Failed to export to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Bad command-line arguments; the message is shown as is.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
