use std::{io, path::PathBuf};
use thiserror::Error;

/// Failure to start a detector process.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Interpreter not found: {0:?}")]
    InterpreterNotFound(PathBuf),
    #[error("Detector script missing: {0:?}")]
    ScriptMissing(PathBuf),
    #[error("Working directory missing: {0:?}")]
    WorkingDirMissing(PathBuf),
    #[error("Permission denied launching {path:?}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to spawn {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Detector process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// A detector line that is not a bay count.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Non-integer output: {0:?}")]
    NotInteger(String),
    #[error("Output line longer than {limit} bytes")]
    TooLong { limit: usize },
}

/// Failure while relaying stream-mode output.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Reading detector output for lot {lot_id} failed: {source}")]
    Read {
        lot_id: String,
        #[source]
        source: io::Error,
    },
}

/// Failure to deliver an occupancy update.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Slot update transport failed: {0}")]
    Transport(String),
    #[error("Slot update rejected with status {0}")]
    Status(u16),
}
