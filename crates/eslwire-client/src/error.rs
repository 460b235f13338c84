use std::time::Duration;

use eslwire_frame::{EventType, FrameError};

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Every dial attempt failed; carries the last dial error.
    #[error("dial {address} failed after {attempts} attempt(s): {source}")]
    Connect {
        address: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The switch refused the password or sent an unexpected preamble.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A command reply carried `-ERR` (or no `+OK` marker).
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// An api response body started with `-ERR`.
    #[error("api failed: {0}")]
    ApiFailed(String),

    /// No reply arrived within the configured limit.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was closed before or while waiting for a reply.
    #[error("connection closed")]
    Closed,

    /// The read loop lost the connection.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The read loop was already started on this connection.
    #[error("read loop already running")]
    AlreadyRunning,

    /// Request text that would break the line grammar.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A frame of the wrong kind arrived.
    #[error("unexpected {0} frame")]
    UnexpectedEvent(EventType),

    /// Socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
