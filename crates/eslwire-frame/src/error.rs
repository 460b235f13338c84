/// Errors that can occur while decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header line could not be parsed.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The `Content-Length` header is not a valid byte count.
    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),

    /// The header block grew past the configured limit without terminating.
    #[error("header block too large ({size} bytes, max {max})")]
    HeaderTooLarge { size: usize, max: usize },

    /// The declared body exceeds the configured maximum size.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// A `command/reply` frame without a `+OK` marker.
    #[error("command error: {0}")]
    CommandFailed(String),

    /// JSON and XML event formats are not decoded.
    #[error("unsupported format {0}")]
    UnsupportedFormat(String),

    /// The `Content-Type` header names no known frame kind.
    #[error("unknown content type {0:?}")]
    UnknownContentType(String),

    /// The nested header block of a `text/event-plain` body is invalid.
    #[error("parse text body: {0}")]
    InvalidEventBody(String),

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly at a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

impl FrameError {
    /// Whether the offending frame was fully consumed, leaving the stream
    /// positioned at the next frame boundary.
    pub fn is_frame_consumed(&self) -> bool {
        matches!(
            self,
            FrameError::CommandFailed(_)
                | FrameError::UnsupportedFormat(_)
                | FrameError::UnknownContentType(_)
                | FrameError::InvalidEventBody(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
