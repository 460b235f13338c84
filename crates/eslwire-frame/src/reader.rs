use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{decode_event, FrameConfig};
use crate::error::{FrameError, Result};
use crate::event::Event;

const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls complete events off a tokio `AsyncRead` stream.
///
/// Bytes are buffered until a whole frame (header block plus declared body)
/// is available. `read_event` is cancel-safe: anything already received
/// stays in the buffer for the next call.
pub struct AsyncEventReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> AsyncEventReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete event.
    ///
    /// End of stream at a frame boundary is [`FrameError::ConnectionClosed`];
    /// end of stream inside a frame is [`FrameError::Truncated`].
    pub async fn read_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = decode_event(&mut self.buf, &self.config)? {
                return Ok(event);
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            let read = match self.inner.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(eof_error(&self.buf));
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn eof_error(buf: &BytesMut) -> FrameError {
    if buf.is_empty() {
        FrameError::ConnectionClosed
    } else {
        FrameError::Truncated {
            buffered: buf.len(),
        }
    }
}
