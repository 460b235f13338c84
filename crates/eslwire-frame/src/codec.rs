use std::borrow::Cow;

use bytes::{Buf, Bytes, BytesMut};
use percent_encoding::percent_decode_str;

use crate::error::{FrameError, Result};
use crate::event::{
    Event, EventType, Notification, HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_REPLY_TEXT,
};
use crate::headers::HeaderMap;

/// Default maximum header block size: 1 MiB.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 1024 * 1024;

/// Default maximum body size: 8 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Configuration for frame decoding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum size of one header block in bytes. Default: 1 MiB.
    pub max_header_size: usize,
    /// Maximum `Content-Length` accepted. Default: 8 MiB.
    pub max_body_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Locate the blank line ending a header block.
///
/// Returns `(header_len, consumed)`: the header lines span `buf[..header_len]`
/// and the block including its terminating blank line spans `buf[..consumed]`.
pub(crate) fn split_header_block(buf: &[u8]) -> Option<(usize, usize)> {
    for (idx, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        match buf.get(idx + 1) {
            Some(b'\n') => return Some((idx + 1, idx + 2)),
            Some(b'\r') if buf.get(idx + 2) == Some(&b'\n') => return Some((idx + 1, idx + 3)),
            _ => {}
        }
    }
    None
}

/// Decode one frame from a buffer.
///
/// Wire format:
/// ```text
/// Content-Type: api/response\n
/// Content-Length: 14\n
/// \n
/// +OK 3 sessions
/// ```
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Once a frame is complete its bytes are consumed from the buffer, even when
/// classification then fails (see [`FrameError::is_frame_consumed`]).
pub fn decode_event(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Event>> {
    let blank = src
        .iter()
        .take_while(|byte| matches!(byte, b'\n' | b'\r'))
        .count();
    src.advance(blank);

    if src.is_empty() {
        return Ok(None);
    }

    let Some((header_len, header_total)) = split_header_block(src) else {
        if src.len() > config.max_header_size {
            return Err(FrameError::HeaderTooLarge {
                size: src.len(),
                max: config.max_header_size,
            });
        }
        return Ok(None); // Need more data
    };

    if header_len > config.max_header_size {
        return Err(FrameError::HeaderTooLarge {
            size: header_len,
            max: config.max_header_size,
        });
    }

    let headers = HeaderMap::parse(&src[..header_len])?;

    let body_len = match headers.get(HEADER_CONTENT_LENGTH) {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            if len > config.max_body_size {
                return Err(FrameError::BodyTooLarge {
                    size: len,
                    max: config.max_body_size,
                });
            }
            Some(len)
        }
        None => None,
    };

    let total = header_total + body_len.unwrap_or(0);
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None); // Need more data
    }

    src.advance(header_total);
    let body = body_len.map(|len| src.split_to(len).freeze());

    classify(headers, body).map(Some)
}

fn classify(mut headers: HeaderMap, body: Option<Bytes>) -> Result<Event> {
    let content_type = headers
        .get(HEADER_CONTENT_TYPE)
        .map(Cow::into_owned)
        .unwrap_or_default();

    match EventType::classify(&content_type)? {
        EventType::CommandReply => {
            let reply = headers.get_raw(HEADER_REPLY_TEXT).unwrap_or_default();
            if !reply.contains("+OK") && !reply.contains("%2BOK") {
                let reply = percent_decode_str(reply.trim()).decode_utf8_lossy();
                return Err(FrameError::CommandFailed(reply.into_owned()));
            }
            if reply.contains('%') {
                headers.set_escaped(true);
            }
            Ok(Event::new(EventType::CommandReply, headers, body, None))
        }
        EventType::GenericNotification => {
            let raw = body.clone().unwrap_or_default();
            let notification = Notification::parse(&raw)?;
            Ok(Event::new(
                EventType::GenericNotification,
                headers,
                body,
                Some(notification),
            ))
        }
        EventType::Error => Err(FrameError::UnknownContentType(content_type)),
        other => Ok(Event::new(other, headers, body, None)),
    }
}
