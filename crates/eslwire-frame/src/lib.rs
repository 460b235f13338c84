//! Header-block framing for the FreeSWITCH event socket.
//!
//! Every message on the socket is a block of `Name: value` lines terminated
//! by a blank line, optionally followed by a raw body whose size is given by
//! `Content-Length`. This crate turns that byte stream into classified
//! [`Event`] values and encodes the outbound request grammars.
//!
//! - [`codec`] splits and classifies frames from a byte buffer
//! - `reader` (feature `async`) pulls frames off tokio streams
//! - [`command`] encodes commands, queries and application execution

pub mod codec;
pub mod command;
pub mod error;
pub mod event;
pub mod headers;
#[cfg(feature = "async")]
pub mod reader;

pub use codec::{
    decode_event, FrameConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_HEADER_SIZE,
};
pub use command::{
    encode_api, encode_auth, encode_bgapi, encode_command, encode_send_event, encode_subscribe,
    has_line_break, Command,
};
pub use error::{FrameError, Result};
pub use event::{Event, EventName, EventType, Notification};
pub use headers::HeaderMap;
#[cfg(feature = "async")]
pub use reader::AsyncEventReader;
