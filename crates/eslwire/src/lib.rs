//! FreeSWITCH event socket client.
//!
//! eslwire speaks the inbound event socket: it authenticates, correlates
//! command replies and api responses with the requests that caused them,
//! and hands asynchronous notifications to a user-supplied handler.
//!
//! # Crate Structure
//!
//! - [`frame`]: header-block framing, event model and request encoders
//! - [`client`]: async connection, read loop and handler hooks

/// Re-export frame types.
pub mod frame {
    pub use eslwire_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use eslwire_client::*;
}

pub use eslwire_client::{
    connect, connect_with_config, ClientError, ConnectConfig, Connection, Handler, NoopHandler,
};
pub use eslwire_frame::{Command, Event, EventName, EventType, FrameError, HeaderMap};
