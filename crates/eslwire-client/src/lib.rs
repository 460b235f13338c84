//! Async client for the FreeSWITCH inbound event socket.
//!
//! Dial and authenticate with [`connect`] or [`connect_with_config`], spawn
//! [`Connection::run`] to drive the read loop, then issue commands and
//! queries from any task. Notifications are delivered to a [`Handler`].

mod auth;
pub mod config;
pub mod connection;
pub mod connector;
mod correlation;
mod dispatch;
pub mod error;
pub mod handler;
#[cfg(test)]
mod mock;

pub use config::{
    ConnectConfig, DEFAULT_ADDRESS, DEFAULT_DISPATCH_LIMIT, DEFAULT_MAX_RETRIES, DEFAULT_PASSWORD,
    DEFAULT_TIMEOUT,
};
pub use connection::Connection;
pub use connector::{connect, connect_with_config};
pub use error::{ClientError, Result};
pub use handler::{Handler, NoopHandler};
