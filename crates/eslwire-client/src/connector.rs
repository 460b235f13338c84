use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use eslwire_frame::AsyncEventReader;
use tokio::io::BufWriter;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::auth::authenticate;
use crate::config::ConnectConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::handler::Handler;

/// Connect to `address` with the given password and default settings.
pub async fn connect(
    address: impl Into<String>,
    password: impl Into<String>,
    handler: impl Handler,
) -> Result<Connection> {
    let config = ConnectConfig::new(address).with_password(password);
    connect_with_config(config, handler).await
}

/// Connect with explicit configuration.
///
/// Dials with retries, authenticates, and returns a connected handle. The
/// read loop is not started; call [`Connection::run`] on a task of your own.
pub async fn connect_with_config(
    config: ConnectConfig,
    handler: impl Handler,
) -> Result<Connection> {
    let stream = dial(&config.address, config.timeout, config.attempts()).await?;
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let mut reader = AsyncEventReader::with_config(read_half, config.frame.clone());
    let mut writer = BufWriter::new(write_half);

    match tokio::time::timeout(
        config.timeout,
        authenticate(&mut reader, &mut writer, &config.password),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(ClientError::Timeout(config.timeout)),
    }

    info!(address = %config.address, "connected to event socket");
    Ok(Connection::from_parts(
        reader,
        writer,
        &config,
        Arc::new(handler),
    ))
}

/// Open a TCP connection, trying up to `attempts` times with no backoff.
pub(crate) async fn dial(address: &str, timeout: Duration, attempts: u32) -> Result<TcpStream> {
    dial_with(address, timeout, attempts, || TcpStream::connect(address)).await
}

/// Retry `open` until it succeeds or `attempts` runs out, bounding each try
/// by `timeout`. The returned failure wraps the last attempt's error.
pub(crate) async fn dial_with<T, F, Fut>(
    address: &str,
    timeout: Duration,
    attempts: u32,
    mut open: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(timeout, open()).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(err)) => err,
            Err(_) => io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {timeout:?}"),
            ),
        };

        if attempt >= attempts {
            return Err(ClientError::Connect {
                address: address.to_string(),
                attempts,
                source: err,
            });
        }
        warn!(address, attempt, error = %err, "dial attempt failed, retrying");
        attempt += 1;
    }
}
