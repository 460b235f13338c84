use bytes::BytesMut;
use eslwire_frame::{encode_auth, AsyncEventReader, EventType, FrameError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Run the password handshake on a freshly dialed socket.
///
/// Expects `auth/request`, answers with `auth <password>` and requires a
/// successful `command/reply`. Any other frame or a failed reply aborts;
/// the caller drops the socket on error.
pub(crate) async fn authenticate<R, W>(
    reader: &mut AsyncEventReader<R>,
    writer: &mut W,
    password: &str,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if eslwire_frame::has_line_break(password) {
        return Err(ClientError::InvalidRequest(
            "password contains a line break".to_string(),
        ));
    }

    let preamble = reader.read_event().await?;
    if preamble.event_type() != EventType::AuthRequest {
        return Err(ClientError::AuthFailed(format!(
            "bad auth preamble: {}",
            preamble.event_type()
        )));
    }

    let mut frame = BytesMut::new();
    encode_auth(password, &mut frame);
    writer.write_all(&frame).await?;
    writer.flush().await?;

    let reply = match reader.read_event().await {
        Ok(reply) => reply,
        Err(FrameError::CommandFailed(text)) => return Err(ClientError::AuthFailed(text)),
        Err(err) => return Err(err.into()),
    };
    if reply.event_type() != EventType::CommandReply {
        return Err(ClientError::UnexpectedEvent(reply.event_type()));
    }

    debug!(reply = ?reply.reply_text(), "authenticated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;

    /// Plays the switch side of the handshake over an in-memory pipe.
    async fn handshake_with(server_frames: &'static [&'static str]) -> (Result<()>, String) {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, mut client_write) = tokio::io::split(client);
        let mut reader = AsyncEventReader::new(client_read);

        let switch = tokio::spawn(async move {
            let (server_read, mut server_write) = tokio::io::split(server);
            let mut server_read = BufReader::new(server_read);

            server_write
                .write_all(server_frames[0].as_bytes())
                .await
                .unwrap();
            let mut line = String::new();
            if server_frames.len() > 1 {
                server_read.read_line(&mut line).await.unwrap();
                server_write
                    .write_all(server_frames[1].as_bytes())
                    .await
                    .unwrap();
            }
            line
        });

        let result = authenticate(&mut reader, &mut client_write, "ClueCon").await;
        let line = switch.await.unwrap();
        (result, line)
    }

    #[tokio::test]
    async fn accepted_password() {
        let (result, line) = handshake_with(&[
            "Content-Type: auth/request\n\n",
            "Content-Type: command/reply\nReply-Text: +OK accepted\n\n",
        ])
        .await;

        result.unwrap();
        assert_eq!(line, "auth ClueCon\n");
    }

    #[tokio::test]
    async fn rejected_password() {
        let (result, _) = handshake_with(&[
            "Content-Type: auth/request\n\n",
            "Content-Type: command/reply\nReply-Text: -ERR invalid\n\n",
        ])
        .await;

        assert!(matches!(result, Err(ClientError::AuthFailed(text)) if text == "-ERR invalid"));
    }

    #[tokio::test]
    async fn wrong_preamble() {
        let (result, _) = handshake_with(&["Content-Type: text/rude-rejection\n\n"]).await;

        assert!(matches!(result, Err(ClientError::AuthFailed(text)) if text.contains("disconnect")));
    }

    #[tokio::test]
    async fn reply_of_wrong_kind() {
        let (result, _) = handshake_with(&[
            "Content-Type: auth/request\n\n",
            "Content-Type: api/response\nContent-Length: 3\n\n+OK",
        ])
        .await;

        assert!(matches!(
            result,
            Err(ClientError::UnexpectedEvent(EventType::ApiResponse))
        ));
    }

    #[tokio::test]
    async fn password_with_line_break_is_refused() {
        let (_client, server) = tokio::io::duplex(64);
        let (read, mut write) = tokio::io::split(server);
        let mut reader = AsyncEventReader::new(read);

        let result = authenticate(&mut reader, &mut write, "a\nb").await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }
}
