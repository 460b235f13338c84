use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use eslwire_frame::event::HEADER_JOB_UUID;
use eslwire_frame::{
    encode_api, encode_bgapi, encode_command, encode_send_event, encode_subscribe,
    has_line_break, AsyncEventReader, Command, Event, EventName, EventType, FrameError,
};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConnectConfig;
use crate::correlation::{ReplyQueue, ReplyReceiver};
use crate::dispatch::Dispatcher;
use crate::error::{ClientError, Result};
use crate::handler::Handler;

type Reader = AsyncEventReader<OwnedReadHalf>;
type Writer = BufWriter<OwnedWriteHalf>;

#[derive(Clone, Copy)]
enum ReplyKind {
    Command,
    Api,
}

/// An authenticated event socket connection.
///
/// Cheap to clone; all clones share one socket. Requests may be issued from
/// any task while [`Connection::run`] drives the read loop on another.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    address: String,
    reply_timeout: Option<Duration>,
    connected: AtomicBool,
    reader: Mutex<Option<Reader>>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    command_replies: ReplyQueue,
    api_responses: ReplyQueue,
    dispatcher: Dispatcher,
    handler: Arc<dyn Handler>,
    shutdown: CancellationToken,
}

impl Connection {
    pub(crate) fn from_parts(
        reader: Reader,
        writer: Writer,
        config: &ConnectConfig,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: config.address.clone(),
                reply_timeout: config.reply_timeout,
                connected: AtomicBool::new(true),
                reader: Mutex::new(Some(reader)),
                writer: tokio::sync::Mutex::new(Some(writer)),
                command_replies: ReplyQueue::new("command"),
                api_responses: ReplyQueue::new("api"),
                dispatcher: Dispatcher::new(handler.clone(), config.dispatch_limit),
                handler,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Address this connection was dialed with.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Send a plain command and wait for its `command/reply`.
    pub async fn send_recv<S: AsRef<str>>(&self, command: &str, args: &[S]) -> Result<Event> {
        check_line(command)?;
        check_args(args)?;
        let mut frame = BytesMut::new();
        encode_command(command, args, &mut frame);
        self.request(ReplyKind::Command, &frame).await
    }

    /// Run a query and return its response body verbatim.
    ///
    /// A body whose trimmed text starts with `-ERR` becomes
    /// [`ClientError::ApiFailed`].
    pub async fn api<S: AsRef<str>>(&self, command: &str, args: &[S]) -> Result<String> {
        check_line(command)?;
        check_args(args)?;
        let mut frame = BytesMut::new();
        encode_api(command, args, &mut frame);
        let event = self.request(ReplyKind::Api, &frame).await?;

        let body = event.body_text();
        let trimmed = body.trim();
        if trimmed.starts_with("-ERR") {
            return Err(ClientError::ApiFailed(trimmed.to_string()));
        }
        Ok(body.into_owned())
    }

    /// Start a background job and return its job id.
    ///
    /// The result arrives later as a `BACKGROUND_JOB` notification carrying
    /// the same `Job-UUID`. An empty string means the reply had no job id.
    pub async fn bgapi<S: AsRef<str>>(&self, command: &str, args: &[S]) -> Result<String> {
        check_line(command)?;
        check_args(args)?;
        let mut frame = BytesMut::new();
        encode_bgapi(command, args, &mut frame);
        let reply = self.request(ReplyKind::Command, &frame).await?;
        Ok(reply
            .get(HEADER_JOB_UUID)
            .map(|id| id.into_owned())
            .unwrap_or_default())
    }

    /// Inject a custom event into the switch.
    pub async fn send_event<K, V>(&self, name: &str, headers: &[(K, V)], body: &[u8]) -> Result<Event>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        check_line(name)?;
        for (key, value) in headers {
            check_line(key.as_ref())?;
            check_line(value.as_ref())?;
        }
        let mut frame = BytesMut::new();
        encode_send_event(name, headers, body, &mut frame);
        self.request(ReplyKind::Command, &frame).await
    }

    /// Send an execute request and wait for the switch to accept it.
    pub async fn run_command(&self, command: &Command) -> Result<Event> {
        if command.has_line_break() {
            return Err(ClientError::InvalidRequest(format!(
                "line break in execute request for {:?}",
                command.app
            )));
        }
        self.request(ReplyKind::Command, &command.to_bytes()).await
    }

    /// Execute `app` on call leg `uuid` without holding the event lock.
    pub async fn execute<S: AsRef<str>>(&self, app: &str, uuid: &str, args: &[S]) -> Result<Event> {
        self.run_command(&Command::new(uuid, app, join_args(args)))
            .await
    }

    /// Execute `app` on call leg `uuid`, holding the event lock until the
    /// application finishes.
    pub async fn execute_sync<S: AsRef<str>>(
        &self,
        app: &str,
        uuid: &str,
        args: &[S],
    ) -> Result<Event> {
        self.run_command(&Command::new(uuid, app, join_args(args)).sync(true))
            .await
    }

    /// Subscribe to plain-format notifications; an empty list means all.
    pub async fn subscribe_events(&self, names: &[EventName]) -> Result<Event> {
        if names.contains(&EventName::Unknown) {
            return Err(ClientError::InvalidRequest(
                "cannot subscribe to an unknown event name".to_string(),
            ));
        }
        let mut frame = BytesMut::new();
        encode_subscribe(names, &mut frame);
        self.request(ReplyKind::Command, &frame).await
    }

    /// Write pre-encoded bytes as-is. Any reply they provoke has no waiter
    /// and is dropped by the read loop.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard
            .as_mut()
            .filter(|_| self.is_connected())
            .ok_or(ClientError::Closed)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Drive the read loop until the connection ends.
    ///
    /// Returns `Ok(())` after a local [`Connection::close`]; returns the
    /// failure (after closing) when the peer goes away or sends a frame that
    /// cannot be decoded. May be called once per connection.
    pub async fn run(&self) -> Result<()> {
        let taken = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut reader = match taken {
            Some(reader) => reader,
            None if !self.is_connected() => return Err(ClientError::Closed),
            None => return Err(ClientError::AlreadyRunning),
        };

        let handler = self.inner.handler.clone();
        let conn = self.clone();
        tokio::spawn(async move {
            handler.on_connect(&conn).await;
        });

        info!(address = %self.inner.address, "read loop started");
        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => break Ok(()),
                next = reader.read_event() => next,
            };

            match next {
                Ok(event) => {
                    if let Err(err) = self.route(event).await {
                        break Err(err);
                    }
                }
                Err(FrameError::CommandFailed(text)) => {
                    debug!(reply = %text, "command failed");
                    self.inner
                        .command_replies
                        .complete(Err(ClientError::CommandFailed(text)));
                }
                Err(FrameError::UnknownContentType(content_type)) => {
                    warn!(%content_type, "skipping frame with unknown content type");
                }
                Err(FrameError::ConnectionClosed) => {
                    break Err(ClientError::Disconnected(
                        "connection closed by peer".to_string(),
                    ));
                }
                Err(err) => break Err(err.into()),
            }
        };
        drop(reader);

        let was_connected = self.is_connected();
        self.close().await;
        match outcome {
            Err(err) if was_connected => {
                error!(address = %self.inner.address, error = %err, "read loop failed");
                Err(err)
            }
            _ => {
                info!(address = %self.inner.address, "read loop stopped");
                Ok(())
            }
        }
    }

    /// Close the connection.
    ///
    /// Idempotent. The first call on a connected handle fires
    /// [`Handler::on_close`]; every call releases the socket, stops the read
    /// loop and fails pending requests with [`ClientError::Closed`].
    pub async fn close(&self) {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            info!(address = %self.inner.address, "closing connection");
            self.inner.handler.on_close(self).await;
        }

        self.inner.shutdown.cancel();
        self.inner.dispatcher.close();
        self.inner.command_replies.cancel_all();
        self.inner.api_responses.cancel_all();

        self.inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn route(&self, event: Event) -> Result<()> {
        match event.event_type() {
            EventType::CommandReply => {
                debug!(reply = ?event.reply_text(), "command reply");
                self.inner.command_replies.complete(Ok(event));
            }
            EventType::ApiResponse => {
                debug!(bytes = event.body().map_or(0, |b| b.len()), "api response");
                self.inner.api_responses.complete(Ok(event));
            }
            EventType::GenericNotification => {
                debug!(name = ?event.name(), "notification");
                self.inner.dispatcher.dispatch(self.clone(), event);
            }
            EventType::Disconnect => {
                info!(address = %self.inner.address, "disconnect notice");
                self.inner.handler.on_disconnect(self, event).await;
            }
            EventType::AuthRequest | EventType::Connect => {
                warn!(kind = %event.event_type(), "unexpected frame after authentication");
            }
            EventType::Error => return Err(ClientError::UnexpectedEvent(EventType::Error)),
        }
        Ok(())
    }

    async fn request(&self, kind: ReplyKind, frame: &[u8]) -> Result<Event> {
        let queue = match kind {
            ReplyKind::Command => &self.inner.command_replies,
            ReplyKind::Api => &self.inner.api_responses,
        };

        let rx = {
            let mut guard = self.inner.writer.lock().await;
            let writer = guard
                .as_mut()
                .filter(|_| self.is_connected())
                .ok_or(ClientError::Closed)?;
            let (id, rx) = queue.register()?;
            let written = match writer.write_all(frame).await {
                Ok(()) => writer.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                queue.abandon(id);
                return Err(err.into());
            }
            rx
        };

        self.await_reply(rx).await
    }

    async fn await_reply(&self, rx: ReplyReceiver) -> Result<Event> {
        let outcome = match self.inner.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => rx.await,
        };
        outcome.map_err(|_| ClientError::Closed)?
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.inner.address)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn check_line(text: &str) -> Result<()> {
    if has_line_break(text) {
        return Err(ClientError::InvalidRequest(format!(
            "line break in {text:?}"
        )));
    }
    Ok(())
}

fn check_args<S: AsRef<str>>(args: &[S]) -> Result<()> {
    args.iter().try_for_each(|arg| check_line(arg.as_ref()))
}

fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::mock::{bind, MockSwitch};
    use crate::{connect_with_config, NoopHandler};

    #[derive(Debug, PartialEq)]
    enum Hook {
        Connect,
        Event(String),
        Disconnect,
        Close,
    }

    struct Recorder(mpsc::UnboundedSender<Hook>);

    #[async_trait]
    impl Handler for Recorder {
        async fn on_connect(&self, _conn: &Connection) {
            let _ = self.0.send(Hook::Connect);
        }

        async fn on_event(&self, _conn: &Connection, event: Event) {
            let name = event.name().map(|n| n.to_string()).unwrap_or_default();
            let _ = self.0.send(Hook::Event(name));
        }

        async fn on_disconnect(&self, _conn: &Connection, _event: Event) {
            let _ = self.0.send(Hook::Disconnect);
        }

        async fn on_close(&self, _conn: &Connection) {
            let _ = self.0.send(Hook::Close);
        }
    }

    async fn pair(config: impl FnOnce(ConnectConfig) -> ConnectConfig) -> (Connection, MockSwitch) {
        pair_with(config, NoopHandler).await
    }

    async fn pair_with(
        config: impl FnOnce(ConnectConfig) -> ConnectConfig,
        handler: impl Handler,
    ) -> (Connection, MockSwitch) {
        let (listener, address) = bind().await;
        let switch = tokio::spawn(async move { MockSwitch::accept(&listener, "ClueCon").await });
        let conn = connect_with_config(config(ConnectConfig::new(address)), handler)
            .await
            .unwrap();
        (conn, switch.await.unwrap())
    }

    fn spawn_loop(conn: &Connection) -> tokio::task::JoinHandle<Result<()>> {
        let conn = conn.clone();
        tokio::spawn(async move { conn.run().await })
    }

    #[tokio::test]
    async fn connect_authenticates() {
        let (conn, _switch) = pair(|c| c).await;

        assert!(conn.is_connected());
        assert!(conn.address().starts_with("127.0.0.1:"));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (listener, address) = bind().await;
        let switch = tokio::spawn(async move { MockSwitch::accept(&listener, "other").await });

        let err = connect_with_config(ConnectConfig::new(address), NoopHandler)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::AuthFailed(_)));
        drop(switch);
    }

    #[tokio::test]
    async fn concurrent_requests_get_their_own_replies() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let mut calls = Vec::new();
        for i in 0..8 {
            let conn = conn.clone();
            calls.push(tokio::spawn(async move {
                let tag = format!("tag-{i}");
                let reply = conn.send_recv("echo", &[tag.as_str()]).await.unwrap();
                (tag, reply.reply_text().map(|t| t.into_owned()))
            }));
        }

        for _ in 0..8 {
            let request = switch.read_request().await;
            let tag = request.trim_start_matches("echo ").to_string();
            switch.reply(&format!("+OK {tag}")).await;
        }

        for call in calls {
            let (tag, reply) = call.await.unwrap();
            assert_eq!(reply, Some(format!("+OK {tag}")));
        }

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_command_reaches_caller_and_loop_survives() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_recv("myevents", &["bogus"]).await })
        };
        assert_eq!(switch.read_request().await, "myevents bogus");
        switch.reply("-ERR invalid uuid").await;

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::CommandFailed(text) if text == "-ERR invalid uuid"));

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_recv("noevents", &[] as &[&str]).await })
        };
        assert_eq!(switch.read_request().await, "noevents");
        switch.reply("+OK no longer listening").await;
        call.await.unwrap().unwrap();
        assert!(conn.is_connected());

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn api_returns_body_verbatim_and_maps_err() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.api("status", &[] as &[&str]).await })
        };
        assert_eq!(switch.read_request().await, "api status");
        switch.api_response("UP 0 years, 1 day\n").await;
        assert_eq!(call.await.unwrap().unwrap(), "UP 0 years, 1 day\n");

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.api("nosuch", &["x"]).await })
        };
        assert_eq!(switch.read_request().await, "api nosuch x");
        switch.api_response("-ERR nosuch Command not found!\n").await;
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ApiFailed(text) if text == "-ERR nosuch Command not found!"));

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bgapi_returns_job_uuid() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.bgapi("originate", &["user/1000", "&park()"]).await })
        };
        assert_eq!(
            switch.read_request().await,
            "bgapi originate user/1000 &park()"
        );
        switch
            .send("Content-Type: command/reply\nReply-Text: +OK Job-UUID: 7f4d\nJob-UUID: 7f4d\n\n")
            .await;
        assert_eq!(call.await.unwrap().unwrap(), "7f4d");

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn execute_writes_sendmsg_block() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.execute_sync("playback", "leg-1", &["/tmp/a.wav"])
                    .await
            })
        };
        assert_eq!(
            switch.read_request().await,
            "sendmsg leg-1\ncall-command: execute\nexecute-app-name: playback\nexecute-app-arg: /tmp/a.wav\nevent-lock: true"
        );
        switch.reply("+OK").await;
        call.await.unwrap().unwrap();

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_event_writes_body() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.send_event("CUSTOM", &[("Event-Subclass", "demo::ping")], b"payload")
                    .await
            })
        };
        assert_eq!(
            switch.read_request().await,
            "sendevent CUSTOM\nEvent-Subclass: demo::ping\nContent-Length: 7"
        );
        assert_eq!(switch.read_exact(7).await, b"payload");
        switch.reply("+OK").await;
        call.await.unwrap().unwrap();

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn line_breaks_are_rejected_before_writing() {
        let (conn, _switch) = pair(|c| c).await;

        let err = conn.api("status\n\nauth x", &[] as &[&str]).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));

        let err = conn
            .execute("playback", "leg", &["a\r\nevent-lock: true"])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn hooks_fire_for_notifications_disconnect_and_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (conn, mut switch) = pair_with(|c| c, Recorder(tx)).await;
        let reader = spawn_loop(&conn);

        assert_eq!(rx.recv().await, Some(Hook::Connect));

        switch.notification("HEARTBEAT", "").await;
        assert_eq!(rx.recv().await, Some(Hook::Event("HEARTBEAT".to_string())));

        switch
            .send("Content-Type: text/disconnect-notice\nContent-Length: 0\n\n")
            .await;
        assert_eq!(rx.recv().await, Some(Hook::Disconnect));
        assert!(conn.is_connected());

        conn.close().await;
        conn.close().await;
        assert_eq!(rx.recv().await, Some(Hook::Close));
        reader.await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    struct RequestOnClose(mpsc::UnboundedSender<Result<Event>>);

    #[async_trait]
    impl Handler for RequestOnClose {
        async fn on_close(&self, conn: &Connection) {
            let _ = self.0.send(conn.send_recv("noevents", &[] as &[&str]).await);
        }
    }

    #[tokio::test]
    async fn requests_from_close_hook_fail_fast() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (conn, _switch) = pair_with(|c| c, RequestOnClose(tx)).await;

        tokio::time::timeout(Duration::from_secs(3), conn.close())
            .await
            .expect("close should not wait on its own hook");

        assert!(matches!(rx.recv().await, Some(Err(ClientError::Closed))));
    }

    #[tokio::test]
    async fn pending_requests_fail_on_close() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.api("status", &[] as &[&str]).await })
        };
        switch.read_request().await;
        conn.close().await;

        assert!(matches!(call.await.unwrap(), Err(ClientError::Closed)));
        assert!(matches!(
            conn.send_recv("noevents", &[] as &[&str]).await,
            Err(ClientError::Closed)
        ));
        assert!(!conn.is_connected());
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn timed_out_request_leaves_connection_usable() {
        let (conn, mut switch) =
            pair(|c| c.with_reply_timeout(Some(Duration::from_millis(100)))).await;
        let reader = spawn_loop(&conn);

        let err = conn
            .send_recv("slow", &[] as &[&str])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert_eq!(switch.read_request().await, "slow");

        switch.reply("+OK late").await;
        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_recv("fast", &[] as &[&str]).await })
        };
        assert_eq!(switch.read_request().await, "fast");
        switch.reply("+OK fast").await;

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply.reply_text().as_deref(), Some("+OK fast"));
        assert!(conn.is_connected());

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_content_type_is_skipped() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        switch
            .send("Content-Type: text/something-new\nContent-Length: 4\n\nabcd")
            .await;
        let call = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.api("version", &[] as &[&str]).await })
        };
        switch.read_request().await;
        switch.api_response("FreeSWITCH Version 1.10").await;

        assert_eq!(call.await.unwrap().unwrap(), "FreeSWITCH Version 1.10");
        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn peer_hangup_fails_loop_and_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (conn, switch) = pair_with(|c| c, Recorder(tx)).await;
        let reader = spawn_loop(&conn);
        assert_eq!(rx.recv().await, Some(Hook::Connect));

        drop(switch);

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Disconnected(_)));
        assert!(!conn.is_connected());
        assert_eq!(rx.recv().await, Some(Hook::Close));
    }

    #[tokio::test]
    async fn malformed_frame_is_fatal() {
        let (conn, mut switch) = pair(|c| c).await;
        let reader = spawn_loop(&conn);

        switch
            .send("Content-Type: api/response\nContent-Length: many\n\n")
            .await;

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Frame(FrameError::InvalidContentLength(_))
        ));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn run_starts_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (conn, _switch) = pair_with(|c| c, Recorder(tx)).await;
        let reader = spawn_loop(&conn);
        assert_eq!(rx.recv().await, Some(Hook::Connect));

        assert!(matches!(conn.run().await, Err(ClientError::AlreadyRunning)));

        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Handler for Arc<Gauge> {
        async fn on_event(&self, _conn: &Connection, _event: Event) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            let _ = self.done.send(());
        }
    }

    #[tokio::test]
    async fn dispatch_limit_bounds_concurrent_handlers() {
        let (done, mut finished) = mpsc::unbounded_channel();
        let gauge = Arc::new(Gauge {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            done,
        });
        let (conn, mut switch) = pair_with(|c| c.with_dispatch_limit(2), gauge.clone()).await;
        let reader = spawn_loop(&conn);

        for _ in 0..6 {
            switch.notification("CUSTOM", "").await;
        }
        for _ in 0..6 {
            finished.recv().await.unwrap();
        }

        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        conn.close().await;
        reader.await.unwrap().unwrap();
    }

    /// Answers every parked channel with a query on the same connection.
    struct ParkResponder(mpsc::UnboundedSender<Result<String>>);

    #[async_trait]
    impl Handler for ParkResponder {
        async fn on_event(&self, conn: &Connection, _event: Event) {
            let _ = self.0.send(conn.api("uuid_exists", &["x"]).await);
        }
    }

    #[tokio::test]
    async fn handler_requests_complete_while_dispatch_is_full() {
        let (tx, mut results) = mpsc::unbounded_channel();
        let (conn, mut switch) =
            pair_with(|c| c.with_dispatch_limit(1), ParkResponder(tx)).await;
        let reader = spawn_loop(&conn);

        switch.notification("CHANNEL_PARK", "Unique-ID: leg-1\n").await;
        switch.notification("CHANNEL_PARK", "Unique-ID: leg-2\n").await;

        for answer in ["false", "true"] {
            let request = tokio::time::timeout(Duration::from_secs(3), switch.read_request())
                .await
                .expect("handler request should reach the switch");
            assert_eq!(request, "api uuid_exists x");
            switch.api_response(answer).await;
        }

        assert_eq!(results.recv().await.unwrap().unwrap(), "false");
        assert_eq!(results.recv().await.unwrap().unwrap(), "true");
        assert!(conn.is_connected());

        conn.close().await;
        reader.await.unwrap().unwrap();
    }
}
