//! Outbound request grammars.
//!
//! Every request is a header-style block terminated by a blank line. The
//! encoders here never fail; callers reject line breaks in request text with
//! [`has_line_break`] before encoding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::event::{EventName, HEADER_CONTENT_LENGTH};

/// One "execute application on a call leg" request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Target call leg. Empty targets the leg bound to the socket.
    pub uuid: String,
    /// Dialplan application name.
    pub app: String,
    /// Application argument string.
    pub args: String,
    /// Hold the channel's event lock until the application finishes.
    pub sync: bool,
}

impl Command {
    pub fn new(uuid: impl Into<String>, app: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            app: app.into(),
            args: args.into(),
            sync: false,
        }
    }

    /// Same command with event-lock set.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Append the wire form of this command to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(96 + self.uuid.len() + self.app.len() + self.args.len());
        dst.put_slice(b"sendmsg");
        if !self.uuid.is_empty() {
            dst.put_u8(b' ');
            dst.put_slice(self.uuid.as_bytes());
        }
        dst.put_slice(b"\ncall-command: execute\nexecute-app-name: ");
        dst.put_slice(self.app.as_bytes());
        dst.put_slice(b"\nexecute-app-arg: ");
        dst.put_slice(self.args.as_bytes());
        dst.put_slice(if self.sync {
            b"\nevent-lock: true\n\n".as_slice()
        } else {
            b"\nevent-lock: false\n\n".as_slice()
        });
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }

    /// Whether any field would break the line grammar.
    pub fn has_line_break(&self) -> bool {
        [&self.uuid, &self.app, &self.args]
            .iter()
            .any(|field| has_line_break(field))
    }
}

/// Whether `text` contains a carriage return or line feed.
pub fn has_line_break(text: &str) -> bool {
    text.contains(['\r', '\n'])
}

/// Plain command: `<command> <args...>` followed by a blank line.
pub fn encode_command<S: AsRef<str>>(command: &str, args: &[S], dst: &mut BytesMut) {
    dst.put_slice(command.as_bytes());
    for arg in args {
        dst.put_u8(b' ');
        dst.put_slice(arg.as_ref().as_bytes());
    }
    dst.put_slice(b"\n\n");
}

pub fn encode_auth(password: &str, dst: &mut BytesMut) {
    encode_command("auth", &[password], dst);
}

/// Query whose answer arrives as the body of an `api/response` frame.
pub fn encode_api<S: AsRef<str>>(command: &str, args: &[S], dst: &mut BytesMut) {
    encode_prefixed("api", command, args, dst);
}

/// Background query; the immediate reply carries a `Job-UUID`.
pub fn encode_bgapi<S: AsRef<str>>(command: &str, args: &[S], dst: &mut BytesMut) {
    encode_prefixed("bgapi", command, args, dst);
}

/// `event plain <NAME...>`; an empty list subscribes to everything.
pub fn encode_subscribe(names: &[EventName], dst: &mut BytesMut) {
    dst.put_slice(b"event plain");
    if names.is_empty() {
        dst.put_slice(b" ");
        dst.put_slice(EventName::All.as_str().as_bytes());
    }
    for name in names {
        dst.put_u8(b' ');
        dst.put_slice(name.as_str().as_bytes());
    }
    dst.put_slice(b"\n\n");
}

/// Custom event injection: header lines, a length header, then the raw body.
pub fn encode_send_event<K, V>(name: &str, headers: &[(K, V)], body: &[u8], dst: &mut BytesMut)
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    dst.put_slice(b"sendevent ");
    dst.put_slice(name.as_bytes());
    dst.put_u8(b'\n');
    for (key, value) in headers {
        dst.put_slice(key.as_ref().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref().as_bytes());
        dst.put_u8(b'\n');
    }
    dst.put_slice(format!("{HEADER_CONTENT_LENGTH}: {}\n\n", body.len()).as_bytes());
    dst.put_slice(body);
}

fn encode_prefixed<S: AsRef<str>>(prefix: &str, command: &str, args: &[S], dst: &mut BytesMut) {
    dst.put_slice(prefix.as_bytes());
    dst.put_u8(b' ');
    encode_command(command, args, dst);
}
