use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::codec::split_header_block;
use crate::error::{FrameError, Result};
use crate::headers::HeaderMap;

pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";
pub const CONTENT_TYPE_RUDE_REJECTION: &str = "text/rude-rejection";

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
pub const HEADER_JOB_UUID: &str = "Job-UUID";

/// Classification of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Error,
    AuthRequest,
    Connect,
    CommandReply,
    ApiResponse,
    Disconnect,
    GenericNotification,
}

impl EventType {
    /// Classify a frame by its `Content-Type` value.
    ///
    /// Every input has an outcome: JSON and XML event bodies are rejected with
    /// [`FrameError::UnsupportedFormat`], and unrecognized values classify as
    /// [`EventType::Error`].
    pub fn classify(content_type: &str) -> Result<Self> {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => Ok(EventType::AuthRequest),
            CONTENT_TYPE_COMMAND_REPLY => Ok(EventType::CommandReply),
            CONTENT_TYPE_EVENT_PLAIN => Ok(EventType::GenericNotification),
            CONTENT_TYPE_EVENT_JSON | CONTENT_TYPE_EVENT_XML => {
                Err(FrameError::UnsupportedFormat(content_type.to_string()))
            }
            CONTENT_TYPE_DISCONNECT_NOTICE | CONTENT_TYPE_RUDE_REJECTION => {
                Ok(EventType::Disconnect)
            }
            CONTENT_TYPE_API_RESPONSE => Ok(EventType::ApiResponse),
            _ => Ok(EventType::Error),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Error => "error",
            EventType::AuthRequest => "auth-request",
            EventType::Connect => "connect",
            EventType::CommandReply => "command-reply",
            EventType::ApiResponse => "api-response",
            EventType::Disconnect => "disconnect",
            EventType::GenericNotification => "generic-notification",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! event_names {
    ($($variant:ident => $wire:literal,)+) => {
        /// Switch event name carried in a notification's `Event-Name` header.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum EventName {
            /// Any name not in the fixed list.
            #[default]
            Unknown,
            $($variant,)+
        }

        impl EventName {
            /// Every named tag, in wire-list order.
            pub const KNOWN: &'static [EventName] = &[$(EventName::$variant,)+];

            /// Total lookup from a wire name; unrecognized names map to
            /// [`EventName::Unknown`].
            pub fn from_wire(name: &str) -> Self {
                match name {
                    $($wire => EventName::$variant,)+
                    _ => EventName::Unknown,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    EventName::Unknown => "UNKNOWN",
                    $(EventName::$variant => $wire,)+
                }
            }
        }
    };
}

event_names! {
    Custom => "CUSTOM",
    Clone => "CLONE",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelDestroy => "CHANNEL_DESTROY",
    ChannelState => "CHANNEL_STATE",
    ChannelCallstate => "CHANNEL_CALLSTATE",
    ChannelAnswer => "CHANNEL_ANSWER",
    ChannelHangup => "CHANNEL_HANGUP",
    ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
    ChannelExecute => "CHANNEL_EXECUTE",
    ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
    ChannelHold => "CHANNEL_HOLD",
    ChannelUnhold => "CHANNEL_UNHOLD",
    ChannelBridge => "CHANNEL_BRIDGE",
    ChannelUnbridge => "CHANNEL_UNBRIDGE",
    ChannelProgress => "CHANNEL_PROGRESS",
    ChannelProgressMedia => "CHANNEL_PROGRESS_MEDIA",
    ChannelOutgoing => "CHANNEL_OUTGOING",
    ChannelPark => "CHANNEL_PARK",
    ChannelUnpark => "CHANNEL_UNPARK",
    ChannelApplication => "CHANNEL_APPLICATION",
    ChannelOriginate => "CHANNEL_ORIGINATE",
    ChannelUuid => "CHANNEL_UUID",
    Api => "API",
    Log => "LOG",
    InboundChan => "INBOUND_CHAN",
    OutboundChan => "OUTBOUND_CHAN",
    Startup => "STARTUP",
    Shutdown => "SHUTDOWN",
    Publish => "PUBLISH",
    Unpublish => "UNPUBLISH",
    Talk => "TALK",
    Notalk => "NOTALK",
    SessionCrash => "SESSION_CRASH",
    ModuleLoad => "MODULE_LOAD",
    ModuleUnload => "MODULE_UNLOAD",
    Dtmf => "DTMF",
    Message => "MESSAGE",
    PresenceIn => "PRESENCE_IN",
    NotifyIn => "NOTIFY_IN",
    PresenceOut => "PRESENCE_OUT",
    PresenceProbe => "PRESENCE_PROBE",
    MessageWaiting => "MESSAGE_WAITING",
    MessageQuery => "MESSAGE_QUERY",
    Roster => "ROSTER",
    Codec => "CODEC",
    BackgroundJob => "BACKGROUND_JOB",
    DetectedSpeech => "DETECTED_SPEECH",
    DetectedTone => "DETECTED_TONE",
    PrivateCommand => "PRIVATE_COMMAND",
    Heartbeat => "HEARTBEAT",
    Trap => "TRAP",
    AddSchedule => "ADD_SCHEDULE",
    DelSchedule => "DEL_SCHEDULE",
    ExeSchedule => "EXE_SCHEDULE",
    ReSchedule => "RE_SCHEDULE",
    ReloadXml => "RELOADXML",
    Notify => "NOTIFY",
    PhoneFeature => "PHONE_FEATURE",
    PhoneFeatureSubscribe => "PHONE_FEATURE_SUBSCRIBE",
    SendMessage => "SEND_MESSAGE",
    RecvMessage => "RECV_MESSAGE",
    RequestParams => "REQUEST_PARAMS",
    ChannelData => "CHANNEL_DATA",
    General => "GENERAL",
    Command => "COMMAND",
    SessionHeartbeat => "SESSION_HEARTBEAT",
    ClientDisconnected => "CLIENT_DISCONNECTED",
    ServerDisconnected => "SERVER_DISCONNECTED",
    SendInfo => "SEND_INFO",
    RecvInfo => "RECV_INFO",
    RecvRtcpMessage => "RECV_RTCP_MESSAGE",
    CallSecure => "CALL_SECURE",
    Nat => "NAT",
    RecordStart => "RECORD_START",
    RecordStop => "RECORD_STOP",
    PlaybackStart => "PLAYBACK_START",
    PlaybackStop => "PLAYBACK_STOP",
    CallUpdate => "CALL_UPDATE",
    Failure => "FAILURE",
    SocketData => "SOCKET_DATA",
    MediaBugStart => "MEDIA_BUG_START",
    MediaBugStop => "MEDIA_BUG_STOP",
    ConferenceDataQuery => "CONFERENCE_DATA_QUERY",
    ConferenceData => "CONFERENCE_DATA",
    CallSetupReq => "CALL_SETUP_REQ",
    CallSetupResult => "CALL_SETUP_RESULT",
    CallDetail => "CALL_DETAIL",
    DeviceState => "DEVICE_STATE",
    All => "ALL",
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::from_wire(name)
    }
}

impl Serialize for EventName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Fields derived from the nested header block of a `text/event-plain` body.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Nested body headers (percent-escaped on the wire).
    pub headers: HeaderMap,
    /// Call-leg identifier (`Unique-ID`).
    pub unique_id: String,
    /// Event name tag (`Event-Name`).
    pub name: EventName,
    /// Application name (`Application`).
    pub application: String,
    /// Trimmed application argument (`Application-Data`).
    pub application_data: String,
    /// `Event-Date-Timestamp`, microseconds since the epoch.
    pub timestamp: i64,
    text_body: Option<Bytes>,
}

impl Notification {
    /// Parse a notification body: a nested header block, optionally followed
    /// by a text body sized by the nested `Content-Length`.
    pub fn parse(body: &Bytes) -> Result<Self> {
        let (block, rest) = match split_header_block(body) {
            Some((header_len, consumed)) => (&body[..header_len], body.slice(consumed..)),
            None => (&body[..], Bytes::new()),
        };

        let mut headers =
            HeaderMap::parse(block).map_err(|err| FrameError::InvalidEventBody(err.to_string()))?;
        headers.set_escaped(true);

        let text_body = match headers.get(HEADER_CONTENT_LENGTH) {
            Some(len) => {
                let len: usize = len.trim().parse().map_err(|_| {
                    FrameError::InvalidEventBody(format!("invalid content-length {len:?}"))
                })?;
                if len > rest.len() {
                    return Err(FrameError::InvalidEventBody(format!(
                        "text body shorter than declared ({} of {len} bytes)",
                        rest.len()
                    )));
                }
                Some(rest.slice(..len))
            }
            None => None,
        };

        let stamp = headers.get("Event-Date-Timestamp").unwrap_or_default();
        let timestamp = stamp.trim().parse::<i64>().map_err(|_| {
            FrameError::InvalidEventBody(format!("invalid Event-Date-Timestamp {stamp:?}"))
        })?;

        Ok(Self {
            unique_id: header_string(&headers, "Unique-ID"),
            name: headers
                .get("Event-Name")
                .map(|name| EventName::from_wire(&name))
                .unwrap_or_default(),
            application: header_string(&headers, "Application"),
            application_data: header_string(&headers, "Application-Data")
                .trim()
                .to_string(),
            timestamp,
            text_body,
            headers,
        })
    }

    /// The text body following the nested header block, if one was declared.
    pub fn text_body(&self) -> Option<Cow<'_, str>> {
        self.text_body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body))
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(Cow::into_owned)
        .unwrap_or_default()
}

/// One decoded protocol frame.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: EventType,
    headers: HeaderMap,
    body: Option<Bytes>,
    notification: Option<Notification>,
}

impl Event {
    pub(crate) fn new(
        event_type: EventType,
        headers: HeaderMap,
        body: Option<Bytes>,
        notification: Option<Notification>,
    ) -> Self {
        debug_assert_eq!(
            notification.is_some(),
            event_type == EventType::GenericNotification
        );
        Self {
            event_type,
            headers,
            body,
            notification,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Outer frame headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body, present only when the frame declared a `Content-Length`.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Raw body as text (lossy), or an empty string when absent.
    pub fn body_text(&self) -> Cow<'_, str> {
        self.body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body))
            .unwrap_or_default()
    }

    /// Notification fields; `Some` only for generic notifications.
    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    /// Look `name` up in the outer headers, then in the notification body.
    /// The value is returned unescaped.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers.get(name).or_else(|| {
            self.notification
                .as_ref()
                .and_then(|notification| notification.headers.get(name))
        })
    }

    pub fn content_type(&self) -> Option<Cow<'_, str>> {
        self.headers.get(HEADER_CONTENT_TYPE)
    }

    pub fn reply_text(&self) -> Option<Cow<'_, str>> {
        self.headers.get(HEADER_REPLY_TEXT)
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.notification.as_ref().map(|n| n.unique_id.as_str())
    }

    pub fn name(&self) -> Option<EventName> {
        self.notification.as_ref().map(|n| n.name)
    }

    pub fn application(&self) -> Option<&str> {
        self.notification.as_ref().map(|n| n.application.as_str())
    }

    pub fn application_data(&self) -> Option<&str> {
        self.notification
            .as_ref()
            .map(|n| n.application_data.as_str())
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.notification.as_ref().map(|n| n.timestamp)
    }

    pub fn text_body(&self) -> Option<Cow<'_, str>> {
        self.notification.as_ref().and_then(Notification::text_body)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headers)?;
        match &self.notification {
            Some(notification) => {
                write!(f, "\n.\n{}", notification.headers)?;
                if let Some(text) = notification.text_body() {
                    write!(f, "\n\n{text}")?;
                }
            }
            None => {
                if let Some(body) = &self.body {
                    write!(f, "\n.\n{}", String::from_utf8_lossy(body))?;
                }
            }
        }
        Ok(())
    }
}
