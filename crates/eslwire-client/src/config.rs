use std::fmt;
use std::time::Duration;

use eslwire_frame::FrameConfig;

/// Default switch address for the inbound event socket.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8021";
/// Default event socket password.
pub const DEFAULT_PASSWORD: &str = "ClueCon";
/// Default per-attempt dial timeout, also bounding authentication.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default number of dial attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default number of notification handlers allowed to run at once.
pub const DEFAULT_DISPATCH_LIMIT: usize = 64;

/// Connection settings.
#[derive(Clone)]
pub struct ConnectConfig {
    /// `host:port` of the switch.
    pub address: String,
    /// Shared secret sent with `auth`.
    /// Never printed by the `Debug` impl.
    pub password: String,
    /// Timeout for each dial attempt and for the whole handshake.
    pub timeout: Duration,
    /// Dial attempts before giving up. Zero is treated as one.
    pub max_retries: u32,
    /// Upper bound on concurrently running notification handlers.
    pub dispatch_limit: usize,
    /// Optional bound on how long a request waits for its reply.
    pub reply_timeout: Option<Duration>,
    /// Decoder limits.
    pub frame: FrameConfig,
}

impl ConnectConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dispatch_limit(mut self, limit: usize) -> Self {
        self.dispatch_limit = limit;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Number of dial attempts actually made.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            dispatch_limit: DEFAULT_DISPATCH_LIMIT,
            reply_timeout: None,
            frame: FrameConfig::default(),
        }
    }
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("address", &self.address)
            .field(
                "password",
                &format_args!("<redacted:{} bytes>", self.password.len()),
            )
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("dispatch_limit", &self.dispatch_limit)
            .field("reply_timeout", &self.reply_timeout)
            .field("frame", &self.frame)
            .finish()
    }
}
