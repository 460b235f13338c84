use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Args, Subcommand};
use eslwire_client::{
    connect_with_config, ConnectConfig, Connection, Handler, DEFAULT_ADDRESS, DEFAULT_PASSWORD,
};
use eslwire_frame::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::exit::{client_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod api;
pub mod bgapi;
pub mod execute;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query and print its result.
    Api(ApiArgs),
    /// Start a background job and print its job id.
    Bgapi(BgapiArgs),
    /// Subscribe and print notifications.
    Listen(ListenArgs),
    /// Execute a dialplan application on a call leg.
    Execute(ExecuteArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, conn: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Api(args) => api::run(args, conn, format).await,
        Command::Bgapi(args) => bgapi::run(args, conn, format).await,
        Command::Listen(args) => listen::run(args, conn, format).await,
        Command::Execute(args) => execute::run(args, conn, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Connection flags shared by every subcommand that talks to the switch.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Switch event socket address (host:port).
    #[arg(long, env = "ESLWIRE_ADDRESS", default_value = DEFAULT_ADDRESS, global = true)]
    pub address: String,
    /// Event socket password.
    #[arg(
        long,
        env = "ESLWIRE_PASSWORD",
        default_value = DEFAULT_PASSWORD,
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub password: String,
    /// Dial and authentication timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s", global = true)]
    pub timeout: String,
    /// Dial attempts before giving up.
    #[arg(long, default_value_t = 3, global = true)]
    pub retries: u32,
}

impl ConnectArgs {
    pub fn config(&self) -> CliResult<ConnectConfig> {
        Ok(ConnectConfig::new(self.address.clone())
            .with_password(self.password.clone())
            .with_timeout(parse_duration(&self.timeout)?)
            .with_max_retries(self.retries))
    }
}

#[derive(Args, Debug)]
pub struct ApiArgs {
    /// Query to run (e.g. `status`, `show`).
    pub command: String,
    /// Query arguments. Use `--` before arguments that start with a hyphen.
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct BgapiArgs {
    /// Query to run in the background.
    pub command: String,
    /// Query arguments. Use `--` before arguments that start with a hyphen.
    pub args: Vec<String>,
    /// Wait for the job result and print it instead of the job id.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Event names to subscribe to (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',')]
    pub events: Option<Vec<String>>,
    /// Exit after printing N notifications.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    /// Target call leg (`Unique-ID`).
    pub uuid: String,
    /// Application name (e.g. `playback`).
    pub app: String,
    /// Application arguments.
    pub args: Vec<String>,
    /// Hold the event lock until the application finishes.
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A connected client with its read loop running on a background task.
pub struct Session {
    pub conn: Connection,
    reader: JoinHandle<eslwire_client::Result<()>>,
}

impl Session {
    pub async fn open(args: &ConnectArgs, handler: impl Handler) -> CliResult<Self> {
        let config = args.config()?;
        let conn = connect_with_config(config, handler)
            .await
            .map_err(|err| client_error("connect failed", err))?;

        let loop_conn = conn.clone();
        let reader = tokio::spawn(async move { loop_conn.run().await });
        Ok(Self { conn, reader })
    }

    /// Close the connection and surface any read loop failure.
    pub async fn finish(self) -> CliResult<()> {
        self.conn.close().await;
        match self.reader.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(client_error("read loop failed", err)),
            Err(err) => Err(CliError::new(INTERNAL, format!("read loop panicked: {err}"))),
        }
    }
}

/// Forwards every notification into a channel; the channel ends when the
/// connection closes.
pub struct EventSink(Mutex<Option<mpsc::UnboundedSender<Event>>>);

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Mutex::new(Some(tx))), rx)
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Event>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Handler for EventSink {
    async fn on_event(&self, _conn: &Connection, event: Event) {
        if let Some(tx) = self.sender().as_ref() {
            let _ = tx.send(event);
        }
    }

    async fn on_close(&self, _conn: &Connection) {
        self.sender().take();
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
