use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatprims_frame::DEFAULT_MAX_BUFFER_SIZE;
use chatprims_peer::DEFAULT_MAX_PEERS;
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod client;
pub mod server;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a chat server that relays every line to all other peers.
    Server(ServerArgs),
    /// Connect to a chat server, send lines and print what arrives.
    Client(ClientArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, format),
        Command::Client(args) => client::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// TCP port to listen on (0 picks a free port).
    #[arg(long, short = 'p', default_value_t = 0)]
    pub port: u16,
    /// Connections beyond this count are closed immediately.
    #[arg(long, default_value_t = DEFAULT_MAX_PEERS)]
    pub max_peers: usize,
    /// Per-peer buffer limit in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_BUFFER_SIZE)]
    pub max_buffer: usize,
    /// Longest single wait for socket activity (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server address as host:port.
    pub address: String,
    /// Line to send; repeat for several. Without it, lines are read from stdin.
    #[arg(long = "send", value_name = "TEXT")]
    pub send: Vec<String>,
    /// Exit after printing N received messages.
    #[arg(long, value_name = "N")]
    pub exit_after: Option<usize>,
    /// How long to wait for --send lines to reach the server (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
