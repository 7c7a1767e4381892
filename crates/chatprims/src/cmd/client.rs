use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chatprims_frame::{LineFramer, Message};
use chatprims_peer::{ChatClient, ChatError, ConnectionState, PendingEvents};
use chatprims_transport::{Events, Poller, Registration, Token};
use mio::unix::SourceFd;
use mio::Waker;

use crate::cmd::{install_ctrlc_handler, parse_duration, ClientArgs};
use crate::exit::{chat_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

const TICK: Duration = Duration::from_millis(100);
const STDIN_CHUNK: usize = 4096;

const SOCKET: Token = Token(0);
const STDIN: Token = Token(1);

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let send_timeout = parse_duration(&args.timeout)?;
    let outgoing = args
        .send
        .iter()
        .map(|text| {
            Message::new(text.clone())
                .map_err(|err| CliError::new(USAGE, format!("invalid --send value {text:?}: {err}")))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let mut client = ChatClient::new();
    client
        .connect(&args.address)
        .map_err(|err| chat_error("connect failed", err))?;
    let origin = client
        .peer_addr()
        .map_or_else(|| args.address.clone(), |addr| addr.to_string());

    for message in &outgoing {
        send_message(&mut client, message)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut readiness = Readiness::new()?;
    // Lines typed on stdin are framed locally so blank lines never go out.
    let mut stdin = if outgoing.is_empty() {
        Some((LineFramer::new(), spawn_stdin_reader(readiness.waker()?)?))
    } else {
        None
    };
    let started = Instant::now();
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let delivered = client.state() == Some(ConnectionState::Open)
            && !client.pending_events().contains(PendingEvents::OUTPUT);

        if let Some(limit) = args.exit_after {
            if printed >= limit {
                return Ok(SUCCESS);
            }
        } else if stdin.is_none() && delivered {
            return Ok(SUCCESS);
        }
        if !outgoing.is_empty() && !delivered && started.elapsed() >= send_timeout {
            return Err(CliError::new(
                TIMEOUT,
                format!("timed out sending to {origin}"),
            ));
        }

        readiness.wait(&client)?;
        if let Some((framer, lines)) = stdin.as_mut() {
            if !pump_stdin(&mut client, framer, lines)? {
                stdin = None;
            }
        }

        let update = client.update(Some(Duration::ZERO));
        while let Some(message) = client.pop_next() {
            print_message(&message, &origin, format);
            printed = printed.saturating_add(1);
        }
        match update {
            Ok(()) | Err(ChatError::Timeout) => {}
            Err(err) => return Err(chat_error("connection lost", err)),
        }
    }

    Ok(SUCCESS)
}

fn send_message(client: &mut ChatClient, message: &Message) -> CliResult<()> {
    let mut line = Vec::with_capacity(message.len() + 1);
    line.extend_from_slice(message.as_bytes());
    line.push(b'\n');
    client
        .feed(&line)
        .map_err(|err| chat_error("send failed", err))
}

/// What the stdin reader thread hands to the event loop.
#[derive(Debug)]
enum StdinEvent {
    Data(Vec<u8>),
    Closed,
    Failed(io::Error),
}

/// Read stdin on its own thread, waking the event loop after every chunk.
/// Stdin may be a regular file, which cannot be registered for readiness.
fn spawn_stdin_reader(waker: Arc<Waker>) -> CliResult<Receiver<StdinEvent>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut input = io::stdin().lock();
            let mut chunk = [0u8; STDIN_CHUNK];
            loop {
                let event = match input.read(&mut chunk) {
                    Ok(0) => StdinEvent::Closed,
                    Ok(n) => StdinEvent::Data(chunk[..n].to_vec()),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => StdinEvent::Failed(err),
                };
                let last = !matches!(event, StdinEvent::Data(_));
                if tx.send(event).is_err() {
                    return;
                }
                if let Err(err) = waker.wake() {
                    tracing::debug!(error = %err, "failed to wake event loop");
                }
                if last {
                    return;
                }
            }
        })
        .map_err(|err| io_error("failed to start stdin reader", err))?;
    Ok(rx)
}

/// Send every completed line stdin has produced so far.
///
/// Returns `false` at end of input, after sending any unterminated last line.
fn pump_stdin(
    client: &mut ChatClient,
    framer: &mut LineFramer,
    input: &Receiver<StdinEvent>,
) -> CliResult<bool> {
    loop {
        match input.try_recv() {
            Ok(StdinEvent::Data(chunk)) => {
                let lines = framer
                    .feed(&chunk)
                    .map_err(|err| CliError::new(USAGE, format!("stdin line rejected: {err}")))?;
                for message in &lines {
                    send_message(client, message)?;
                }
            }
            Ok(StdinEvent::Closed) | Err(TryRecvError::Disconnected) => {
                if let Ok(last) = Message::new(framer.pending().to_vec()) {
                    send_message(client, &last)?;
                }
                framer.reset();
                tracing::debug!("stdin closed");
                return Ok(false);
            }
            Ok(StdinEvent::Failed(err)) => return Err(io_error("stdin read failed", err)),
            Err(TryRecvError::Empty) => return Ok(true),
        }
    }
}

/// The CLI's own poll set: the client socket plus the stdin waker.
struct Readiness {
    poller: Poller,
    events: Events,
    socket: Option<Registration>,
}

impl Readiness {
    fn new() -> CliResult<Self> {
        let poller = Poller::new().map_err(|err| chat_error("poll setup failed", err.into()))?;
        Ok(Self {
            poller,
            events: Events::with_capacity(2),
            socket: None,
        })
    }

    fn waker(&self) -> CliResult<Arc<Waker>> {
        Waker::new(self.poller.registry(), STDIN)
            .map(Arc::new)
            .map_err(|err| io_error("poll setup failed", err))
    }

    /// Block for at most one tick on what the client is waiting for, or
    /// until the stdin reader has something.
    fn wait(&mut self, client: &ChatClient) -> CliResult<()> {
        let watch = client
            .descriptor()
            .zip(client.pending_events().to_interest());
        if let Some((fd, interest)) = watch {
            let mut source = SourceFd(&fd);
            match self.socket.as_mut() {
                Some(registration) => {
                    registration
                        .set_interest(&self.poller, &mut source, interest)
                        .map_err(|err| chat_error("poll failed", err.into()))?;
                }
                None => {
                    let registration =
                        Registration::new(&self.poller, &mut source, SOCKET, interest)
                            .map_err(|err| chat_error("poll failed", err.into()))?;
                    self.socket = Some(registration);
                }
            }
        }

        self.poller
            .wait(&mut self.events, Some(TICK))
            .map_err(|err| chat_error("poll failed", err.into()))?;
        Ok(())
    }
}
