use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatprims_peer::{ChatError, ChatServer, PendingEvents, ServerConfig};

use crate::cmd::{install_ctrlc_handler, parse_duration, ServerArgs};
use crate::exit::{chat_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(args: ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let tick = parse_duration(&args.timeout)?;
    if args.max_peers == 0 {
        return Err(CliError::new(USAGE, "--max-peers must be greater than zero"));
    }

    let mut server = ChatServer::with_config(ServerConfig {
        max_peers: args.max_peers,
        max_buffer_size: args.max_buffer,
        ..ServerConfig::default()
    });
    server
        .listen(args.port)
        .map_err(|err| chat_error("listen failed", err))?;
    if let Some(addr) = server.local_addr() {
        tracing::info!(%addr, "accepting chat peers");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match server.update(Some(tick)) {
            Ok(()) | Err(ChatError::Timeout) => {}
            Err(err) => return Err(chat_error("update failed", err)),
        }

        while let Some(message) = server.pop_next() {
            print_message(&message, "server", format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                drain_output(&mut server);
                return Ok(SUCCESS);
            }
        }
    }

    tracing::info!(peers = server.peer_count(), "shutting down");
    Ok(SUCCESS)
}

/// Give queued relays a short chance to go out before exiting.
fn drain_output(server: &mut ChatServer) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while server.pending_events().contains(PendingEvents::OUTPUT) && Instant::now() < deadline {
        if let Err(err) = server.update(Some(Duration::from_millis(10))) {
            if !err.is_timeout() {
                tracing::warn!(error = %err, "drain interrupted");
                return;
            }
        }
    }
}
