mod host;
mod messages;
mod terminal;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ConnectionConfig;
use crate::debugger::SessionRegistry;
use crate::error::Result;
use crate::wire::{TcpTransport, Transport, TransportFactory, WireEnvelope};

pub use host::{strip_response_tag, History, ReplHost, DEFAULT_HISTORY_FILE, NO_RESPONSE};
pub use messages::{WebviewCommand, WebviewEvent};
pub use terminal::{MetaCommand, TerminalRepl};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum HostInput {
    Front(WebviewCommand),
    FrontClosed,
    Wire(WireEnvelope),
}

impl From<WireEnvelope> for HostInput {
    fn from(envelope: WireEnvelope) -> Self {
        HostInput::Wire(envelope)
    }
}

/// Serve a REPL front end speaking one JSON message per line on stdin and
/// stdout.
pub fn run_webview(config: ConnectionConfig) -> Result<()> {
    config.validate()?;
    let (tx, rx) = mpsc::channel::<HostInput>();

    let front_tx = tx.clone();
    thread::Builder::new()
        .name("repl-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("failed to read front end message: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WebviewCommand>(&line) {
                    Ok(command) => {
                        if front_tx.send(HostInput::Front(command)).is_err() {
                            return;
                        }
                    }
                    Err(e) => log::warn!("ignoring front end message {:?}: {}", line, e),
                }
            }
            let _ = front_tx.send(HostInput::FrontClosed);
        })?;

    let wire_tx = tx.clone();
    let transports: TransportFactory =
        Box::new(move || Box::new(TcpTransport::new(wire_tx.clone())) as Box<dyn Transport>);
    let mut host = ReplHost::new(config, Arc::new(SessionRegistry::new()), transports);
    drop(tx);

    let stdout = io::stdout();
    loop {
        let events = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(HostInput::Front(command)) => host.handle(command, Instant::now()),
            Ok(HostInput::Wire(envelope)) => host.handle_wire(envelope),
            Ok(HostInput::FrontClosed) => break,
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut out = stdout.lock();
        for event in events
            .into_iter()
            .chain(host.poll_timeouts(Instant::now()))
        {
            serde_json::to_writer(&mut out, &event)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }

    Ok(())
}
