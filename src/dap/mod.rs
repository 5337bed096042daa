mod protocol;
mod server;

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::debugger::SessionRegistry;
use crate::error::Result;
use crate::wire::{TcpTransport, Transport, TransportFactory, WireEnvelope};

pub use protocol::{
    DapMessage, DapMessageContent, EvaluateArguments, LaunchArguments, SetBreakpointsArguments,
};
pub use server::{read_message, DapServer};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the adapter loop reacts to, in arrival order.
#[derive(Debug)]
pub enum AdapterInput {
    Client(DapMessage),
    ClientClosed,
    Wire(WireEnvelope),
}

impl From<WireEnvelope> for AdapterInput {
    fn from(envelope: WireEnvelope) -> Self {
        AdapterInput::Wire(envelope)
    }
}

/// Serve DAP over stdin/stdout until the client disconnects.
pub fn run_dap_mode() -> Result<()> {
    log::info!("DAP server starting");

    let (tx, rx) = mpsc::channel::<AdapterInput>();

    let client_tx = tx.clone();
    thread::Builder::new()
        .name("dap-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut handle = stdin.lock();
            loop {
                match read_message(&mut handle) {
                    Ok(Some(msg)) => {
                        if client_tx.send(AdapterInput::Client(msg)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::debug!("client closed stdin");
                        let _ = client_tx.send(AdapterInput::ClientClosed);
                        break;
                    }
                    Err(e) => {
                        log::error!("failed to read DAP message: {}", e);
                        let _ = client_tx.send(AdapterInput::ClientClosed);
                        break;
                    }
                }
            }
        })?;

    let registry = Arc::new(SessionRegistry::new());
    let wire_tx = tx.clone();
    let transports: TransportFactory =
        Box::new(move || Box::new(TcpTransport::new(wire_tx.clone())) as Box<dyn Transport>);
    let mut server = DapServer::new(io::stdout(), registry, transports);
    drop(tx);

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(AdapterInput::Client(msg)) => {
                if !server.dispatch(msg) {
                    break;
                }
            }
            Ok(AdapterInput::Wire(envelope)) => server.handle_wire(envelope),
            Ok(AdapterInput::ClientClosed) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        server.poll(Instant::now());
    }

    log::info!("DAP server exiting");
    Ok(())
}
