use std::collections::VecDeque;
use std::time::Duration;

use super::framer::{Command, FileAssembler, ResponseAssembler};
use super::transport::{InstanceId, Transport};

/// One connection to the interpreter server. Commands issued before the
/// socket is up are queued and flushed in order once it connects.
pub struct SessionConnection {
    instance: InstanceId,
    transport: Box<dyn Transport>,
    queued: VecDeque<Command>,
    responses: ResponseAssembler,
    files: FileAssembler,
    connecting: bool,
    connected: bool,
}

impl SessionConnection {
    pub fn new(instance: InstanceId, transport: Box<dyn Transport>) -> Self {
        Self {
            instance,
            transport,
            queued: VecDeque::new(),
            responses: ResponseAssembler::new(),
            files: FileAssembler::new(),
            connecting: false,
            connected: false,
        }
    }

    /// Start connecting unless a connection is already up or in progress.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Duration) {
        if self.connected || self.connecting {
            return;
        }
        log::info!("connecting to {}:{} (timeout {:?})", host, port, timeout);
        self.connecting = true;
        self.transport.connect(self.instance, host, port, timeout);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Write a command, or queue it while disconnected.
    pub fn send(&mut self, command: Command) {
        if !self.connected {
            log::debug!("queueing [{}] until connected", command);
            self.queued.push_back(command);
            return;
        }
        log::debug!("sending [{}]", command);
        if let Err(e) = self.transport.write(command.encode().as_bytes()) {
            log::error!("failed to send [{}]: {}", command, e);
        }
    }

    pub fn mark_connected(&mut self) {
        self.connecting = false;
        self.connected = true;
    }

    pub fn flush_queue(&mut self) {
        while let Some(command) = self.queued.pop_front() {
            self.send(command);
        }
    }

    pub fn queued(&self) -> impl Iterator<Item = &Command> {
        self.queued.iter()
    }

    /// Run a raw socket chunk through length-prefixed reassembly.
    pub fn receive(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.responses.push(chunk)
    }

    pub fn files(&mut self) -> &mut FileAssembler {
        &mut self.files
    }

    /// The socket went away on its own.
    pub fn mark_closed(&mut self) {
        self.connecting = false;
        self.connected = false;
    }

    /// Tear the socket down from our side.
    pub fn close(&mut self) {
        self.mark_closed();
        self.transport.shutdown();
    }
}
