use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Generation id of the runtime that owns a connection.
pub type InstanceId = u64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Socket activity reported back to the owning runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Data(Vec<u8>),
    /// The connection attempt did not complete in time.
    TimedOut,
    Closed,
}

/// A connection event tagged with the runtime it belongs to, so replies from
/// an abandoned runtime can be told apart from current ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEnvelope {
    pub instance: InstanceId,
    pub event: ConnectionEvent,
}

/// Byte pipe to the interpreter server. Implementations report progress
/// asynchronously as [`WireEnvelope`]s; none of the calls block on the network.
pub trait Transport: Send {
    fn connect(&mut self, instance: InstanceId, host: &str, port: u16, timeout: Duration);

    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn shutdown(&mut self);
}

/// Builds a fresh transport for each runtime.
pub type TransportFactory = Box<dyn FnMut() -> Box<dyn Transport>>;

/// TCP transport with one reader thread per connection. Events are forwarded
/// into any channel whose item type can be built from a [`WireEnvelope`].
pub struct TcpTransport<T> {
    notify: Sender<T>,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl<T> TcpTransport<T>
where
    T: From<WireEnvelope> + Send + 'static,
{
    pub fn new(notify: Sender<T>) -> Self {
        Self {
            notify,
            stream: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> Transport for TcpTransport<T>
where
    T: From<WireEnvelope> + Send + 'static,
{
    fn connect(&mut self, instance: InstanceId, host: &str, port: u16, timeout: Duration) {
        let host = if host.is_empty() { "127.0.0.1" } else { host }.to_string();
        let notify = self.notify.clone();
        let shared = Arc::clone(&self.stream);

        let spawned = thread::Builder::new()
            .name(format!("cscs-wire-{}", instance))
            .spawn(move || {
                let send = |event: ConnectionEvent| {
                    notify
                        .send(T::from(WireEnvelope { instance, event }))
                        .is_ok()
                };

                let mut stream = match open_stream(&host, port, timeout) {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::warn!("connection to {}:{} failed: {}", host, port, e);
                        if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                            send(ConnectionEvent::TimedOut);
                        }
                        send(ConnectionEvent::Closed);
                        return;
                    }
                };

                match stream.try_clone() {
                    Ok(writer) => {
                        if let Ok(mut slot) = shared.lock() {
                            *slot = Some(writer);
                        }
                    }
                    Err(e) => {
                        log::error!("could not clone socket for writing: {}", e);
                        send(ConnectionEvent::Closed);
                        return;
                    }
                }

                if !send(ConnectionEvent::Connected) {
                    return;
                }

                let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                loop {
                    match stream.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            if !send(ConnectionEvent::Data(buffer[..n].to_vec())) {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::debug!("read from {}:{} ended: {}", host, port, e);
                            break;
                        }
                    }
                }

                if let Ok(mut slot) = shared.lock() {
                    slot.take();
                }
                send(ConnectionEvent::Closed);
            });

        if let Err(e) = spawned {
            log::error!("could not spawn connection thread: {}", e);
            let _ = self.notify.send(T::from(WireEnvelope {
                instance,
                event: ConnectionEvent::Closed,
            }));
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut slot = self
            .stream
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "socket lock poisoned"))?;
        match slot.as_mut() {
            Some(stream) => {
                stream.write_all(bytes)?;
                stream.flush()
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "socket is closed")),
        }
    }

    fn shutdown(&mut self) {
        if let Ok(mut slot) = self.stream.lock() {
            if let Some(stream) = slot.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}

fn open_stream(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no address")
    }))
}
