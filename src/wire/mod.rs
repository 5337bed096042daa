mod connection;
mod framer;
mod transport;

pub use connection::SessionConnection;
pub use framer::{
    Command, FileAssembler, FileChunk, ReceivedFile, ResponseAssembler, ResponseTag,
    FILE_SEND_TAG,
};
pub use transport::{
    ConnectionEvent, InstanceId, TcpTransport, Transport, TransportFactory, WireEnvelope,
};
