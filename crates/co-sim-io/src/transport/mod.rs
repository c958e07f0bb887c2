//! Byte-level channels between the two solvers
//!
//! A [`Transport`] moves opaque buffers; framing of protocol messages is done
//! by the [`Codec`](crate::codec::Codec). Implementations must deliver buffers
//! in the order they were sent and must make `close` idempotent.

use crate::config::{CommunicationFormat, ConnectionConfig};
use crate::Result;
use std::time::Duration;
use tracing::debug;

pub mod file;
pub mod memory;
pub mod socket;

pub use file::FileTransport;
pub use memory::MemoryTransport;
pub use socket::SocketTransport;

/// Ordered, bidirectional buffer channel to the partner solver
///
/// A transport is owned by exactly one connection and used from one thread
/// at a time.
pub trait Transport: Send {
    /// Send one buffer to the partner
    fn send(&mut self, buffer: &[u8]) -> Result<()>;

    /// Block until the next buffer from the partner arrives or `timeout` elapses
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Release the underlying resources; calling it again is a no-op
    fn close(&mut self) -> Result<()>;

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

/// Open the transport selected by `communication_format`
///
/// Opening may block until the partner attaches (bounded by the configured timeout).
pub fn open(config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
    debug!(
        "Opening {:?} transport for \"{}\"",
        config.communication_format, config.connection_name
    );
    let transport: Box<dyn Transport> = match config.communication_format {
        CommunicationFormat::File => Box::new(FileTransport::open(config)?),
        CommunicationFormat::Socket => Box::new(SocketTransport::open(config)?),
    };
    Ok(transport)
}
