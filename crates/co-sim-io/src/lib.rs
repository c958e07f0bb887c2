//! Coupling interface for exchanging data between two simulation solvers
//!
//! Two solvers open a named connection, then exchange flat arrays of doubles,
//! meshes ([`ModelPart`]) and key/value bags ([`Info`]) in lock-step. Every
//! exchange blocks until the partner performs the matching call or the
//! configured timeout elapses.
//!
//! Bytes travel over a pluggable [`Transport`] (shared directory, TCP socket,
//! or in-process channels) and are framed by the [`Codec`].

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod info;
pub mod model_part;
pub mod transport;

// Re-export commonly used types
pub use codec::{Codec, Message, MessageKind, WireFormat, PROTOCOL_VERSION};
pub use config::{CommunicationFormat, ConnectionConfig};
pub use connection::{Connection, ConnectionState, ConnectionStats, ConnectionStatus};
pub use error::{CoSimError, EntityKind, ErrorKind};
pub use exchange::{
    connect, connect_from_file, connect_with_transport, disconnect, export_data, export_info,
    export_mesh, import_data, import_info, import_mesh, is_connected, CoSimIo,
};
pub use info::{Info, InfoValue};
pub use model_part::{Element, ElementRef, ElementType, IdType, ModelPart, Node};
pub use transport::{FileTransport, MemoryTransport, SocketTransport, Transport};

/// Result type for co-simulation operations
pub type Result<T> = std::result::Result<T, CoSimError>;
