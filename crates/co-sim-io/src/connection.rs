//! Connection lifecycle and the blocking exchanges with the partner solver
//!
//! A [`Connection`] owns one [`Transport`] and moves through
//! `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`.
//! Every exchange is a rendezvous: the exporting side sends a message and
//! blocks until the importing side acknowledges it under the same identifier.

use crate::codec::{Codec, Hello, Message, MessageKind};
use crate::config::{validate_connection_name, ConnectionConfig};
use crate::error::CoSimError;
use crate::info::Info;
use crate::model_part::ModelPart;
use crate::transport::{self, Transport};
use crate::Result;
use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Value of `connection_status` in the Info returned by connect and disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum ConnectionStatus {
    Connected = 1,
    Disconnected = 2,
    ConnectionError = 3,
    DisconnectionError = 4,
}

impl ConnectionStatus {
    pub fn as_int(self) -> i64 {
        self as i64
    }

    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Connected),
            2 => Some(Self::Disconnected),
            3 => Some(Self::ConnectionError),
            4 => Some(Self::DisconnectionError),
            _ => None,
        }
    }

    /// Read `connection_status` from a result Info
    pub fn from_info(info: &Info) -> Result<Self> {
        let value = info.get_int("connection_status")?;
        Self::from_int(value).ok_or_else(|| {
            CoSimError::InvalidArgument(format!("Unknown connection status: {value}"))
        })
    }
}

/// Traffic counters of one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
}

/// One side of a coupling session with a partner solver
pub struct Connection {
    config: ConnectionConfig,
    codec: Codec,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    partner: Option<Hello>,
    stats: ConnectionStats,
}

impl Connection {
    /// Create a disconnected connection
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        validate_connection_name(&config.connection_name)?;
        let codec = Codec::new(config.wire_format).with_max_message_size(config.max_message_size);
        Ok(Self {
            config,
            codec,
            state: ConnectionState::Disconnected,
            transport: None,
            partner: None,
            stats: ConnectionStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.connection_name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Get statistics about exchanged messages
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Name of the partner solver, known while connected
    pub fn partner_solver_name(&self) -> Option<&str> {
        self.partner.as_ref().map(|hello| hello.solver_name.as_str())
    }

    /// Open the transport selected by the configuration and shake hands
    pub fn connect(&mut self) -> Result<Info> {
        self.connect_via(transport::open)
    }

    /// Shake hands over an already opened transport
    pub fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<Info> {
        self.connect_via(move |_| Ok(transport))
    }

    fn connect_via<F>(&mut self, open: F) -> Result<Info>
    where
        F: FnOnce(&ConnectionConfig) -> Result<Box<dyn Transport>>,
    {
        self.require_state(ConnectionState::Disconnected, "connect")?;
        self.state = ConnectionState::Connecting;
        self.log_lifecycle(format_args!(
            "Connecting \"{}\" as solver \"{}\"",
            self.config.connection_name, self.config.solver_name
        ));

        let result = open(&self.config).and_then(|transport| {
            debug!("Transport for \"{}\": {}", self.name(), transport.describe());
            self.transport = Some(transport);
            self.exchange_hello()
        });

        match result {
            Ok(partner) => {
                self.state = ConnectionState::Connected;
                self.log_lifecycle(format_args!(
                    "Connection \"{}\" established with solver \"{}\" (version \"{}\")",
                    self.config.connection_name, partner.solver_name, partner.solver_version
                ));
                let info = self
                    .status_info(ConnectionStatus::Connected)
                    .with("partner_solver_name", partner.solver_name.as_str())
                    .with("partner_solver_version", partner.solver_version.as_str());
                self.partner = Some(partner);
                Ok(info)
            }
            Err(e) => {
                error!("Connecting \"{}\" failed: {}", self.config.connection_name, e);
                self.release_transport();
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn exchange_hello(&mut self) -> Result<Hello> {
        let hello = Hello {
            connection_name: self.config.connection_name.clone(),
            solver_name: self.config.solver_name.clone(),
            solver_version: self.config.solver_version.clone(),
        };
        let payload = self.codec.encode_hello(&hello)?;
        let name = self.config.connection_name.clone();
        self.send_message(&Message::new(MessageKind::Hello, name.as_str(), payload))?;

        let reply = self.expect_message(MessageKind::Hello, &name)?;
        let partner = self.codec.decode_hello(&reply.payload)?;
        if partner.connection_name != name {
            return Err(CoSimError::ProtocolMismatch(format!(
                "Partner joined connection \"{}\" instead of \"{}\"",
                partner.connection_name, name
            )));
        }
        Ok(partner)
    }

    /// Say goodbye to the partner and release the transport
    ///
    /// The connection ends up disconnected even if the goodbye fails.
    pub fn disconnect(&mut self) -> Result<Info> {
        self.require_state(ConnectionState::Connected, "disconnect")?;
        self.state = ConnectionState::Disconnecting;
        self.log_lifecycle(format_args!(
            "Disconnecting \"{}\"",
            self.config.connection_name
        ));

        let name = self.config.connection_name.clone();
        let goodbye = self
            .send_message(&Message::new(MessageKind::Goodbye, name.as_str(), Vec::new()))
            .and_then(|_| self.expect_message(MessageKind::Goodbye, &name));
        let closed = match self.transport.take() {
            Some(mut transport) => transport.close(),
            None => Ok(()),
        };

        self.state = ConnectionState::Disconnected;
        self.partner = None;

        if let Err(e) = goodbye.map(|_| ()).and(closed) {
            error!("Disconnecting \"{}\" failed: {}", name, e);
            return Err(e);
        }

        self.log_lifecycle(format_args!(
            "Connection \"{}\" closed (sent {} messages / {} bytes, received {} messages / {} bytes)",
            name,
            self.stats.messages_sent,
            self.stats.bytes_sent,
            self.stats.messages_received,
            self.stats.bytes_received
        ));
        Ok(self.status_info(ConnectionStatus::Disconnected))
    }

    /// Send a sequence of doubles and wait until the partner imported it
    ///
    /// Fails with a protocol mismatch if the partner was waiting for a
    /// different transfer and rejected this one.
    pub fn export_data(&mut self, identifier: &str, data: &[f64]) -> Result<Info> {
        self.require_connected()?;
        let payload = self.codec.encode_data(data)?;
        self.export(MessageKind::Data, identifier, payload)?;
        Ok(self.exchange_info(identifier).with("size", data.len() as i64))
    }

    /// Wait for the doubles the partner exports under `identifier`
    pub fn import_data(&mut self, identifier: &str) -> Result<(Info, Vec<f64>)> {
        self.require_connected()?;
        let message = self.import(MessageKind::Data, identifier)?;
        let data = self.codec.decode_data(&message.payload)?;
        self.acknowledge(identifier)?;
        let info = self.exchange_info(identifier).with("size", data.len() as i64);
        Ok((info, data))
    }

    /// Send a model part and wait until the partner imported it
    pub fn export_mesh(&mut self, identifier: &str, model_part: &ModelPart) -> Result<Info> {
        self.require_connected()?;
        let payload = self.codec.encode_model_part(model_part)?;
        self.export(MessageKind::Mesh, identifier, payload)?;
        Ok(self.mesh_info(identifier, model_part))
    }

    /// Wait for the model part the partner exports under `identifier`
    pub fn import_mesh(&mut self, identifier: &str) -> Result<(Info, ModelPart)> {
        self.require_connected()?;
        let message = self.import(MessageKind::Mesh, identifier)?;
        let model_part = self.codec.decode_model_part(&message.payload)?;
        self.acknowledge(identifier)?;
        let info = self.mesh_info(identifier, &model_part);
        Ok((info, model_part))
    }

    /// Send an Info bag and wait until the partner imported it
    pub fn export_info(&mut self, identifier: &str, info: &Info) -> Result<Info> {
        self.require_connected()?;
        let payload = self.codec.encode_info(info)?;
        self.export(MessageKind::Info, identifier, payload)?;
        Ok(self.exchange_info(identifier))
    }

    /// Wait for the Info bag the partner exports under `identifier`
    pub fn import_info(&mut self, identifier: &str) -> Result<Info> {
        self.require_connected()?;
        let message = self.import(MessageKind::Info, identifier)?;
        let info = self.codec.decode_info(&message.payload)?;
        self.acknowledge(identifier)?;
        Ok(info)
    }

    fn export(&mut self, kind: MessageKind, identifier: &str, payload: Vec<u8>) -> Result<()> {
        debug!(
            "Exporting {:?} \"{}\" on \"{}\" ({} bytes)",
            kind,
            identifier,
            self.name(),
            payload.len()
        );
        self.send_message(&Message::new(kind, identifier, payload))?;

        let reply = self.receive_message()?;
        match reply.kind {
            MessageKind::Ack if reply.identifier == identifier => {
                trace!("Partner acknowledged \"{}\"", identifier);
                Ok(())
            }
            MessageKind::Reject if reply.identifier == identifier => {
                Err(CoSimError::ProtocolMismatch(format!(
                    "Partner rejected \"{}\": {}",
                    identifier,
                    String::from_utf8_lossy(&reply.payload)
                )))
            }
            _ => Err(mismatch(MessageKind::Ack, identifier, &reply)),
        }
    }

    /// Receive the expected transfer; an unexpected one is rejected so the exporter fails too
    fn import(&mut self, kind: MessageKind, identifier: &str) -> Result<Message> {
        debug!("Importing {:?} \"{}\" on \"{}\"", kind, identifier, self.name());
        let message = self.receive_message()?;
        if message.kind == kind && message.identifier == identifier {
            return Ok(message);
        }

        let error = mismatch(kind, identifier, &message);
        if matches!(
            message.kind,
            MessageKind::Data | MessageKind::Mesh | MessageKind::Info
        ) {
            let reason = error.to_string().into_bytes();
            let reject = Message::new(MessageKind::Reject, message.identifier.as_str(), reason);
            if let Err(e) = self.send_message(&reject) {
                warn!("Rejecting \"{}\" failed: {}", message.identifier, e);
            }
        }
        Err(error)
    }

    fn acknowledge(&mut self, identifier: &str) -> Result<()> {
        self.send_message(&Message::new(MessageKind::Ack, identifier, Vec::new()))
    }

    fn send_message(&mut self, message: &Message) -> Result<()> {
        let buffer = self.codec.encode_message(message)?;
        let transport = self.transport.as_mut().ok_or(CoSimError::TransportClosed)?;
        transport.send(&buffer)?;

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += buffer.len() as u64;
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Message> {
        let timeout = self.config.timeout;
        let transport = self.transport.as_mut().ok_or(CoSimError::TransportClosed)?;
        let buffer = transport.receive(timeout)?;

        self.stats.messages_received += 1;
        self.stats.bytes_received += buffer.len() as u64;
        self.codec.decode_message(&buffer)
    }

    /// Receive the next message, which must match `kind` and `identifier`
    fn expect_message(&mut self, kind: MessageKind, identifier: &str) -> Result<Message> {
        let message = self.receive_message()?;
        if message.kind != kind || message.identifier != identifier {
            return Err(mismatch(kind, identifier, &message));
        }
        Ok(message)
    }

    fn require_state(&self, expected: ConnectionState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(CoSimError::IllegalState {
                connection_name: self.config.connection_name.clone(),
                state: self.state.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn require_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(CoSimError::NotConnected {
                connection_name: self.config.connection_name.clone(),
            });
        }
        Ok(())
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                warn!("Closing {} failed: {}", transport.describe(), e);
            }
        }
    }

    fn status_info(&self, status: ConnectionStatus) -> Info {
        Info::new()
            .with("connection_status", status.as_int())
            .with("connection_name", self.config.connection_name.as_str())
            .with("is_connected", status == ConnectionStatus::Connected)
    }

    fn exchange_info(&self, identifier: &str) -> Info {
        Info::new()
            .with("connection_name", self.config.connection_name.as_str())
            .with("identifier", identifier)
    }

    fn mesh_info(&self, identifier: &str, model_part: &ModelPart) -> Info {
        self.exchange_info(identifier)
            .with("number_of_nodes", model_part.number_of_nodes() as i64)
            .with("number_of_elements", model_part.number_of_elements() as i64)
    }

    fn log_lifecycle(&self, message: fmt::Arguments<'_>) {
        if self.config.echo_level > 0 {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}

fn mismatch(kind: MessageKind, identifier: &str, received: &Message) -> CoSimError {
    CoSimError::ProtocolMismatch(format!(
        "Expected {:?} \"{}\" but received {:?} \"{}\"",
        kind, identifier, received.kind, received.identifier
    ))
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.config.connection_name)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!(
                "Connection \"{}\" dropped without disconnecting",
                self.config.connection_name
            );
        }
        self.release_transport();
    }
}
