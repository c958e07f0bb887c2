//! Wire envelope and payload encoding
//!
//! Every transfer between the two solvers is a [`Message`]: a small binary
//! header (version, kind, identifier) followed by a payload encoded with the
//! configured [`WireFormat`].

use crate::error::CoSimError;
use crate::info::Info;
use crate::model_part::ModelPart;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};
use tracing::{debug, trace};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum message size (100MB by default)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Message kinds in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Connect handshake
    Hello = 0x01,
    /// Flat sequence of doubles
    Data = 0x02,
    /// Encoded model part
    Mesh = 0x03,
    /// Encoded info bag
    Info = 0x04,
    /// Receipt of a Data/Mesh/Info message
    Ack = 0x05,
    /// Disconnect handshake
    Goodbye = 0x06,
    /// Refusal of a Data/Mesh/Info message the importer did not expect
    Reject = 0x07,
}

impl MessageKind {
    /// Convert from u8 representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::Mesh),
            0x04 => Some(Self::Info),
            0x05 => Some(Self::Ack),
            0x06 => Some(Self::Goodbye),
            0x07 => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Wire format for payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Binary format using bincode
    #[default]
    Bincode,
    /// JSON format for debugging
    #[cfg(feature = "json")]
    Json,
}

impl WireFormat {
    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "bincode" => Ok(Self::Bincode),
            #[cfg(feature = "json")]
            "json" => Ok(Self::Json),
            other => Err(CoSimError::InvalidArgument(format!(
                "Unsupported wire format: \"{other}\""
            ))),
        }
    }
}

/// Payload of a [`MessageKind::Hello`] message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub connection_name: String,
    pub solver_name: String,
    pub solver_version: String,
}

/// Message envelope containing kind, identifier and payload
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Protocol version
    pub version: u16,
    /// Message kind
    pub kind: MessageKind,
    /// Name of the transfer this message belongs to
    pub identifier: String,
    /// Encoded payload
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(kind: MessageKind, identifier: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            identifier: identifier.into(),
            payload,
        }
    }

    /// Get the total size of the message when encoded
    pub fn size(&self) -> usize {
        // Version (2) + Kind (1) + Identifier length (4) + Identifier + Payload length (4) + Payload
        2 + 1 + 4 + self.identifier.len() + 4 + self.payload.len()
    }
}

/// Encodes payloads and envelopes
#[derive(Debug, Clone)]
pub struct Codec {
    format: WireFormat,
    max_message_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            format: WireFormat::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Codec {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let payload = match self.format {
            WireFormat::Bincode => {
                trace!("Using bincode format");
                bincode::serialize(value)?
            }
            #[cfg(feature = "json")]
            WireFormat::Json => {
                trace!("Using JSON format");
                serde_json::to_vec(value)?
            }
        };

        if payload.len() > self.max_message_size {
            return Err(CoSimError::MessageTooLarge {
                size: payload.len(),
                max_size: self.max_message_size,
            });
        }

        Ok(payload)
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        trace!("Deserializing payload from {} bytes", payload.len());
        let value = match self.format {
            WireFormat::Bincode => bincode::deserialize(payload)?,
            #[cfg(feature = "json")]
            WireFormat::Json => serde_json::from_slice(payload)?,
        };
        Ok(value)
    }

    pub fn encode_info(&self, info: &Info) -> Result<Vec<u8>> {
        self.serialize(info)
    }

    pub fn decode_info(&self, payload: &[u8]) -> Result<Info> {
        self.deserialize(payload)
    }

    pub fn encode_data(&self, data: &[f64]) -> Result<Vec<u8>> {
        self.serialize(&data)
    }

    pub fn decode_data(&self, payload: &[u8]) -> Result<Vec<f64>> {
        self.deserialize(payload)
    }

    pub fn encode_model_part(&self, model_part: &ModelPart) -> Result<Vec<u8>> {
        debug!(
            "Encoding model part \"{}\": nodes={}, elements={}",
            model_part.name(),
            model_part.number_of_nodes(),
            model_part.number_of_elements()
        );
        self.serialize(model_part)
    }

    /// Decode a model part; duplicate ids or dangling node references are rejected
    pub fn decode_model_part(&self, payload: &[u8]) -> Result<ModelPart> {
        self.deserialize(payload)
    }

    pub fn encode_hello(&self, hello: &Hello) -> Result<Vec<u8>> {
        self.serialize(hello)
    }

    pub fn decode_hello(&self, payload: &[u8]) -> Result<Hello> {
        self.deserialize(payload)
    }

    /// Write a message envelope to a stream
    pub fn write_message<W: Write>(&self, writer: &mut W, message: &Message) -> Result<()> {
        trace!(
            "Writing message: kind={:?}, identifier={}, payload_size={}",
            message.kind,
            message.identifier,
            message.payload.len()
        );

        if message.size() > self.max_message_size {
            return Err(CoSimError::MessageTooLarge {
                size: message.size(),
                max_size: self.max_message_size,
            });
        }

        writer.write_u16::<LittleEndian>(message.version)?;
        writer.write_u8(message.kind as u8)?;
        writer.write_u32::<LittleEndian>(message.identifier.len() as u32)?;
        writer.write_all(message.identifier.as_bytes())?;
        writer.write_u32::<LittleEndian>(message.payload.len() as u32)?;
        writer.write_all(&message.payload)?;
        writer.flush()?;

        Ok(())
    }

    /// Read a message envelope from a stream
    pub fn read_message<R: Read>(&self, reader: &mut R) -> Result<Message> {
        let version = reader.read_u16::<LittleEndian>()?;
        if version != PROTOCOL_VERSION {
            return Err(CoSimError::InvalidVersion {
                expected: PROTOCOL_VERSION,
                received: version,
            });
        }

        let kind_raw = reader.read_u8()?;
        let kind = MessageKind::from_u8(kind_raw).ok_or_else(|| {
            CoSimError::CorruptPayload(format!("Invalid message kind: {kind_raw}"))
        })?;

        let identifier_len = reader.read_u32::<LittleEndian>()? as usize;
        self.check_size(identifier_len)?;
        let mut identifier = vec![0u8; identifier_len];
        reader.read_exact(&mut identifier)?;
        let identifier = String::from_utf8(identifier).map_err(|e| {
            CoSimError::CorruptPayload(format!("Identifier is not valid UTF-8: {e}"))
        })?;

        let payload_size = reader.read_u32::<LittleEndian>()? as usize;
        self.check_size(payload_size)?;
        let mut payload = vec![0u8; payload_size];
        reader.read_exact(&mut payload)?;

        trace!(
            "Read message: version={}, kind={:?}, identifier={}, size={}",
            version,
            kind,
            identifier,
            payload_size
        );

        Ok(Message {
            version,
            kind,
            identifier,
            payload,
        })
    }

    /// Encode a message envelope into one transport buffer
    pub fn encode_message(&self, message: &Message) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(message.size());
        self.write_message(&mut buffer, message)?;
        Ok(buffer)
    }

    /// Decode one transport buffer; trailing bytes are rejected
    pub fn decode_message(&self, buffer: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(buffer);
        let message = self.read_message(&mut cursor).map_err(|e| match e {
            CoSimError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                CoSimError::CorruptPayload("Truncated message".to_string())
            }
            other => other,
        })?;
        if cursor.position() as usize != buffer.len() {
            return Err(CoSimError::CorruptPayload(format!(
                "{} trailing bytes after message",
                buffer.len() - cursor.position() as usize
            )));
        }
        Ok(message)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(CoSimError::MessageTooLarge {
                size,
                max_size: self.max_message_size,
            });
        }
        Ok(())
    }
}
