//! Connection settings parsed from an [`Info`] bag

use crate::codec::{WireFormat, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::CoSimError;
use crate::info::Info;
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bound on every blocking rendezvous
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the two solvers exchange bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationFormat {
    /// Shared directory on a common filesystem
    File,
    /// TCP socket
    Socket,
}

impl CommunicationFormat {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "file" => Ok(Self::File),
            "socket" | "sockets" => Ok(Self::Socket),
            other => Err(CoSimError::InvalidArgument(format!(
                "Unsupported communication format: \"{other}\""
            ))),
        }
    }
}

/// Typed view of the settings passed to `connect`
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Name shared by both solvers for this session
    pub connection_name: String,
    /// Name of the local solver
    pub solver_name: String,
    /// Informational version of the local solver
    pub solver_version: String,
    /// Partner solver name, used to derive the primary side
    pub connect_to: Option<String>,
    /// Explicit primary/secondary role
    pub is_primary: Option<bool>,
    /// Diagnostic verbosity; no effect on the protocol
    pub echo_level: i64,
    /// Transport selection for settings-opened connections
    pub communication_format: CommunicationFormat,
    /// Base directory of the file transport
    pub working_directory: PathBuf,
    /// Whether the file transport uses a dedicated sub-folder
    pub use_folder_for_communication: bool,
    /// Socket host
    pub host: String,
    /// Socket port, 0 derives one from the connection name
    pub port: u16,
    /// Bound on every blocking wait
    pub timeout: Duration,
    /// Maximum encoded message size in bytes
    pub max_message_size: usize,
    /// Wire format of encoded payloads
    pub wire_format: WireFormat,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_name: String::new(),
            solver_name: "unnamed_solver".to_string(),
            solver_version: String::new(),
            connect_to: None,
            is_primary: None,
            echo_level: 0,
            communication_format: CommunicationFormat::File,
            working_directory: PathBuf::from("."),
            use_folder_for_communication: true,
            host: "127.0.0.1".to_string(),
            port: 0,
            timeout: DEFAULT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            wire_format: WireFormat::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate connection settings
    pub fn from_settings(settings: &Info) -> Result<Self> {
        let defaults = Self::default();

        let connection_name = settings.get_string("connection_name")?;
        validate_connection_name(&connection_name)?;

        let solver_name = settings.get_string_or("solver_name", &defaults.solver_name)?;
        if solver_name.is_empty() {
            return Err(CoSimError::InvalidArgument(
                "\"solver_name\" must not be empty".to_string(),
            ));
        }

        let connect_to = if settings.has("connect_to") {
            Some(settings.get_string("connect_to")?)
        } else {
            None
        };
        let is_primary = if settings.has("is_primary_connection") {
            Some(settings.get_bool("is_primary_connection")?)
        } else {
            None
        };

        let communication_format = CommunicationFormat::parse(
            &settings.get_string_or("communication_format", "file")?,
        )?;

        let port = settings.get_int_or("port", 0)?;
        let port = u16::try_from(port)
            .map_err(|_| CoSimError::InvalidArgument(format!("Invalid port: {port}")))?;

        let timeout_ms = settings.get_int_or("timeout_ms", defaults.timeout.as_millis() as i64)?;
        if timeout_ms <= 0 {
            return Err(CoSimError::InvalidArgument(format!(
                "\"timeout_ms\" must be positive, got {timeout_ms}"
            )));
        }

        let max_message_size =
            settings.get_int_or("max_message_size", defaults.max_message_size as i64)?;
        let max_message_size = usize::try_from(max_message_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                CoSimError::InvalidArgument(format!(
                    "Invalid max_message_size: {max_message_size}"
                ))
            })?;

        let wire_format = WireFormat::parse(&settings.get_string_or("wire_format", "bincode")?)?;

        Ok(Self {
            connection_name,
            solver_name,
            solver_version: settings.get_string_or("solver_version", "")?,
            connect_to,
            is_primary,
            echo_level: settings.get_int_or("echo_level", defaults.echo_level)?,
            communication_format,
            working_directory: PathBuf::from(
                settings.get_string_or("working_directory", ".")?,
            ),
            use_folder_for_communication: settings
                .get_bool_or("use_folder_for_communication", true)?,
            host: settings.get_string_or("host", &defaults.host)?,
            port,
            timeout: Duration::from_millis(timeout_ms as u64),
            max_message_size,
            wire_format,
        })
    }

    /// Read settings from a JSON file; `connection_name` overrides the file's entry
    pub fn from_file(connection_name: &str, path: impl AsRef<Path>) -> Result<Self> {
        let mut settings = Info::from_file(path)?;
        settings.set_string("connection_name", connection_name);
        Self::from_settings(&settings)
    }

    /// Whether this side owns the shared transport resources
    ///
    /// Uses `is_primary_connection` if given, otherwise the side whose
    /// solver name sorts first is primary.
    pub fn resolve_primary(&self) -> Result<bool> {
        if let Some(is_primary) = self.is_primary {
            return Ok(is_primary);
        }
        match &self.connect_to {
            Some(partner) if partner == &self.solver_name => Err(CoSimError::InvalidArgument(
                format!(
                    "\"connect_to\" must differ from \"solver_name\" (both are \"{partner}\")"
                ),
            )),
            Some(partner) => Ok(self.solver_name < *partner),
            None => Err(CoSimError::InvalidArgument(format!(
                "Connection \"{}\" needs \"is_primary_connection\" or \"connect_to\" to choose a primary side",
                self.connection_name
            ))),
        }
    }
}

/// Connection names are shared between processes and used in file names
pub fn validate_connection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoSimError::InvalidArgument(
            "\"connection_name\" must not be empty".to_string(),
        ));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(CoSimError::InvalidArgument(format!(
            "\"connection_name\" contains invalid characters: \"{name}\""
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn settings() -> Info {
        let mut settings = Info::new();
        settings
            .set_string("connection_name", "test_connection")
            .set_string("solver_name", "my_solver")
            .set_int("echo_level", 1)
            .set_string("solver_version", "1.25");
        settings
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::from_settings(&settings()).unwrap();
        assert_eq!(config.connection_name, "test_connection");
        assert_eq!(config.solver_name, "my_solver");
        assert_eq!(config.solver_version, "1.25");
        assert_eq!(config.echo_level, 1);
        assert_eq!(config.communication_format, CommunicationFormat::File);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.wire_format, WireFormat::Bincode);
    }

    #[test]
    fn test_missing_connection_name() {
        let mut settings = settings();
        settings.erase("connection_name");
        let err = ConnectionConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_connection_name() {
        let settings = settings().with("connection_name", "");
        let err = ConnectionConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_wrong_setting_type() {
        let settings = settings().with("echo_level", "high");
        let err = ConnectionConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_socket_settings() {
        let settings = settings()
            .with("communication_format", "socket")
            .with("port", 50123)
            .with("timeout_ms", 250);
        let config = ConnectionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.communication_format, CommunicationFormat::Socket);
        assert_eq!(config.port, 50123);
        assert_eq!(config.timeout, Duration::from_millis(250));

        let settings = settings.with("port", 70000);
        assert!(ConnectionConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_unknown_format() {
        let settings = settings().with("communication_format", "mpi");
        let err = ConnectionConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_resolve_primary() {
        let config = ConnectionConfig::from_settings(&settings()).unwrap();
        assert!(config.resolve_primary().is_err());

        let config =
            ConnectionConfig::from_settings(&settings().with("connect_to", "other_solver"))
                .unwrap();
        assert!(config.resolve_primary().unwrap());

        let config =
            ConnectionConfig::from_settings(&settings().with("connect_to", "a_solver")).unwrap();
        assert!(!config.resolve_primary().unwrap());

        let config = ConnectionConfig::from_settings(
            &settings()
                .with("connect_to", "a_solver")
                .with("is_primary_connection", true),
        )
        .unwrap();
        assert!(config.resolve_primary().unwrap());
    }

    #[test]
    fn test_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("structure.json");
        std::fs::write(
            &path,
            r#"{
                "connection_name": "ignored",
                "solver_name": "structure",
                "connect_to": "fluid",
                "communication_format": "socket",
                "timeout_ms": 1500
            }"#,
        )
        .unwrap();

        let config = ConnectionConfig::from_file("fsi", &path).unwrap();
        assert_eq!(config.connection_name, "fsi");
        assert_eq!(config.solver_name, "structure");
        assert_eq!(config.communication_format, CommunicationFormat::Socket);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert!(!config.resolve_primary().unwrap());

        let err = ConnectionConfig::from_file("bad name", &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
