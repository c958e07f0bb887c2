//! Settings-driven entry points keyed by `connection_name`
//!
//! [`CoSimIo`] keeps the connections of one process and routes every call to
//! the connection named in its settings. The free functions of this module
//! use a process-wide instance.

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::CoSimError;
use crate::info::Info;
use crate::model_part::ModelPart;
use crate::transport::Transport;
use crate::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of the connections opened by one process
///
/// Each connection is used by one thread at a time; calls on different
/// connections may run concurrently.
#[derive(Default)]
pub struct CoSimIo {
    connections: Mutex<HashMap<String, SharedConnection>>,
}

impl CoSimIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to the partner solver described by `settings`
    ///
    /// Blocks until the partner connects too or the timeout elapses.
    pub fn connect(&self, settings: &Info) -> Result<Info> {
        let config = ConnectionConfig::from_settings(settings)?;
        self.register_and_connect(config, |connection| connection.connect())
    }

    /// Connect with settings read from a JSON file
    ///
    /// `connection_name` takes precedence over an entry of the same name in the file.
    pub fn connect_from_file(
        &self,
        connection_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<Info> {
        let config = ConnectionConfig::from_file(connection_name, path)?;
        self.register_and_connect(config, |connection| connection.connect())
    }

    /// Like [`connect`](Self::connect), over a transport the caller opened
    pub fn connect_with_transport(
        &self,
        settings: &Info,
        transport: Box<dyn Transport>,
    ) -> Result<Info> {
        let config = ConnectionConfig::from_settings(settings)?;
        self.register_and_connect(config, move |connection| connection.connect_with(transport))
    }

    fn register_and_connect<F>(&self, config: ConnectionConfig, connect: F) -> Result<Info>
    where
        F: FnOnce(&mut Connection) -> Result<Info>,
    {
        let name = config.connection_name.clone();
        let connection = Arc::new(Mutex::new(Connection::new(config)?));
        {
            let mut connections = lock(&self.connections);
            if connections.contains_key(&name) {
                return Err(CoSimError::DuplicateConnection(name));
            }
            connections.insert(name.clone(), Arc::clone(&connection));
        }

        let result = connect(&mut *lock(&connection));
        if result.is_err() {
            debug!("Unregistering \"{}\" after failed connect", name);
            lock(&self.connections).remove(&name);
        }
        result
    }

    /// Disconnect the connection named by `connection_name`
    pub fn disconnect(&self, settings: &Info) -> Result<Info> {
        let name = settings.get_string("connection_name")?;
        let connection = self.get(&name)?;

        let mut guard = lock(&connection);
        let result = guard.disconnect();
        if !guard.is_connected() {
            lock(&self.connections).remove(&name);
        }
        result
    }

    pub fn is_connected(&self, connection_name: &str) -> bool {
        self.get(connection_name)
            .map(|connection| lock(&connection).is_connected())
            .unwrap_or(false)
    }

    /// Names of the registered connections, sorted
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.connections).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn export_data(&self, settings: &Info, data: &[f64]) -> Result<Info> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).export_data(&identifier, data);
        result
    }

    pub fn import_data(&self, settings: &Info) -> Result<(Info, Vec<f64>)> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).import_data(&identifier);
        result
    }

    pub fn export_mesh(&self, settings: &Info, model_part: &ModelPart) -> Result<Info> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).export_mesh(&identifier, model_part);
        result
    }

    pub fn import_mesh(&self, settings: &Info) -> Result<(Info, ModelPart)> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).import_mesh(&identifier);
        result
    }

    pub fn export_info(&self, settings: &Info, info: &Info) -> Result<Info> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).export_info(&identifier, info);
        result
    }

    pub fn import_info(&self, settings: &Info) -> Result<Info> {
        let (connection, identifier) = self.target(settings)?;
        let result = lock(&connection).import_info(&identifier);
        result
    }

    fn get(&self, connection_name: &str) -> Result<SharedConnection> {
        lock(&self.connections)
            .get(connection_name)
            .cloned()
            .ok_or_else(|| CoSimError::NotConnected {
                connection_name: connection_name.to_string(),
            })
    }

    /// Resolve `connection_name` and `identifier` of an exchange
    fn target(&self, settings: &Info) -> Result<(SharedConnection, String)> {
        let identifier = settings.get_string("identifier")?;
        if identifier.is_empty() {
            return Err(CoSimError::InvalidArgument(
                "\"identifier\" must not be empty".to_string(),
            ));
        }
        let name = settings.get_string("connection_name")?;
        Ok((self.get(&name)?, identifier))
    }
}

fn global() -> &'static CoSimIo {
    static REGISTRY: OnceLock<CoSimIo> = OnceLock::new();
    REGISTRY.get_or_init(CoSimIo::new)
}

/// Connect through the process-wide registry
pub fn connect(settings: &Info) -> Result<Info> {
    global().connect(settings)
}

pub fn connect_from_file(connection_name: &str, path: impl AsRef<Path>) -> Result<Info> {
    global().connect_from_file(connection_name, path)
}

pub fn connect_with_transport(settings: &Info, transport: Box<dyn Transport>) -> Result<Info> {
    global().connect_with_transport(settings, transport)
}

pub fn disconnect(settings: &Info) -> Result<Info> {
    global().disconnect(settings)
}

pub fn is_connected(connection_name: &str) -> bool {
    global().is_connected(connection_name)
}

pub fn export_data(settings: &Info, data: &[f64]) -> Result<Info> {
    global().export_data(settings, data)
}

pub fn import_data(settings: &Info) -> Result<(Info, Vec<f64>)> {
    global().import_data(settings)
}

pub fn export_mesh(settings: &Info, model_part: &ModelPart) -> Result<Info> {
    global().export_mesh(settings, model_part)
}

pub fn import_mesh(settings: &Info) -> Result<(Info, ModelPart)> {
    global().import_mesh(settings)
}

pub fn export_info(settings: &Info, info: &Info) -> Result<Info> {
    global().export_info(settings, info)
}

pub fn import_info(settings: &Info) -> Result<Info> {
    global().import_info(settings)
}
