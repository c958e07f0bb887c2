//! Shared-directory transport
//!
//! Each buffer becomes one file named after the sending side and a sequence
//! number. Files are written under a hidden temporary name and renamed, so the
//! receiver never observes a partially written buffer. The receiver deletes a
//! file once it has read it.

use super::Transport;
use crate::config::ConnectionConfig;
use crate::error::CoSimError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Poll interval while waiting for files to appear or disappear
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Attempts at removing a consumed file before giving up
const REMOVE_ATTEMPTS: usize = 5;

/// File-based transport to the partner solver
pub struct FileTransport {
    folder: PathBuf,
    connection_name: String,
    is_primary: bool,
    owns_folder: bool,
    timeout: Duration,
    send_seq: u64,
    recv_seq: u64,
    closed: bool,
}

impl FileTransport {
    /// Prepare the communication folder
    ///
    /// With `use_folder_for_communication` the primary side recreates
    /// `.CoSimIOFileComm_<connection_name>` in the working directory and the
    /// secondary side waits for it to appear.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let is_primary = config.resolve_primary()?;

        if !config.working_directory.is_dir() {
            return Err(CoSimError::InvalidArgument(format!(
                "The working directory {} does not exist",
                config.working_directory.display()
            )));
        }

        let folder = if config.use_folder_for_communication {
            config
                .working_directory
                .join(format!(".CoSimIOFileComm_{}", config.connection_name))
        } else {
            config.working_directory.clone()
        };

        let owns_folder = config.use_folder_for_communication && is_primary;
        if owns_folder {
            if folder.exists() {
                debug!("Removing leftover communication folder {}", folder.display());
                if let Err(e) = fs::remove_dir_all(&folder) {
                    warn!(
                        "Communication folder {} could not be deleted: {}",
                        folder.display(),
                        e
                    );
                }
            }
            fs::create_dir_all(&folder)?;
        } else if config.use_folder_for_communication {
            wait_for_path(&folder, config.timeout)?;
        }

        debug!(
            "File transport for \"{}\" in {} as {}",
            config.connection_name,
            folder.display(),
            role(is_primary)
        );

        Ok(Self {
            folder,
            connection_name: config.connection_name.clone(),
            is_primary,
            owns_folder,
            timeout: config.timeout,
            send_seq: 0,
            recv_seq: 0,
            closed: false,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn file_name(&self, from_primary: bool, seq: u64) -> PathBuf {
        self.folder.join(format!(
            "{}_{}_{:06}.msg",
            self.connection_name,
            role(from_primary),
            seq
        ))
    }

    fn temp_name(&self, path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.folder.join(format!(".{name}.tmp"))
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(CoSimError::TransportClosed);
        }
        Ok(())
    }

    /// Wait until the partner consumed everything this side sent
    ///
    /// Skipped if the partner never sent anything, since it is not attached.
    fn wait_until_consumed(&self) -> Result<()> {
        if self.send_seq == 0 || self.recv_seq == 0 {
            return Ok(());
        }
        let last_sent = self.file_name(self.is_primary, self.send_seq - 1);
        let start = Instant::now();
        while last_sent.exists() {
            if start.elapsed() > self.timeout {
                return Err(CoSimError::timeout(
                    format!("partner to consume {}", last_sent.display()),
                    self.timeout,
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

fn role(is_primary: bool) -> &'static str {
    if is_primary {
        "primary"
    } else {
        "secondary"
    }
}

fn wait_for_path(path: &Path, timeout: Duration) -> Result<()> {
    trace!("Waiting for {}", path.display());
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() > timeout {
            return Err(CoSimError::timeout(path.display().to_string(), timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
    trace!("Found {}", path.display());
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    // another process may still hold a handle while it checks for existence
    let mut last_error = None;
    for _ in 0..REMOVE_ATTEMPTS {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(last_error
        .map(CoSimError::Io)
        .unwrap_or(CoSimError::TransportClosed))
}

impl Transport for FileTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        self.check_open()?;
        let path = self.file_name(self.is_primary, self.send_seq);
        let temp = self.temp_name(&path);

        fs::write(&temp, buffer)?;
        fs::rename(&temp, &path)?;
        self.send_seq += 1;

        trace!("Wrote {} ({} bytes)", path.display(), buffer.len());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.check_open()?;
        let path = self.file_name(!self.is_primary, self.recv_seq);
        wait_for_path(&path, timeout).map_err(|e| match e {
            CoSimError::Timeout { timeout, .. } => {
                CoSimError::timeout("message from partner", timeout)
            }
            other => other,
        })?;

        let buffer = fs::read(&path)?;
        remove_path(&path)?;
        self.recv_seq += 1;

        trace!("Read {} ({} bytes)", path.display(), buffer.len());
        Ok(buffer)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.owns_folder {
            let consumed = self.wait_until_consumed();
            if let Err(e) = fs::remove_dir_all(&self.folder) {
                warn!(
                    "Communication folder {} could not be deleted: {}",
                    self.folder.display(),
                    e
                );
            }
            consumed?;
        }
        debug!("Closed file transport in {}", self.folder.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file[{}]", self.folder.display())
    }
}

impl Drop for FileTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
