//! In-process transport over a pair of channels

use super::Transport;
use crate::error::CoSimError;
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::trace;

/// One end of an in-process channel pair
///
/// Useful for coupling two solvers that live in the same process, and for tests.
pub struct MemoryTransport {
    label: String,
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Self {
                label: "memory[a]".to_string(),
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                label: "memory[b]".to_string(),
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(CoSimError::TransportClosed)?;
        trace!("{}: sending {} bytes", self.label, buffer.len());
        tx.send(buffer.to_vec())
            .map_err(|_| CoSimError::TransportClosed)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        if self.tx.is_none() {
            return Err(CoSimError::TransportClosed);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(buffer) => {
                trace!("{}: received {} bytes", self.label, buffer.len());
                Ok(buffer)
            }
            Err(RecvTimeoutError::Timeout) => {
                Err(CoSimError::timeout("message from partner", timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CoSimError::TransportClosed),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.tx.take().is_some() {
            trace!("{}: closed", self.label);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
