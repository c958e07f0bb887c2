//! TCP transport
//!
//! The primary side listens, the secondary side connects. Each buffer is sent
//! as a little-endian `u32` length followed by the bytes.

use super::Transport;
use crate::config::ConnectionConfig;
use crate::error::CoSimError;
use crate::Result;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Poll interval while waiting for the partner to attach
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// First port of the range used for derived ports
const DERIVED_PORT_BASE: u16 = 49152;

/// Port both sides agree on when none is configured
///
/// FNV-1a over the connection name, folded into the dynamic port range.
pub fn derive_port(connection_name: &str) -> u16 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in connection_name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let span = u32::from(u16::MAX - DERIVED_PORT_BASE) + 1;
    DERIVED_PORT_BASE + (hash % span) as u16
}

/// TCP-based transport to the partner solver
pub struct SocketTransport {
    stream: Option<TcpStream>,
    peer_addr: SocketAddr,
    max_frame_size: usize,
}

impl SocketTransport {
    /// Listen or connect depending on the primary role, waiting up to the configured timeout
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let port = if config.port == 0 {
            derive_port(&config.connection_name)
        } else {
            config.port
        };
        let addr = (config.host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                CoSimError::InvalidArgument(format!("No valid address for {}:{port}", config.host))
            })?;

        let stream = if config.resolve_primary()? {
            Self::accept_one(addr, config.timeout)?
        } else {
            Self::connect_with_retry(addr, config.timeout)?
        };

        Self::from_stream(stream, config.max_message_size)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        debug!("Socket transport connected to {}", peer_addr);
        Ok(Self {
            stream: Some(stream),
            peer_addr,
            max_frame_size,
        })
    }

    fn accept_one(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let listener = TcpListener::bind(addr)?;
        info!("Listening for partner on {}", listener.local_addr()?);
        listener.set_nonblocking(true)?;

        let start = Instant::now();
        let (stream, peer) = loop {
            match listener.accept() {
                Ok(result) => break result,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        return Err(CoSimError::timeout(
                            format!("partner to connect on {addr}"),
                            timeout,
                        ));
                    }
                    thread::sleep(ATTACH_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        };

        info!("Accepted partner connection from {}", peer);
        stream.set_nonblocking(false)?;
        Ok(stream)
    }

    fn connect_with_retry(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let start = Instant::now();
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(CoSimError::timeout(
                    format!("partner to listen on {addr}"),
                    timeout,
                ));
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    info!("Connected to partner at {}", addr);
                    return Ok(stream);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
                    ) =>
                {
                    trace!("Partner not listening yet on {}: {}", addr, e);
                    thread::sleep(ATTACH_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(CoSimError::TransportClosed)
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn abort(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

struct FrameError {
    error: CoSimError,
    /// Part of the frame was consumed before the error
    mid_frame: bool,
}

/// Like `read_exact`, but reports how many bytes were consumed before failing
fn read_tracked<R: Read>(reader: &mut R, buffer: &mut [u8]) -> (usize, io::Result<()>) {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => return (filled, Err(io::ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (filled, Err(e)),
        }
    }
    (filled, Ok(()))
}

fn read_frame<R: Read>(
    reader: &mut R,
    max_frame_size: usize,
    timeout: Duration,
) -> std::result::Result<Vec<u8>, FrameError> {
    let mut header = [0u8; 4];
    let (filled, result) = read_tracked(reader, &mut header);
    result.map_err(|e| FrameError {
        error: map_read_error(e, timeout),
        mid_frame: filled > 0,
    })?;

    let size = LittleEndian::read_u32(&header) as usize;
    if size > max_frame_size {
        return Err(FrameError {
            error: CoSimError::MessageTooLarge {
                size,
                max_size: max_frame_size,
            },
            mid_frame: true,
        });
    }

    let mut buffer = vec![0u8; size];
    let (_, result) = read_tracked(reader, &mut buffer);
    result.map_err(|e| FrameError {
        error: map_read_error(e, timeout),
        mid_frame: true,
    })?;
    Ok(buffer)
}

fn map_read_error(error: io::Error, timeout: Duration) -> CoSimError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            CoSimError::timeout("message from partner", timeout)
        }
        io::ErrorKind::UnexpectedEof => CoSimError::TransportClosed,
        _ => CoSimError::Io(error),
    }
}

impl Transport for SocketTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<()> {
        if buffer.len() > self.max_frame_size {
            return Err(CoSimError::MessageTooLarge {
                size: buffer.len(),
                max_size: self.max_frame_size,
            });
        }
        let stream = self.stream()?;
        stream.write_u32::<LittleEndian>(buffer.len() as u32)?;
        stream.write_all(buffer)?;
        stream.flush()?;
        trace!("Sent frame of {} bytes", buffer.len());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let max_frame_size = self.max_frame_size;
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout))?;

        match read_frame(stream, max_frame_size, timeout) {
            Ok(buffer) => {
                trace!("Received frame of {} bytes", buffer.len());
                Ok(buffer)
            }
            Err(FrameError {
                error,
                mid_frame: false,
            }) => Err(error),
            Err(FrameError {
                error,
                mid_frame: true,
            }) => {
                // the rest of the frame would be parsed as the next one
                warn!(
                    "Dropping socket to {} after an incomplete frame: {}",
                    self.peer_addr, error
                );
                self.abort();
                Err(match error {
                    CoSimError::Timeout { .. } => CoSimError::TransportClosed,
                    other => other,
                })
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Closing socket transport to {}", self.peer_addr);
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => {
                    warn!("Error shutting down socket to {}: {}", self.peer_addr, e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("socket[{}]", self.peer_addr)
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
