//! Rendezvous handshake
//!
//! The editor listens on a well-known TCP port; the host connects and sends
//! one fixed-size payload naming the directory both sides will share. After
//! that the socket carries nothing else and is closed once the file channel
//! is running.
//!
//! Both ends are polled once per tick: the listener is non-blocking and the
//! connector uses a short connect timeout, so no tick waits on the peer for
//! longer than the configured bounds.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Size of the directory payload in bytes.
pub const PAYLOAD_LEN: usize = 1024;

/// Fixed-width, NUL-padded UTF-8 directory path.
#[derive(Clone)]
pub struct DirectoryPayload([u8; PAYLOAD_LEN]);

impl DirectoryPayload {
    /// Encode `path`. At least one trailing NUL is always kept.
    pub fn encode(path: &Path) -> Result<Self> {
        let text = path.to_str().ok_or_else(|| SyncError::InvalidPayload {
            reason: format!("path is not valid UTF-8: {}", path.display()),
        })?;
        let bytes = text.as_bytes();
        if bytes.len() >= PAYLOAD_LEN {
            return Err(SyncError::PathTooLong {
                len: bytes.len(),
                max: PAYLOAD_LEN - 1,
            });
        }
        if bytes.contains(&0) {
            return Err(SyncError::InvalidPayload {
                reason: "path contains a NUL byte".to_string(),
            });
        }

        let mut buf = [0u8; PAYLOAD_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Decode the path up to the first NUL.
    pub fn decode(&self) -> Result<PathBuf> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_LEN);
        if end == 0 {
            return Err(SyncError::InvalidPayload {
                reason: "empty directory path".to_string(),
            });
        }
        let text = std::str::from_utf8(&self.0[..end]).map_err(|e| SyncError::InvalidPayload {
            reason: format!("path is not valid UTF-8: {}", e),
        })?;
        Ok(PathBuf::from(text))
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for DirectoryPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DirectoryPayload").field(&self.decode().ok()).finish()
    }
}

/// Editor end: accepts one host at a time.
#[derive(Debug)]
pub struct RendezvousListener {
    listener: TcpListener,
    read_timeout: Duration,
}

impl RendezvousListener {
    /// Bind on the loopback interface at `port` (0 lets the OS choose).
    pub fn bind(port: u16, read_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept a pending connection, if any, and read its payload.
    ///
    /// `Ok(None)` means nobody is connecting. An error means a host connected
    /// but the payload was unusable; the connection has been dropped and the
    /// listener remains ready for the next attempt.
    pub fn poll_accept(&self) -> Result<Option<(TcpStream, PathBuf)>> {
        let (mut stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        log::debug!("Rendezvous connection from {}", peer);

        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.read_timeout))?;

        let mut buf = [0u8; PAYLOAD_LEN];
        stream.read_exact(&mut buf)?;
        let dir = DirectoryPayload::from_bytes(buf).decode()?;

        if !dir.is_absolute() || !dir.is_dir() {
            return Err(SyncError::InvalidPayload {
                reason: format!("not an existing absolute directory: {}", dir.display()),
            });
        }
        Ok(Some((stream, dir)))
    }
}

/// Host end: connects to the editor and sends the payload once.
#[derive(Debug)]
pub struct RendezvousConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl RendezvousConnector {
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            connect_timeout,
            stream: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// One connect attempt. On success the payload is sent and the connection
    /// held open until `close`. Refused or reset connections are errors the
    /// caller retries on its next tick.
    pub fn try_propose(&mut self, payload: &DirectoryPayload) -> Result<()> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.write_all(payload.as_bytes())?;
        stream.flush()?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// True when the editor has closed or reset the held connection.
    ///
    /// The editor never writes on this socket, so end-of-stream or an error
    /// means it went away. Never blocks.
    pub fn peer_closed(&self) -> bool {
        let Some(stream) = &self.stream else {
            return true;
        };
        if let Err(e) = stream.set_nonblocking(true) {
            log::debug!("Cannot poll rendezvous connection: {}", e);
            return true;
        }

        let mut buf = [0u8; 1];
        match stream.peek(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                log::debug!("Rendezvous connection lost: {}", e);
                true
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
