//! TCP transport to the headset
//!
//! Reads are non-blocking polls: a tick drains whatever the socket has ready
//! and returns as soon as nothing more is available.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::subsystem::TransportSubsystem;

/// Byte source polled once per tick
pub trait Transport: Send {
    /// Read whatever is ready into `buf`.
    ///
    /// `Ok(None)` means nothing is ready right now. A closed peer is reported
    /// as `NetworkError::PeerClosed`.
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, NetworkError>;

    /// Remote address, if known
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Establishes transports to a remote endpoint
pub trait Connector: Send + Sync {
    fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Transport>, NetworkError>;
}

/// Non-blocking TCP stream
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }
}

impl Transport for TcpTransport {
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, NetworkError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match self.stream.read(buf) {
            Ok(0) => Err(NetworkError::PeerClosed),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// Connects over TCP using `socket2` for socket options
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    recv_buffer_size: usize,
}

impl TcpConnector {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            recv_buffer_size: config.recv_buffer_size,
        }
    }

    fn connect_addr(&self, addr: SocketAddr) -> Result<TcpStream, NetworkError> {
        let fail = |e: std::io::Error| NetworkError::ConnectionFailed(format!("{}: {}", addr, e));

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(fail)?;

        if self.recv_buffer_size > 0 {
            if let Err(e) = socket.set_recv_buffer_size(self.recv_buffer_size) {
                tracing::warn!("Failed to set receive buffer size: {}", e);
            }
        }

        socket.connect_timeout(&addr.into(), self.connect_timeout).map_err(fail)?;
        socket.set_nodelay(true).map_err(fail)?;
        socket.set_nonblocking(true).map_err(fail)?;

        Ok(socket.into())
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(&NetworkConfig::default())
    }
}

impl Connector for TcpConnector {
    fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Transport>, NetworkError> {
        if !TransportSubsystem::is_initialized() {
            return Err(NetworkError::SubsystemNotInitialized);
        }

        let endpoint = format!("{}:{}", address, port);
        let addrs: Vec<SocketAddr> = (address, port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::ResolveFailed(format!("{}: {}", endpoint, e)))?
            .collect();

        let mut last_error = NetworkError::ResolveFailed(endpoint);
        for addr in addrs {
            match self.connect_addr(addr) {
                Ok(stream) => {
                    tracing::debug!("Connected to {}", addr);
                    return Ok(Box::new(TcpTransport::new(stream, addr)));
                }
                Err(e) => {
                    tracing::warn!("Connect attempt failed: {}", e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
