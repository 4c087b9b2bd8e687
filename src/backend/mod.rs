/// Backend connection lifecycle
///
/// A backend connection dials one backend address, wraps the stream in a
/// buffered connection and a packet codec, and tears both down on close.
/// Phases only move forward: Unconnected -> Connected -> Closed. A connection
/// whose `connect` failed, or that has been closed, is discarded by the caller.
pub mod arena;
pub mod dialer;
pub mod selector;

pub use arena::{ScratchArena, DEFAULT_ARENA_SIZE};
pub use dialer::{Dialer, DuplexDialer, TcpDialer};
pub use selector::{
    connect_namespace_backend, selector_for, RandomSelector, RoundRobinSelector, Selector,
    SelectorType,
};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{TidegateError, TidegateResult};
use crate::net::{BufferedReadConn, PacketIo};

/// Bound on establishing the backend stream
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle phase of a backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Unconnected,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Unconnected => write!(f, "unconnected"),
            ConnectionPhase::Connected => write!(f, "connected"),
            ConnectionPhase::Closed => write!(f, "closed"),
        }
    }
}

/// Capability set of one outbound backend connection
#[async_trait]
pub trait BackendConnection: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Dial the backend and bind a packet codec to the stream
    async fn connect(&mut self) -> TidegateResult<()>;

    /// The connection's packet codec; only available while connected
    fn packet_io(&mut self) -> TidegateResult<&mut PacketIo<Self::Stream>>;

    /// Shut the stream down. Not idempotent: a second call fails.
    async fn close(&mut self) -> TidegateResult<()>;

    fn address(&self) -> &str;

    fn phase(&self) -> ConnectionPhase;
}

/// Backend connection over a pluggable dialer
pub struct BackendConnectionImpl<D: Dialer> {
    pkt: Option<PacketIo<D::Stream>>,
    alloc: ScratchArena,
    phase: ConnectionPhase,
    capability: u32,
    address: String,
    dialer: D,
    dial_timeout: Duration,
}

impl BackendConnectionImpl<TcpDialer> {
    pub fn new<A: Into<String>>(address: A) -> Self {
        Self::with_dialer(address, TcpDialer::default())
    }
}

impl<D: Dialer> BackendConnectionImpl<D> {
    pub fn with_dialer<A: Into<String>>(address: A, dialer: D) -> Self {
        Self {
            pkt: None,
            alloc: ScratchArena::new(DEFAULT_ARENA_SIZE),
            phase: ConnectionPhase::Unconnected,
            capability: 0,
            address: address.into(),
            dialer,
            dial_timeout: DIAL_TIMEOUT,
        }
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Capability flags negotiated by the handshake layer
    pub fn capability(&self) -> u32 {
        self.capability
    }

    pub fn set_capability(&mut self, capability: u32) {
        self.capability = capability;
    }

    /// Scratch memory for transient per-request buffers
    pub fn alloc(&mut self) -> &mut ScratchArena {
        &mut self.alloc
    }

    fn not_connected(&self) -> TidegateError {
        TidegateError::NotConnected {
            address: self.address.clone(),
        }
    }

    fn closed(&self) -> TidegateError {
        TidegateError::Closed {
            address: self.address.clone(),
        }
    }
}

impl<D: Dialer> fmt::Debug for BackendConnectionImpl<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConnectionImpl")
            .field("address", &self.address)
            .field("phase", &self.phase)
            .field("capability", &self.capability)
            .field("dial_timeout", &self.dial_timeout)
            .finish()
    }
}

#[async_trait]
impl<D: Dialer> BackendConnection for BackendConnectionImpl<D> {
    type Stream = D::Stream;

    async fn connect(&mut self) -> TidegateResult<()> {
        match self.phase {
            ConnectionPhase::Unconnected => {}
            ConnectionPhase::Connected => {
                return Err(TidegateError::backend(format!(
                    "backend {} is already connected",
                    self.address
                )))
            }
            ConnectionPhase::Closed => return Err(self.closed()),
        }

        debug!(address = %self.address, "dialing backend");
        let stream = match timeout(self.dial_timeout, self.dialer.dial(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "dial backend failed");
                return Err(TidegateError::dial(&self.address, e.to_string()));
            }
            Err(_) => {
                debug!(address = %self.address, "dial backend timed out");
                return Err(TidegateError::dial(
                    &self.address,
                    format!("timed out after {:?}", self.dial_timeout),
                ));
            }
        };

        self.pkt = Some(PacketIo::new(BufferedReadConn::new(stream)));
        self.phase = ConnectionPhase::Connected;
        debug!(address = %self.address, "backend connected");
        Ok(())
    }

    fn packet_io(&mut self) -> TidegateResult<&mut PacketIo<D::Stream>> {
        match self.phase {
            ConnectionPhase::Unconnected => Err(self.not_connected()),
            ConnectionPhase::Closed => Err(self.closed()),
            ConnectionPhase::Connected => {
                let address = &self.address;
                self.pkt.as_mut().ok_or_else(|| TidegateError::NotConnected {
                    address: address.clone(),
                })
            }
        }
    }

    async fn close(&mut self) -> TidegateResult<()> {
        match self.phase {
            ConnectionPhase::Unconnected => return Err(self.not_connected()),
            ConnectionPhase::Closed => return Err(self.closed()),
            ConnectionPhase::Connected => {}
        }

        self.phase = ConnectionPhase::Closed;
        self.alloc.release();
        let mut pkt = self.pkt.take().ok_or_else(|| self.not_connected())?;
        debug!(address = %self.address, "closing backend connection");
        pkt.shutdown().await
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn phase(&self) -> ConnectionPhase {
        self.phase
    }
}
