/// Stream dialers used by backend connections
///
/// `TcpDialer` is the production dialer. `DuplexDialer` hands out one end of
/// an in-memory pipe so the codec and connection lifecycle can be exercised
/// without sockets.
use async_trait::async_trait;
use socket2::SockRef;
use std::io;
use std::sync::Mutex;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// Opens a raw byte stream to a backend address
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self, address: &str) -> io::Result<Self::Stream>;
}

/// TCP dialer with latency-oriented socket options
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    keep_alive: bool,
}

impl TcpDialer {
    pub fn new(keep_alive: bool) -> Self {
        Self { keep_alive }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        if self.keep_alive {
            SockRef::from(&stream).set_keepalive(true)?;
        }
        Ok(stream)
    }
}

/// One-shot in-memory dialer
#[derive(Debug)]
pub struct DuplexDialer {
    stream: Mutex<Option<DuplexStream>>,
}

impl DuplexDialer {
    /// Returns the dialer and the peer end of the pipe
    pub fn new_pair(max_buf_size: usize) -> (Self, DuplexStream) {
        let (local, peer) = duplex(max_buf_size);
        let dialer = Self {
            stream: Mutex::new(Some(local)),
        };
        (dialer, peer)
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    type Stream = DuplexStream;

    async fn dial(&self, _address: &str) -> io::Result<DuplexStream> {
        let taken = self
            .stream
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "duplex dialer poisoned"))?
            .take();
        taken.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "duplex dialer already used"))
    }
}
