/// Read-buffered stream wrapper
///
/// All reads observed by consumers pass through a fixed-size input buffer.
/// Writes, flushes and shutdowns go straight to the wrapped stream.
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader, ReadBuf};

/// Default capacity of the input buffer
pub const DEFAULT_READER_SIZE: usize = 16 * 1024;

/// A stream whose reads are served from an input buffer
#[derive(Debug)]
pub struct BufferedReadConn<S> {
    rb: BufReader<S>,
}

impl<S: AsyncRead> BufferedReadConn<S> {
    pub fn new(conn: S) -> Self {
        Self::with_capacity(DEFAULT_READER_SIZE, conn)
    }

    pub fn with_capacity(capacity: usize, conn: S) -> Self {
        Self {
            rb: BufReader::with_capacity(capacity, conn),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.rb.get_ref()
    }

    /// Access the raw stream, e.g. to tune socket options.
    /// Reading from it directly bypasses the buffer.
    pub fn get_mut(&mut self) -> &mut S {
        self.rb.get_mut()
    }

    /// Number of bytes read from the stream but not yet consumed
    pub fn buffered_len(&self) -> usize {
        self.rb.buffer().len()
    }

    /// Unwrap the stream. Any buffered input is lost.
    pub fn into_inner(self) -> S {
        self.rb.into_inner()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for BufferedReadConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().rb).poll_read(cx, buf)
    }
}

impl<S: AsyncRead + Unpin> AsyncBufRead for BufferedReadConn<S> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().rb).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().rb).consume(amt)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for BufferedReadConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(self.get_mut().rb.get_mut()).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(self.get_mut().rb.get_mut()).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.rb.get_ref().is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().rb.get_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().rb.get_mut()).poll_shutdown(cx)
    }
}
