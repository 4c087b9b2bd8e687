/// Length-prefixed, sequence-numbered packet framing
///
/// Every physical packet is a 4-byte header (3-byte little-endian payload
/// length, 1-byte sequence number) followed by the payload. Logical messages
/// of `MAX_PAYLOAD_LEN` bytes or more span several physical packets; the last
/// one is always shorter than the threshold, possibly empty.
///
/// Reads and writes share one wrapping sequence counter. A `PacketIo` must be
/// driven by a single owner at a time.
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::trace;

use super::buffered::BufferedReadConn;
use crate::error::{TidegateError, TidegateResult};

/// Default capacity of the output buffer
pub const DEFAULT_WRITER_SIZE: usize = 16 * 1024;

/// Segmentation threshold: largest payload a single physical packet carries
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;

/// Size of the physical packet header
pub const HEADER_LEN: usize = 4;

/// Packet reader/writer bound to one buffered connection
#[derive(Debug)]
pub struct PacketIo<S> {
    buf_writer: BufWriter<BufferedReadConn<S>>,
    sequence: u8,
    read_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketIo<S> {
    pub fn new(conn: BufferedReadConn<S>) -> Self {
        Self {
            buf_writer: BufWriter::with_capacity(DEFAULT_WRITER_SIZE, conn),
            sequence: 0,
            read_timeout: None,
        }
    }

    /// Rebind to a new buffered connection with a fresh writer.
    ///
    /// The sequence counter is kept. Bytes still sitting in the old writer are
    /// discarded; the previous connection is handed back to the caller.
    pub fn set_buffered_read_conn(&mut self, conn: BufferedReadConn<S>) -> BufferedReadConn<S> {
        let previous = std::mem::replace(
            &mut self.buf_writer,
            BufWriter::with_capacity(DEFAULT_WRITER_SIZE, conn),
        );
        previous.into_inner()
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn get_ref(&self) -> &BufferedReadConn<S> {
        self.buf_writer.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut BufferedReadConn<S> {
        self.buf_writer.get_mut()
    }

    /// Read exactly one physical packet and return its payload
    pub async fn read_one_packet(&mut self) -> TidegateResult<Bytes> {
        self.read_physical().await.map(BytesMut::freeze)
    }

    /// Read one logical message, reassembling segmented payloads
    pub async fn read_packet(&mut self) -> TidegateResult<Bytes> {
        let mut data = self.read_physical().await?;
        if data.len() < MAX_PAYLOAD_LEN {
            return Ok(data.freeze());
        }

        loop {
            let buf = self.read_physical().await?;
            data.extend_from_slice(&buf);
            if buf.len() < MAX_PAYLOAD_LEN {
                break;
            }
        }

        Ok(data.freeze())
    }

    /// Write one logical message, splitting it at the segmentation threshold.
    ///
    /// Nothing reaches the peer until `flush` is called.
    pub async fn write_packet(&mut self, data: &[u8]) -> TidegateResult<()> {
        let mut remaining = data;
        while remaining.len() >= MAX_PAYLOAD_LEN {
            let (chunk, rest) = remaining.split_at(MAX_PAYLOAD_LEN);
            self.write_physical(chunk).await?;
            remaining = rest;
        }
        // an exact multiple of the threshold ends with an empty packet
        self.write_physical(remaining).await
    }

    pub async fn flush(&mut self) -> TidegateResult<()> {
        self.buf_writer
            .flush()
            .await
            .map_err(|e| TidegateError::network("flush", e))
    }

    /// Flush pending output and shut the stream down
    pub async fn shutdown(&mut self) -> TidegateResult<()> {
        self.buf_writer
            .shutdown()
            .await
            .map_err(|e| TidegateError::network("shutdown", e))
    }

    async fn read_physical(&mut self) -> TidegateResult<BytesMut> {
        match self.read_timeout {
            // a read cut short by the deadline leaves the stream desynchronized
            Some(limit) => tokio::time::timeout(limit, self.read_physical_inner())
                .await
                .map_err(|_| TidegateError::timeout("read packet"))?,
            None => self.read_physical_inner().await,
        }
    }

    async fn read_physical_inner(&mut self) -> TidegateResult<BytesMut> {
        let conn = self.buf_writer.get_mut();

        let mut header = [0u8; HEADER_LEN];
        conn.read_exact(&mut header)
            .await
            .map_err(|e| TidegateError::network("read packet header", e))?;

        let sequence = header[3];
        if sequence != self.sequence {
            return Err(TidegateError::InvalidSequence {
                expected: self.sequence,
                got: sequence,
            });
        }
        self.sequence = self.sequence.wrapping_add(1);

        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let mut data = BytesMut::zeroed(length);
        conn.read_exact(&mut data)
            .await
            .map_err(|e| TidegateError::network("read packet payload", e))?;

        trace!(length, sequence, "read packet");
        Ok(data)
    }

    async fn write_physical(&mut self, payload: &[u8]) -> TidegateResult<()> {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
        let length = (payload.len() as u32).to_le_bytes();
        let header = [length[0], length[1], length[2], self.sequence];

        self.buf_writer
            .write_all(&header)
            .await
            .map_err(|e| TidegateError::bad_connection("write packet header", e))?;
        self.buf_writer
            .write_all(payload)
            .await
            .map_err(|e| TidegateError::bad_connection("write packet payload", e))?;

        trace!(length = payload.len(), sequence = self.sequence, "wrote packet");
        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }
}
