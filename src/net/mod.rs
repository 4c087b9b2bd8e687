/// Backend wire transport: buffered stream and packet framing
pub mod buffered;
pub mod packet;

pub use buffered::{BufferedReadConn, DEFAULT_READER_SIZE};
pub use packet::{PacketIo, DEFAULT_WRITER_SIZE, HEADER_LEN, MAX_PAYLOAD_LEN};
