/// Per-connection scratch memory for short-lived request buffers
use bytes::BytesMut;

/// Size of the scratch region owned by each backend connection
pub const DEFAULT_ARENA_SIZE: usize = 32 * 1024;

/// Reusable fixed-capacity region that hands out zeroed buffers.
///
/// Buffers are carved off the front of one allocation. Once they have all been
/// dropped, `reset` makes the whole region available again. Requests larger
/// than what is left fall back to a plain heap allocation.
#[derive(Debug)]
pub struct ScratchArena {
    buf: BytesMut,
    capacity: usize,
}

impl ScratchArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn alloc(&mut self, len: usize) -> BytesMut {
        if len > self.buf.capacity() {
            return BytesMut::zeroed(len);
        }
        self.buf.resize(len, 0);
        self.buf.split_to(len)
    }

    /// Bytes that can still be handed out without touching the heap
    pub fn remaining(&self) -> usize {
        self.buf.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.buf.reserve(self.capacity);
    }

    /// Give the region back; later allocations come from the heap
    pub fn release(&mut self) {
        self.buf = BytesMut::new();
        self.capacity = 0;
    }
}

impl Default for ScratchArena {
    fn default() -> Self {
        Self::new(DEFAULT_ARENA_SIZE)
    }
}
