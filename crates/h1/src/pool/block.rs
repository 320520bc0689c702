use crate::config::MAX_BLOCK_PAYLOAD;

/// Bytes reserved in front of every block payload for `CRLF + 4 hex digits + CRLF`.
pub const CHUNK_HEADER_RESERVE: usize = 8;

/// A fixed-size output block.
///
/// The first [`CHUNK_HEADER_RESERVE`] bytes are never written by [`Block::push`]; the chunked
/// encoder patches the chunk header into them once the payload length is known, so a framed
/// block goes out as one contiguous slice.
#[derive(Debug)]
pub struct Block {
    buf: Box<[u8]>,
    len: usize,
}

impl Block {
    /// A block of `block_size` bytes, clamped so the payload is at least one byte and never
    /// more than a chunk header can describe.
    pub(crate) fn new(block_size: usize) -> Self {
        let size = block_size.clamp(CHUNK_HEADER_RESERVE + 1, MAX_BLOCK_PAYLOAD + CHUNK_HEADER_RESERVE);
        Self { buf: vec![0; size].into_boxed_slice(), len: 0 }
    }

    /// Payload capacity, excluding the reserved framing bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len() - CHUNK_HEADER_RESERVE
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buf[CHUNK_HEADER_RESERVE..CHUNK_HEADER_RESERVE + self.len]
    }

    /// Copies as much of `data` as fits and returns how many bytes were taken.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        let start = CHUNK_HEADER_RESERVE + self.len;
        self.buf[start..start + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// The reserved framing bytes followed by the payload.
    #[inline]
    pub(crate) fn framed_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..CHUNK_HEADER_RESERVE + self.len]
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
