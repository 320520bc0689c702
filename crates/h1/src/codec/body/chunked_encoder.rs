//! Response body in chunked transfer-encoding.
//!
//! Chunks are framed in place: every [`Block`] keeps [`CHUNK_HEADER_RESERVE`] bytes in front
//! of its payload, and once the payload length is known they are patched with
//! `CRLF <4 hex digits> CRLF`. The leading CRLF ends the previous chunk, or the response head,
//! which is written without its last CRLF when the body is chunked.

use bytes::{BufMut, BytesMut};

use crate::pool::{Block, CHUNK_HEADER_RESERVE};

const HEX: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    chunks: u64,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { chunks: 0 }
    }

    /// Number of chunks framed so far.
    #[inline]
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Patches the chunk header of `block` and returns the framed bytes. An empty block
    /// frames to an empty slice: an empty chunk would end the body.
    pub fn frame<'b>(&mut self, block: &'b mut Block) -> &'b [u8] {
        let len = block.len();
        if len == 0 {
            return &[];
        }
        debug_assert!(len <= 0xFFFF, "block payload exceeds four hex digits");

        let framed = block.framed_mut();
        framed[0] = b'\r';
        framed[1] = b'\n';
        framed[2] = HEX[(len >> 12) & 0xF];
        framed[3] = HEX[(len >> 8) & 0xF];
        framed[4] = HEX[(len >> 4) & 0xF];
        framed[5] = HEX[len & 0xF];
        framed[6] = b'\r';
        framed[7] = b'\n';
        debug_assert_eq!(CHUNK_HEADER_RESERVE, 8);

        self.chunks += 1;
        framed
    }

    /// Writes the terminal chunk, followed by the footers if any were registered.
    pub fn write_tail(&mut self, footers: &[(String, String)], dst: &mut BytesMut) {
        if footers.is_empty() {
            dst.put_slice(b"\r\n0\r\n\r\n");
            return;
        }

        dst.put_slice(b"\r\n0\r\n");
        for (name, value) in footers {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }
}
