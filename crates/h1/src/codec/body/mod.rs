//! Message bodies.
//!
//! Request side: [`PayloadDecoder`] selects one of [`LengthDecoder`], [`ChunkedDecoder`] or
//! [`RawDecoder`] from the parsed head and yields [`PayloadItem`](crate::protocol::PayloadItem)s.
//!
//! Response side: [`ChunkedEncoder`] frames pooled output blocks in place.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod payload_decoder;
mod raw_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;
pub use raw_decoder::RawDecoder;
