//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: tokenizes a request line and headers into pooled buffers
//! - [`HeaderEncoder`]: writes the status line, headers, cookies and framing of a response

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::{Charset, HeadOutcome, HeaderEncoder};
