//! The response side of an exchange.
//!
//! [`ResponseStream`] buffers the body in pooled blocks, writes the head on commit and frames
//! the body for the wire. [`OutputEncoding`] converts printed chars into bytes, and the
//! [`CacheTap`] / [`CachedResponse`] pair connects an external response cache.

mod cache;
mod char_encoder;
mod response_stream;

pub use cache::{CacheTap, CachedResponse};
pub use char_encoder::OutputEncoding;
pub use response_stream::{Output, ResponseStream};
