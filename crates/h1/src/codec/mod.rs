//! Wire-level encoding and decoding.
//!
//! The request side implements [`tokio_util::codec::Decoder`]: [`HeaderDecoder`] produces a
//! [`RequestHead`](crate::protocol::RequestHead), then [`PayloadDecoder`] yields the body as
//! [`PayloadItem`](crate::protocol::PayloadItem)s. Both consume exactly their own bytes from
//! the read buffer, which keeps pipelined requests intact.
//!
//! The response side writes straight into byte buffers: [`HeaderEncoder`] renders the head
//! once per response and [`ChunkedEncoder`] frames output blocks in place.
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h1::codec::HeaderDecoder;
//! use micro_h1::config::EngineConfig;
//! use micro_h1::pool::RequestBuffers;
//! use micro_h1::protocol::Request;
//! use tokio_util::codec::Decoder;
//!
//! let config = EngineConfig::default();
//! let mut buffers = RequestBuffers::new(&config);
//! let mut src = BytesMut::from(&b"GET /a?b=1 HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
//!
//! let head = HeaderDecoder::new(&mut buffers, config.max_head_bytes).decode(&mut src).unwrap().unwrap();
//! let request = Request::new(&head, &buffers);
//! assert_eq!(request.path(), b"/a");
//! assert_eq!(request.host().unwrap(), "x");
//! ```

mod body;
mod date;
mod header;

pub use body::{ChunkedDecoder, ChunkedEncoder, LengthDecoder, PayloadDecoder, RawDecoder};
pub use date::DateCache;
pub use header::{Charset, HeadOutcome, HeaderDecoder, HeaderEncoder};
