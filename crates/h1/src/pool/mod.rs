//! Reusable fixed-size buffers.
//!
//! - [`BufferStore`]: per-request parse buffers plus one scratch block, leased for the
//!   duration of one request
//! - [`Block`]: a fixed-size output block with room reserved for chunk framing
//! - [`BufferPool`]: thread-safe free lists for both, shared by all connections
//!
//! Once the pool is warm a keep-alive request allocates nothing for parsing or buffering.

mod block;
mod buffer_pool;
mod buffer_store;

pub use block::{Block, CHUNK_HEADER_RESERVE};
pub use buffer_pool::{BufferPool, PoolStats};
pub use buffer_store::{BufferStore, METHOD_CAPACITY, RequestBuffers};
