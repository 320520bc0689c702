//! Connection handling.
//!
//! - [`HttpConnection`]: drives one connection, request by request
//! - [`Exchange`]: the request view, body input and [`Response`] handed to a handler
//! - [`StreamState`], [`KeepAlive`] and [`RequestLifecycle`]: the state machines that decide
//!   when a response is committed and closed and whether the connection is reused
//!
//! A request goes through these steps:
//!
//! 1. a [`BufferStore`](crate::pool::BufferStore) is leased and the head parsed into it
//! 2. the body decoder is selected, a request that can't be framed gets `400` and the
//!    connection closes
//! 3. the handler runs; when it fails an uncommitted response is replaced by a `500`
//! 4. the response is closed, the unread body skipped and the store handed back
//!
//! A handler may [suspend](Exchange::suspend) the request instead, leaving step 4 to
//! [`HttpConnection::complete`], or [upgrade](Exchange::upgrade) the connection, after which
//! [`HttpConnection::into_parts`] returns the raw streams.

mod exchange;
mod http_connection;
mod lifecycle;

pub use exchange::{BodyState, Exchange, Response};
pub use http_connection::{ConnectionOutcome, HttpConnection, RequestOutcome};
pub use lifecycle::{KeepAlive, RequestLifecycle, StreamState};
