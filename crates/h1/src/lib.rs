//! A connection-level HTTP/1.x engine
//!
//! This crate turns the bytes of a socket into parsed requests, buffers and frames the
//! responses written to them, and decides whether a connection may be reused. Routing,
//! sessions and caching policy belong to the application; the engine hands each request to a
//! [`handler::Handler`] and offers hook points for the rest.
//!
//! # Features
//!
//! - HTTP/0.9, HTTP/1.0 and HTTP/1.1 on any `AsyncRead` / `AsyncWrite` pair
//! - Request heads parsed into pooled fixed-size buffers, no allocation per request once warm
//! - Response bodies buffered in pooled blocks and sent with `Content-Length` or chunked
//! - Keep-alive, pipelining, `Expect: 100-continue`, protocol upgrades and suspended requests
//! - Classic and versioned `Set-Cookie`, trailers, cache-control policy flags
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use micro_h1::connection::{Exchange, HttpConnection};
//! use micro_h1::handler::Handler;
//! use micro_h1::pool::BufferPool;
//! use micro_h1::protocol::HttpError;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! struct HelloWorld;
//!
//! #[async_trait]
//! impl Handler for HelloWorld {
//!     type Error = HttpError;
//!
//!     async fn call(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error> {
//!         let path = String::from_utf8_lossy(exchange.request().path()).into_owned();
//!         info!(path, "request received");
//!
//!         let body = exchange.read_to_end().await?;
//!         info!(len = body.len(), "request body received");
//!
//!         let response = exchange.response();
//!         response.set_content_type("text/plain");
//!         response.print("Hello World!\r\n").await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let pool = Arc::new(BufferPool::default());
//!     let handler = Arc::new(HelloWorld);
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let pool = Arc::clone(&pool);
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let mut connection = HttpConnection::with_pool(reader, writer, pool);
//!             if let Err(e) = connection.process(&handler).await {
//!                 error!(cause = %e, "connection failed");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the connection driver, the per-request [`connection::Exchange`] and the
//!   lifecycle state machines
//! - [`codec`]: head parsing, body decoders, chunked framing and head serialization
//! - [`response`]: the buffered response stream, output encodings and cache hook points
//! - [`pool`]: pooled request stores and output blocks
//! - [`protocol`]: request view, response head, cookies and errors
//! - [`config`]: [`config::EngineConfig`], loadable from TOML
//! - [`handler`]: the [`handler::Handler`] trait
//!
//! # Error Handling
//!
//! - [`protocol::ParseError`]: malformed or truncated requests, answered with `400`
//! - [`protocol::SendError`]: socket failures while responding, client disconnects included
//! - [`protocol::ResponseError`]: misuse of the response that leaves it usable
//! - [`protocol::LifecycleError`]: broken request or stream state transitions
//! - [`protocol::HttpError`]: the top-level error wrapping all of the above
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS, no accept loop, no timeouts: those belong to the embedding server

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod response;

mod utils;
pub(crate) use utils::ensure;
