//! Protocol types shared by the codec, the response stream and the connection.
//!
//! - **Request side**: [`RequestHead`] holds what the head parser learned,
//!   [`Request`] is the read-only view handed to handlers, and [`Span`]/[`SpanRef`] address
//!   bytes inside the pooled header buffer
//! - **Response side**: [`ResponseHead`] collects status, headers, footers,
//!   cookies and cache flags until the head is written
//! - **Cookies** ([`cookie`]): request cookie scanning and `Set-Cookie` rendering
//! - **Body items**: [`PayloadItem`] and [`PayloadSize`]
//! - **Errors**: [`HttpError`] and its sources
//!
//! Nothing here performs I/O.

pub mod cookie;
mod error;
mod message;
mod request;
mod response;
mod span;

pub use cookie::{CookieSpan, RequestCookie, SetCookie};
pub use error::{HttpError, LifecycleError, ParseError, ResponseError, SendError};
pub use message::{PayloadItem, PayloadSize};
pub use request::{Request, RequestContext, RequestHead};
pub use response::{CachePolicy, ResponseHead};
pub use span::{Span, SpanRef};
