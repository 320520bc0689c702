use http::{Method, Version};

use crate::pool::RequestBuffers;
use crate::protocol::{RequestCookie, Span, SpanRef};
use crate::utils::eq_ignore_case;

/// What the head parser learned about a request besides the bytes kept in the store.
///
/// A `RequestHead` is `Copy` and carries no data of its own: method, URI, header and cookie
/// bytes stay in the [`RequestBuffers`] the head was parsed into. [`Request`] puts both
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHead {
    pub(crate) version: Version,
    pub(crate) content_length: Option<u64>,
    pub(crate) host: Option<Span>,
    pub(crate) uri_host: Option<Span>,
    pub(crate) keepalive: bool,
    pub(crate) expect_continue: bool,
    pub(crate) transfer_encoding: bool,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            version: Version::HTTP_09,
            content_length: None,
            host: None,
            uri_host: None,
            keepalive: true,
            expect_continue: false,
            transfer_encoding: false,
        }
    }
}

impl RequestHead {
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// `false` once the request ruled out connection reuse (`Connection: close`, pre-1.1).
    #[inline]
    pub fn is_keepalive(&self) -> bool {
        self.keepalive
    }

    #[inline]
    pub fn expects_continue(&self) -> bool {
        self.expect_continue
    }

    #[inline]
    pub fn has_transfer_encoding(&self) -> bool {
        self.transfer_encoding
    }
}

/// Read-only view of the request being processed.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    head: &'a RequestHead,
    buffers: &'a RequestBuffers,
}

impl<'a> Request<'a> {
    pub fn new(head: &'a RequestHead, buffers: &'a RequestBuffers) -> Self {
        Self { head, buffers }
    }

    #[inline]
    pub fn head(&self) -> &'a RequestHead {
        self.head
    }

    /// The uppercased method bytes.
    #[inline]
    pub fn method_bytes(&self) -> &'a [u8] {
        self.buffers.method()
    }

    /// The method, `None` when the bytes are not a valid token.
    pub fn method(&self) -> Option<Method> {
        Method::from_bytes(self.method_bytes()).ok()
    }

    #[inline]
    pub fn is_head(&self) -> bool {
        self.method_bytes() == b"HEAD"
    }

    /// The request target as received, without the scheme and host of an absolute URI.
    #[inline]
    pub fn uri(&self) -> &'a [u8] {
        self.buffers.uri()
    }

    pub fn path(&self) -> &'a [u8] {
        let uri = self.uri();
        uri.iter().position(|b| *b == b'?').map_or(uri, |i| &uri[..i])
    }

    pub fn query(&self) -> Option<&'a [u8]> {
        let uri = self.uri();
        uri.iter().position(|b| *b == b'?').map(|i| &uri[i + 1..])
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// The host of an absolute-form URI, otherwise the `Host` header.
    pub fn host(&self) -> Option<SpanRef<'a>> {
        self.head.uri_host.or(self.head.host).map(|span| self.buffers.resolve(span))
    }

    /// The first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<SpanRef<'a>> {
        let buffers = self.buffers;
        buffers
            .header_spans()
            .find(|(key, _)| eq_ignore_case(buffers.resolve(*key).as_bytes(), name.as_bytes()))
            .map(|(_, value)| buffers.resolve(value))
    }

    /// Stored headers in arrival order. `Expect: 100-continue` is never stored.
    pub fn headers(&self) -> impl Iterator<Item = (SpanRef<'a>, SpanRef<'a>)> + 'a {
        let buffers = self.buffers;
        buffers.header_spans().map(move |(key, value)| (buffers.resolve(key), buffers.resolve(value)))
    }

    #[inline]
    pub fn header_count(&self) -> usize {
        self.buffers.header_count()
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.head.content_length
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.head.transfer_encoding
    }

    #[inline]
    pub fn expects_continue(&self) -> bool {
        self.head.expect_continue
    }

    #[inline]
    pub fn is_keepalive(&self) -> bool {
        self.head.keepalive
    }

    pub fn cookies(&self) -> impl Iterator<Item = RequestCookie<'a>> + 'a {
        let buffers = self.buffers;
        buffers.cookie_spans().iter().map(move |c| RequestCookie {
            name: buffers.resolve(c.name),
            value: buffers.resolve(c.value),
            path: c.path.map(|s| buffers.resolve(s)),
            domain: c.domain.map(|s| buffers.resolve(s)),
            port: c.port.map(|s| buffers.resolve(s)),
            version: c.version,
        })
    }

    /// Value of the first cookie named `name`; cookie names are case-sensitive.
    pub fn cookie(&self, name: &str) -> Option<SpanRef<'a>> {
        self.cookies().find(|c| c.name.as_bytes() == name.as_bytes()).map(|c| c.value)
    }
}

/// Per-request facts the response side needs, passed explicitly instead of read from ambient
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub version: Version,
    pub head_method: bool,
    /// The request allows reuse of the connection.
    pub keepalive: bool,
    /// The connection may serve another request after this one.
    pub keepalive_capacity: bool,
    /// The connection switches protocols after this response.
    pub duplex: bool,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { version: Version::HTTP_11, head_method: false, keepalive: false, keepalive_capacity: false, duplex: false }
    }
}
