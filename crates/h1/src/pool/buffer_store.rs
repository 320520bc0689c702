use bytes::BytesMut;

use crate::config::EngineConfig;
use crate::ensure;
use crate::protocol::{CookieSpan, ParseError, Span, SpanRef, cookie};

/// Method bytes kept per request; longer methods are cut.
pub const METHOD_CAPACITY: usize = 32;

const SCRATCH_CAPACITY: usize = 4 * 1024;

/// Everything one in-flight request needs: the parsed request buffers and one scratch block
/// used to assemble the response head.
///
/// A store is leased from the [`BufferPool`](super::BufferPool) when a request starts and is
/// handed back when it finishes. Clearing keeps every capacity, so a recycled store serves
/// the next request without allocating.
#[derive(Debug)]
pub struct BufferStore {
    pub(crate) request: RequestBuffers,
    pub(crate) scratch: BytesMut,
}

impl BufferStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self { request: RequestBuffers::new(config), scratch: BytesMut::with_capacity(SCRATCH_CAPACITY) }
    }

    #[inline]
    pub fn request(&self) -> &RequestBuffers {
        &self.request
    }

    #[inline]
    pub fn request_mut(&mut self) -> &mut RequestBuffers {
        &mut self.request
    }

    pub fn clear(&mut self) {
        self.request.clear();
        self.scratch.clear();
    }
}

/// Fixed-capacity request buffers filled by the head parser.
///
/// The header buffer holds Latin-1 chars (one byte each): header keys, header values and the
/// host of an absolute-form URI. Everything else refers to it through [`Span`]s.
#[derive(Debug)]
pub struct RequestBuffers {
    method: [u8; METHOD_CAPACITY],
    method_len: usize,
    uri: Box<[u8]>,
    uri_len: usize,
    uri_truncated: bool,
    chars: Box<[u8]>,
    chars_len: usize,
    keys: Vec<Span>,
    values: Vec<Span>,
    cookies: Vec<CookieSpan>,
    max_headers: usize,
}

impl RequestBuffers {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            method: [0; METHOD_CAPACITY],
            method_len: 0,
            uri: vec![0; config.uri_buffer_size].into_boxed_slice(),
            uri_len: 0,
            uri_truncated: false,
            chars: vec![0; config.header_buffer_size].into_boxed_slice(),
            chars_len: 0,
            keys: Vec::with_capacity(config.max_headers),
            values: Vec::with_capacity(config.max_headers),
            cookies: Vec::with_capacity(16),
            max_headers: config.max_headers,
        }
    }

    pub fn clear(&mut self) {
        self.method_len = 0;
        self.uri_len = 0;
        self.uri_truncated = false;
        self.chars_len = 0;
        self.keys.clear();
        self.values.clear();
        self.cookies.clear();
    }

    #[inline]
    pub fn method(&self) -> &[u8] {
        &self.method[..self.method_len]
    }

    #[inline]
    pub fn uri(&self) -> &[u8] {
        &self.uri[..self.uri_len]
    }

    /// Whether the request URI was longer than the URI buffer.
    #[inline]
    pub fn is_uri_truncated(&self) -> bool {
        self.uri_truncated
    }

    /// The filled part of the header buffer.
    #[inline]
    pub fn chars(&self) -> &[u8] {
        &self.chars[..self.chars_len]
    }

    #[inline]
    pub fn resolve(&self, span: Span) -> SpanRef<'_> {
        SpanRef::new(&self.chars[span.range()])
    }

    #[inline]
    pub fn header_count(&self) -> usize {
        self.keys.len()
    }

    pub fn header_spans(&self) -> impl Iterator<Item = (Span, Span)> + '_ {
        self.keys.iter().copied().zip(self.values.iter().copied())
    }

    #[inline]
    pub fn cookie_spans(&self) -> &[CookieSpan] {
        &self.cookies
    }

    #[inline]
    pub(crate) fn push_method(&mut self, b: u8) {
        if self.method_len < METHOD_CAPACITY {
            self.method[self.method_len] = b;
            self.method_len += 1;
        }
    }

    /// Copies URI bytes, dropping whatever does not fit.
    pub(crate) fn push_uri(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.uri.len() - self.uri_len);
        self.uri[self.uri_len..self.uri_len + n].copy_from_slice(&bytes[..n]);
        self.uri_len += n;
        if n < bytes.len() {
            self.uri_truncated = true;
        }
    }

    #[inline]
    pub(crate) fn chars_len(&self) -> usize {
        self.chars_len
    }

    pub(crate) fn push_char(&mut self, b: u8) -> Result<(), ParseError> {
        ensure!(self.chars_len < self.chars.len(), ParseError::too_large_header(self.chars_len + 1, self.chars.len()));
        self.chars[self.chars_len] = b;
        self.chars_len += 1;
        Ok(())
    }

    pub(crate) fn push_chars(&mut self, bytes: &[u8]) -> Result<Span, ParseError> {
        let start = self.chars_len;
        let end = start + bytes.len();
        ensure!(end <= self.chars.len(), ParseError::too_large_header(end, self.chars.len()));
        self.chars[start..end].copy_from_slice(bytes);
        self.chars_len = end;
        Ok(Span::from_range(start..end))
    }

    /// Drops chars written after `len`.
    #[inline]
    pub(crate) fn truncate_chars(&mut self, len: usize) {
        self.chars_len = self.chars_len.min(len);
    }

    pub(crate) fn push_header(&mut self, key: Span, value: Span) -> Result<(), ParseError> {
        ensure!(self.keys.len() < self.max_headers, ParseError::too_many_headers(self.max_headers));
        self.keys.push(key);
        self.values.push(value);
        Ok(())
    }

    /// Records the cookies of a `Cookie` header value already stored at `value`.
    pub(crate) fn scan_cookies(&mut self, value: Span) {
        cookie::scan_cookies(&self.chars[value.range()], value.offset(), &mut self.cookies);
    }
}
