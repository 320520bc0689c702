//! The per-request handle given to a [`Handler`](crate::handler::Handler).

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::PayloadDecoder;
use crate::connection::RequestLifecycle;
use crate::protocol::{CachePolicy, HttpError, ParseError, PayloadItem, Request, ResponseError, ResponseHead, SetCookie};
use crate::response::{CacheTap, CachedResponse, Output, ResponseStream};

/// Bytes reserved in the read buffer before every socket read.
const READ_RESERVE: usize = 4 * 1024;

/// Body input of the request in flight.
#[derive(Debug, Default)]
pub struct BodyState {
    decoder: Option<PayloadDecoder>,
    eof: bool,
    continue_pending: bool,
    malformed: bool,
}

impl BodyState {
    pub(crate) fn start(&mut self, decoder: PayloadDecoder, expect_continue: bool) {
        self.eof = decoder.is_empty();
        self.decoder = Some(decoder);
        self.continue_pending = expect_continue && !self.eof;
    }

    pub(crate) fn switch_to_raw(&mut self) {
        self.decoder = Some(PayloadDecoder::raw());
        self.eof = false;
        self.continue_pending = false;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// The client waits for `100 Continue` before sending the body.
    #[inline]
    pub fn is_continue_pending(&self) -> bool {
        self.continue_pending
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The body failed to decode; the rest of the connection's input can't be trusted.
    #[inline]
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    #[inline]
    pub fn is_raw(&self) -> bool {
        self.decoder.as_ref().is_some_and(PayloadDecoder::is_raw)
    }

    /// Next piece of the body, `None` once it ended. A malformed body ends the input for
    /// good.
    pub(crate) async fn next_chunk(
        &mut self,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
        read_buf: &mut BytesMut,
    ) -> Result<Option<Bytes>, ParseError> {
        let result = self.decode_next(reader, read_buf).await;
        if let Err(e) = &result {
            if e.is_malformed() {
                self.malformed = true;
                self.eof = true;
            }
        }
        result
    }

    async fn decode_next(
        &mut self,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
        read_buf: &mut BytesMut,
    ) -> Result<Option<Bytes>, ParseError> {
        loop {
            if self.eof {
                return Ok(None);
            }
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(None);
            };

            match decoder.decode(read_buf)? {
                Some(PayloadItem::Chunk(bytes)) => return Ok(Some(bytes)),
                Some(PayloadItem::Eof) => {
                    self.eof = true;
                    return Ok(None);
                }
                None => {}
            }

            read_buf.reserve(READ_RESERVE);
            if reader.read_buf(read_buf).await? == 0 {
                return match decoder.decode_eof(read_buf)? {
                    Some(PayloadItem::Chunk(bytes)) => Ok(Some(bytes)),
                    Some(PayloadItem::Eof) | None => {
                        self.eof = true;
                        Ok(None)
                    }
                };
            }
        }
    }

    /// Reads and drops what is left of the body, returning how many bytes were dropped.
    pub(crate) async fn skip(
        &mut self,
        reader: &mut (dyn AsyncRead + Unpin + Send + '_),
        read_buf: &mut BytesMut,
    ) -> Result<u64, ParseError> {
        let mut skipped = 0;
        while let Some(bytes) = self.next_chunk(reader, read_buf).await? {
            skipped += bytes.len() as u64;
        }
        if skipped > 0 {
            debug!(skipped, "unread request body skipped");
        }
        Ok(skipped)
    }
}

/// The response half of an [`Exchange`].
///
/// Header setters work until the head is committed; after that they change nothing on the
/// wire.
#[derive(Debug)]
pub struct Response<'c> {
    stream: &'c mut ResponseStream,
    out: Output<'c>,
}

impl<'c> Response<'c> {
    pub(crate) fn new(stream: &'c mut ResponseStream, out: Output<'c>) -> Self {
        Self { stream, out }
    }

    #[inline]
    pub fn head(&self) -> &ResponseHead {
        self.stream.head()
    }

    #[inline]
    pub fn head_mut(&mut self) -> &mut ResponseHead {
        self.stream.head_mut()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.stream.head_mut().set_status(status);
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.stream.head_mut().set_header(name, value);
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.stream.head_mut().add_header(name, value);
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.stream.head_mut().set_content_type(content_type);
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.stream.head_mut().set_content_length(length);
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.stream.head_mut().add_cookie(cookie);
    }

    /// Sends a trailer field after the last chunk. A response with footers is always chunked.
    pub fn add_footer(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.stream.head_mut().add_footer(name, value);
    }

    pub fn cache_policy_mut(&mut self) -> &mut CachePolicy {
        self.stream.head_mut().cache_policy_mut()
    }

    /// See [`ResponseStream::set_encoding`].
    pub fn set_encoding(&mut self, label: &str) -> Result<(), ResponseError> {
        self.stream.set_encoding(label)
    }

    pub fn set_buffer_size(&mut self, size: usize) -> Result<(), ResponseError> {
        self.stream.set_buffer_size(size)
    }

    pub fn clear_buffer(&mut self) -> Result<(), ResponseError> {
        self.stream.clear_buffer()
    }

    pub fn set_cache_tap(&mut self, tap: Box<dyn CacheTap>) {
        self.stream.set_cache_tap(tap);
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.stream.is_committed()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.stream.write(&mut self.out, data).await
    }

    pub async fn print(&mut self, chars: &str) -> Result<(), HttpError> {
        self.stream.print(&mut self.out, chars).await
    }

    pub async fn flush(&mut self) -> Result<(), HttpError> {
        self.stream.flush(&mut self.out).await
    }

    pub async fn commit(&mut self) -> Result<(), HttpError> {
        self.stream.commit(&mut self.out).await
    }

    /// Ends the response early. The connection closes it anyway once the handler returns.
    pub async fn close(&mut self) -> Result<(), HttpError> {
        self.stream.close(&mut self.out).await
    }

    pub async fn content_length(&mut self) -> Result<u64, HttpError> {
        self.stream.content_length(&mut self.out).await
    }

    pub async fn send_cached(&mut self, cached: &CachedResponse) -> Result<(), HttpError> {
        self.stream.send_cached(&mut self.out, cached).await
    }

    pub(crate) async fn send_continue(&mut self) -> Result<(), HttpError> {
        self.stream.send_continue(&mut self.out).await
    }

    pub(crate) fn start_duplex(&mut self, protocol: &str) -> Result<(), ResponseError> {
        self.stream.start_duplex(protocol)
    }
}

/// One request and its response, borrowed from the connection for the time a handler runs.
pub struct Exchange<'c> {
    request: Request<'c>,
    body: &'c mut BodyState,
    reader: &'c mut (dyn AsyncRead + Unpin + Send + 'c),
    read_buf: &'c mut BytesMut,
    response: Response<'c>,
    lifecycle: &'c mut RequestLifecycle,
}

impl<'c> Exchange<'c> {
    pub(crate) fn new(
        request: Request<'c>,
        body: &'c mut BodyState,
        reader: &'c mut (dyn AsyncRead + Unpin + Send + 'c),
        read_buf: &'c mut BytesMut,
        response: Response<'c>,
        lifecycle: &'c mut RequestLifecycle,
    ) -> Self {
        Self { request, body, reader, read_buf, response, lifecycle }
    }

    #[inline]
    pub fn request(&self) -> Request<'c> {
        self.request
    }

    #[inline]
    pub fn response(&mut self) -> &mut Response<'c> {
        &mut self.response
    }

    /// Next piece of the request body, `None` at its end.
    ///
    /// The first read answers a pending `Expect: 100-continue` unless the response head is
    /// already out.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        if self.body.continue_pending {
            self.body.continue_pending = false;
            if !self.response.is_committed() {
                self.response.send_continue().await?;
            }
        }

        let chunk = self.body.next_chunk(self.reader, self.read_buf).await?;
        if let Some(bytes) = &chunk {
            trace!(len = bytes.len(), "read body chunk");
        }
        Ok(chunk)
    }

    /// Reads the rest of the body into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Bytes, HttpError> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.read_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Keeps the request open after the handler returns. The connection stops reading requests
    /// until [`HttpConnection::complete`](super::HttpConnection::complete) is called.
    pub fn suspend(&mut self) {
        self.lifecycle.suspend();
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.lifecycle.is_suspended()
    }

    /// Switches the connection to `protocol`.
    ///
    /// The response becomes `101 Switching Protocols`, written without framing headers, and
    /// from then on body reads and writes pass through unframed.
    ///
    /// # Errors
    /// [`ResponseError::UpgradeAfterCommit`] once the head is written.
    pub fn upgrade(&mut self, protocol: &str) -> Result<(), ResponseError> {
        self.response.start_duplex(protocol)?;
        self.lifecycle.set_duplex();
        self.body.switch_to_raw();
        debug!(protocol, "connection upgrade");
        Ok(())
    }

    #[inline]
    pub fn is_upgraded(&self) -> bool {
        self.lifecycle.is_duplex()
    }
}

impl std::fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("request", &self.request)
            .field("body", &self.body)
            .field("response", &self.response)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
