use std::io;
use std::mem;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::BytesMut;
use http::{StatusCode, Version};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::codec::{Charset, ChunkedEncoder, HeaderEncoder};
use crate::config::EngineConfig;
use crate::connection::StreamState;
use crate::pool::{Block, BufferPool};
use crate::protocol::{HttpError, PayloadSize, RequestContext, ResponseError, ResponseHead, SendError};
use crate::response::cache::CacheSlot;
use crate::response::{CacheTap, CachedResponse, OutputEncoding};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Where response bytes go: the connection writer plus the scratch buffer of the request's
/// store, used to assemble heads and chunk tails.
pub struct Output<'c> {
    writer: &'c mut (dyn AsyncWrite + Unpin + Send + 'c),
    scratch: &'c mut BytesMut,
}

impl<'c> Output<'c> {
    pub fn new(writer: &'c mut (dyn AsyncWrite + Unpin + Send + 'c), scratch: &'c mut BytesMut) -> Self {
        Self { writer, scratch }
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").field("scratch", &self.scratch.len()).finish_non_exhaustive()
    }
}

/// The buffered output of one response at a time.
///
/// Bytes are appended to a chain of pooled [`Block`]s; chars are staged in a small buffer and
/// converted through the active [`OutputEncoding`] when it fills up. Nothing reaches the
/// socket before the head is committed, which happens on the first explicit flush, when the
/// buffered bytes outgrow the buffer size, or on close. After the commit every block that
/// fills up is written out right away and reused.
///
/// A stream belongs to a connection and is reset by [`ResponseStream::start`] for every
/// request. Its blocks go back to the pool when the response closes.
#[derive(Debug)]
pub struct ResponseStream {
    pool: Arc<BufferPool>,
    head: ResponseHead,
    ctx: RequestContext,
    state: StreamState,
    encoder: HeaderEncoder,
    chunked: ChunkedEncoder,
    chain: Vec<Block>,
    staging: String,
    encoded: Vec<u8>,
    default_encoding: OutputEncoding,
    encoding: OutputEncoding,
    encoding_explicit: bool,
    chars_used: bool,
    framing: PayloadSize,
    buffer_size: usize,
    written: u64,
    keepalive: bool,
    disconnected: bool,
    cache: CacheSlot,
}

impl ResponseStream {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        let config = pool.config();
        let encoder = HeaderEncoder::new(config.server_header.clone(), config.cookie_http_only);
        let default_encoding = OutputEncoding::for_label(&config.default_encoding).unwrap_or_default();
        let buffer_size = config.response_buffer_size;
        let cache = CacheSlot::new(config.cache_max_length);
        let staging = pool.acquire_chars();

        Self {
            pool,
            head: ResponseHead::default(),
            ctx: RequestContext::default(),
            state: StreamState::default(),
            encoder,
            chunked: ChunkedEncoder::new(),
            chain: Vec::new(),
            staging,
            encoded: Vec::new(),
            default_encoding,
            encoding: default_encoding,
            encoding_explicit: false,
            chars_used: false,
            framing: PayloadSize::Unframed,
            buffer_size,
            written: 0,
            keepalive: false,
            disconnected: false,
            cache,
        }
    }

    #[inline]
    fn config(&self) -> &EngineConfig {
        self.pool.config()
    }

    /// Resets the stream for the response to a new request.
    pub fn start(&mut self, ctx: RequestContext) {
        self.pool.release_blocks(&mut self.chain);
        self.head.clear();
        self.ctx = ctx;
        self.state.reset();
        self.chunked = ChunkedEncoder::new();
        self.staging.clear();
        self.encoding = self.default_encoding;
        self.encoding_explicit = false;
        self.chars_used = false;
        self.framing = PayloadSize::Unframed;
        self.buffer_size = self.config().response_buffer_size;
        self.written = 0;
        self.keepalive = ctx.keepalive;
        self.disconnected = false;
        self.cache.kill();
    }

    #[inline]
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// The head is writable until the commit; later changes are not sent.
    #[inline]
    pub fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    #[inline]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    #[inline]
    pub fn state(&self) -> StreamState {
        self.state
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state.is_committed()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Whether the connection may serve another request after this response.
    #[inline]
    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    /// Framing chosen by the committed head.
    #[inline]
    pub fn framing(&self) -> PayloadSize {
        self.framing
    }

    #[inline]
    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Selects the output encoding of `print`.
    ///
    /// The encoding is locked once chars were printed or the head was committed; later
    /// switches are ignored.
    ///
    /// # Errors
    /// Returns [`ResponseError::UnsupportedEncoding`] for an unknown label, even when the
    /// encoding is already locked.
    pub fn set_encoding(&mut self, label: &str) -> Result<(), ResponseError> {
        let encoding = OutputEncoding::for_label(label)?;
        if self.chars_used || self.state.is_committed() {
            debug!(requested = %encoding, active = %self.encoding, "encoding is locked, switch ignored");
            return Ok(());
        }
        self.encoding = encoding;
        self.encoding_explicit = true;
        Ok(())
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sets how many bytes are buffered before the head is committed, at least one block.
    ///
    /// # Errors
    /// [`ResponseError::BufferSizeAfterCommit`] once the head is written.
    pub fn set_buffer_size(&mut self, size: usize) -> Result<(), ResponseError> {
        if self.state.is_committed() {
            return Err(ResponseError::BufferSizeAfterCommit);
        }
        self.buffer_size = size.max(self.config().block_payload());
        Ok(())
    }

    /// Discards everything written so far.
    ///
    /// # Errors
    /// [`ResponseError::ClearAfterCommit`] once the head is written.
    pub fn clear_buffer(&mut self) -> Result<(), ResponseError> {
        if self.state.is_committed() {
            return Err(ResponseError::ClearAfterCommit);
        }
        self.pool.release_blocks(&mut self.chain);
        self.staging.clear();
        self.written = 0;
        Ok(())
    }

    /// Taps the body of this response for a cache.
    pub fn set_cache_tap(&mut self, tap: Box<dyn CacheTap>) {
        self.cache.set(tap);
    }

    /// Whether a cache tap is still recording this response.
    #[inline]
    pub fn is_caching(&self) -> bool {
        self.cache.is_active()
    }

    /// Prepares a `101 Switching Protocols` response. After it is sent the connection carries
    /// `protocol` unframed in both directions.
    ///
    /// # Errors
    /// [`ResponseError::UpgradeAfterCommit`] once the head is written.
    pub fn start_duplex(&mut self, protocol: &str) -> Result<(), ResponseError> {
        if self.state.is_committed() {
            return Err(ResponseError::UpgradeAfterCommit);
        }
        self.head.set_status(StatusCode::SWITCHING_PROTOCOLS);
        self.head.set_header("Upgrade", protocol);
        self.ctx.duplex = true;
        self.keepalive = false;
        Ok(())
    }

    /// Appends body bytes.
    ///
    /// # Errors
    /// Fails only when writing to the socket fails; see [`SendError`].
    pub async fn write(&mut self, out: &mut Output<'_>, data: &[u8]) -> Result<(), HttpError> {
        self.flush_staging(out).await?;
        self.write_bytes(out, data).await
    }

    /// Appends chars, converted through the output encoding.
    ///
    /// # Errors
    /// Fails only when writing to the socket fails.
    pub async fn print(&mut self, out: &mut Output<'_>, chars: &str) -> Result<(), HttpError> {
        if chars.is_empty() || self.state.is_closed() {
            return Ok(());
        }
        self.chars_used = true;

        let capacity = self.config().char_buffer_size;
        if self.staging.len() + chars.len() > capacity {
            self.flush_staging(out).await?;
            if chars.len() > capacity {
                let mut encoded = mem::take(&mut self.encoded);
                encoded.clear();
                self.encoding.encode_into(chars, &mut encoded);
                let result = self.write_bytes(out, &encoded).await;
                self.encoded = encoded;
                return result;
            }
        }
        self.staging.push_str(chars);
        Ok(())
    }

    /// Body bytes written so far, staged chars included.
    ///
    /// # Errors
    /// Fails when converting the staged chars has to write to a failing socket.
    pub async fn content_length(&mut self, out: &mut Output<'_>) -> Result<u64, HttpError> {
        self.flush_staging(out).await?;
        Ok(self.written)
    }

    /// Writes the head, every buffered byte, and flushes the socket.
    ///
    /// # Errors
    /// Fails when the socket fails.
    pub async fn flush(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if self.state.is_closed() {
            return Ok(());
        }
        self.flush_staging(out).await?;
        self.commit_head(out).await?;
        self.flush_blocks(out).await?;
        if !self.disconnected {
            let result = out.writer.flush().await;
            self.check_io(result)?;
        }
        Ok(())
    }

    /// Writes the head unless it was written already.
    ///
    /// # Errors
    /// Fails when the socket fails, or with a [`LifecycleError`](crate::protocol::LifecycleError)
    /// when the stream is closed without a head.
    pub async fn commit(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        self.commit_head(out).await
    }

    /// Ends the response: writes what is buffered, the chunked tail, and flushes the socket.
    /// The blocks go back to the pool whatever happens. Closing a closed stream does nothing.
    ///
    /// # Errors
    /// Fails when the socket fails and disconnects are not ignored.
    pub async fn close(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if !self.state.begin_close()? {
            return Ok(());
        }

        let result = self.drain(out).await;
        self.state.finish_close()?;
        self.pool.release_blocks(&mut self.chain);

        match result {
            Ok(()) => {
                self.cache.finish(&self.head);
                Ok(())
            }
            Err(e) => {
                self.cache.kill();
                Err(e)
            }
        }
    }

    /// Sends `100 Continue` to a client waiting for it.
    ///
    /// # Errors
    /// Fails when the socket fails.
    pub async fn send_continue(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if self.state.is_committed() || self.state.is_closed() || self.ctx.version < Version::HTTP_11 {
            return Ok(());
        }
        trace!("send 100 continue");
        let mut result = out.writer.write_all(CONTINUE).await;
        if result.is_ok() {
            result = out.writer.flush().await;
        }
        self.check_io(result)
    }

    /// Replays a cached response instead of the handler's own output.
    ///
    /// # Errors
    /// [`ResponseError::ClearAfterCommit`] once the head is written, or a socket failure.
    pub async fn send_cached(&mut self, out: &mut Output<'_>, cached: &CachedResponse) -> Result<(), HttpError> {
        self.clear_buffer()?;
        self.cache.kill();

        self.head.set_status(cached.status);
        for (name, value) in &cached.headers {
            self.head.add_header(name.clone(), value.clone());
        }
        if let Some(content_type) = &cached.content_type {
            self.head.set_content_type(content_type.clone());
        }
        self.head.set_content_length(cached.body.len() as u64);
        self.write_bytes(out, &cached.body).await
    }

    async fn drain(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        self.flush_staging(out).await?;
        self.commit_head(out).await?;
        self.flush_blocks(out).await?;

        if let PayloadSize::Length(declared) = self.framing {
            if self.written < declared && !self.state.is_head_only() {
                debug!(declared, written = self.written, "response shorter than its content-length");
                self.keepalive = false;
            }
        }

        if self.disconnected {
            return Ok(());
        }

        if self.framing.is_chunked() {
            out.scratch.clear();
            self.chunked.write_tail(self.head.footers(), out.scratch);
            let result = out.writer.write_all(&out.scratch[..]).await;
            self.check_io(result)?;
        }

        let result = out.writer.flush().await;
        self.check_io(result)
    }

    async fn commit_head(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if !self.state.commit()? {
            return Ok(());
        }

        let charset = Charset { name: self.encoding.name(), forced: self.encoding_explicit || self.chars_used };
        out.scratch.clear();
        let outcome = self.encoder.encode_head(&mut self.head, &self.ctx, charset, out.scratch, SystemTime::now());
        self.framing = outcome.framing;
        self.keepalive = self.keepalive && outcome.keepalive;
        if outcome.head_only {
            self.state.set_head_only()?;
        }
        self.cache.start(self.head.status());

        if out.scratch.is_empty() || self.disconnected {
            return Ok(());
        }
        let result = out.writer.write_all(&out.scratch[..]).await;
        self.check_io(result)
    }

    async fn flush_staging(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if self.staging.is_empty() {
            return Ok(());
        }

        let mut encoded = mem::take(&mut self.encoded);
        encoded.clear();
        self.encoding.encode_into(&self.staging, &mut encoded);
        self.staging.clear();

        let result = self.write_bytes(out, &encoded).await;
        self.encoded = encoded;
        result
    }

    async fn write_bytes(&mut self, out: &mut Output<'_>, data: &[u8]) -> Result<(), HttpError> {
        if self.state.is_closed() || self.disconnected {
            trace!(len = data.len(), "response closed, write dropped");
            return Ok(());
        }

        let data = self.clip(data);
        if data.is_empty() {
            return Ok(());
        }
        self.written += data.len() as u64;
        if self.state.is_head_only() {
            return Ok(());
        }

        let mut rest = data;
        while !rest.is_empty() {
            if self.chain.last().is_none_or(Block::is_full) {
                if self.state.is_committed() {
                    self.flush_blocks(out).await?;
                } else if self.buffered_len() >= self.buffer_size {
                    self.commit_head(out).await?;
                    self.flush_blocks(out).await?;
                }
                if self.disconnected || self.state.is_head_only() {
                    return Ok(());
                }
                if self.chain.last().is_none_or(Block::is_full) {
                    self.chain.push(self.pool.acquire_block());
                }
            }

            let Some(tail) = self.chain.last_mut() else {
                break;
            };
            let n = tail.push(rest);
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Cuts `data` to what the declared content length still allows.
    fn clip<'d>(&self, data: &'d [u8]) -> &'d [u8] {
        let declared = if self.state.is_committed() {
            match self.framing {
                PayloadSize::Length(length) => Some(length),
                _ => None,
            }
        } else if self.head.footers().is_empty() {
            self.head.content_length()
        } else {
            None
        };

        let Some(declared) = declared else {
            return data;
        };
        let allowed = usize::try_from(declared.saturating_sub(self.written)).unwrap_or(usize::MAX);
        if data.len() <= allowed {
            return data;
        }

        let excess = &data[allowed..];
        if excess.iter().all(u8::is_ascii_whitespace) {
            debug!(declared, excess = excess.len(), "whitespace past content-length dropped");
        } else {
            warn!(declared, excess = excess.len(), "bytes past content-length dropped");
        }
        &data[..allowed]
    }

    fn buffered_len(&self) -> usize {
        self.chain.iter().map(Block::len).sum()
    }

    /// Writes every non-empty block, then keeps a single cleared block for reuse.
    async fn flush_blocks(&mut self, out: &mut Output<'_>) -> Result<(), HttpError> {
        if !self.state.is_committed() {
            return Ok(());
        }

        let mut result = Ok(());
        if !self.state.is_head_only() && !self.disconnected {
            let chunked = self.framing.is_chunked();
            for block in &mut self.chain {
                if block.is_empty() {
                    continue;
                }
                self.cache.write(block.payload());
                let bytes = if chunked { self.chunked.frame(block) } else { block.payload() };
                trace!(len = bytes.len(), chunked, "write block");
                result = out.writer.write_all(bytes).await;
                if result.is_err() {
                    break;
                }
            }
        }

        for block in &mut self.chain {
            block.clear();
        }
        if self.chain.len() > 1 {
            for block in self.chain.drain(1..) {
                self.pool.release_block(block);
            }
        }
        self.check_io(result)
    }

    /// Classifies a socket failure. A client disconnect marks the stream disconnected and is
    /// swallowed when configured so; every failure ends keep-alive.
    fn check_io(&mut self, result: io::Result<()>) -> Result<(), HttpError> {
        let Err(e) = result else {
            return Ok(());
        };

        let e = SendError::io(e);
        self.keepalive = false;
        self.cache.kill();
        if e.is_client_disconnect() {
            self.disconnected = true;
            debug!(cause = %e, "client disconnected");
            if self.config().ignore_client_disconnect {
                return Ok(());
            }
        }
        Err(e.into())
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.pool.release_blocks(&mut self.chain);
        self.pool.release_chars(mem::take(&mut self.staging));
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::response::cache::tests::RecordingTap;

    fn pool_with(config: EngineConfig) -> Arc<BufferPool> {
        Arc::new(BufferPool::new(&config))
    }

    fn ctx() -> RequestContext {
        RequestContext { version: Version::HTTP_11, head_method: false, keepalive: true, keepalive_capacity: true, duplex: false }
    }

    /// Drops the `Date` line so heads can be compared verbatim.
    fn strip_date(wire: &[u8]) -> String {
        let text = String::from_utf8_lossy(wire).into_owned();
        match text.find("\r\nDate: ") {
            Some(at) => format!("{}{}", &text[..at], &text[at + 37..]),
            None => text,
        }
    }

    #[tokio::test]
    async fn test_small_body_is_chunked_on_close() {
        let pool = Arc::new(BufferPool::default());
        let mut stream = ResponseStream::new(Arc::clone(&pool));
        stream.start(ctx());

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);

        stream.write(&mut out, b"hello").await.unwrap();
        assert!(!stream.is_committed());
        stream.close(&mut out).await.unwrap();

        assert_eq!(strip_date(&wire), "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0005\r\nhello\r\n0\r\n\r\n");
        assert!(stream.keepalive());
        assert_eq!(pool.stats().blocks_leased, 0);
    }

    #[tokio::test]
    async fn test_declared_length_truncates() {
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());
        stream.head_mut().set_content_length(10);

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);
        stream.write(&mut out, b"0123456789abcde").await.unwrap();
        assert_eq!(stream.content_length(&mut out).await.unwrap(), 10);
        stream.close(&mut out).await.unwrap();

        assert_eq!(strip_date(&wire), "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789");
    }

    #[tokio::test]
    async fn test_overflow_commits_and_streams() {
        let config = EngineConfig { block_size: 16 + 8, response_buffer_size: 32, ..EngineConfig::default() };
        let pool = pool_with(config);
        let mut stream = ResponseStream::new(Arc::clone(&pool));
        stream.start(ctx());
        stream.head_mut().set_content_length(100);

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);

        stream.write(&mut out, &[b'a'; 32]).await.unwrap();
        assert!(!stream.is_committed());
        stream.write(&mut out, b"b").await.unwrap();
        assert!(stream.is_committed());
        stream.write(&mut out, &[b'c'; 67]).await.unwrap();
        assert!(pool.stats().blocks_leased <= 2);
        stream.close(&mut out).await.unwrap();

        let text = strip_date(&wire);
        let body = &text[text.find("\r\n\r\n").unwrap() + 4..];
        assert_eq!(body, format!("{}b{}", "a".repeat(32), "c".repeat(67)));
    }

    #[tokio::test]
    async fn test_print_encodes_and_reports_charset() {
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());
        stream.set_encoding("iso-8859-1").unwrap();
        stream.head_mut().set_content_type("text/plain");

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);

        stream.print(&mut out, "café").await.unwrap();
        stream.set_encoding("utf-8").unwrap();
        assert_eq!(stream.encoding(), OutputEncoding::Latin1);
        assert!(stream.set_encoding("ebcdic").is_err());
        stream.close(&mut out).await.unwrap();

        let mut expected = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=iso-8859-1\r\nTransfer-Encoding: chunked\r\n\r\n0004\r\ncaf".to_vec();
        expected.extend_from_slice(b"\xE9\r\n0\r\n\r\n");
        let at = wire.windows(8).position(|w| w == b"\r\nDate: ").unwrap();
        let mut stripped = wire[..at].to_vec();
        stripped.extend_from_slice(&wire[at + 37..]);
        assert_eq!(stripped, expected);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);
        stream.commit(&mut out).await.unwrap();
        stream.commit(&mut out).await.unwrap();
        stream.flush(&mut out).await.unwrap();

        assert_eq!(stream.set_buffer_size(1), Err(ResponseError::BufferSizeAfterCommit));
        assert_eq!(stream.clear_buffer(), Err(ResponseError::ClearAfterCommit));
        stream.close(&mut out).await.unwrap();
        stream.close(&mut out).await.unwrap();
        stream.write(&mut out, b"late").await.unwrap();

        let text = String::from_utf8(wire).unwrap();
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 1);
        assert!(text.ends_with("\r\n\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_head_request_drops_body() {
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(RequestContext { head_method: true, ..ctx() });
        stream.head_mut().set_content_length(5);

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);
        stream.write(&mut out, b"hello").await.unwrap();
        stream.close(&mut out).await.unwrap();

        assert_eq!(strip_date(&wire), "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
        assert!(stream.keepalive());
    }

    #[tokio::test]
    async fn test_cache_tap_sees_body() {
        let tap = RecordingTap::default();
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());
        stream.set_cache_tap(Box::new(tap.clone()));

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);
        stream.write(&mut out, b"cache me").await.unwrap();
        assert!(stream.is_caching());
        stream.close(&mut out).await.unwrap();
        assert!(!stream.is_caching());

        let state = tap.state.lock();
        assert_eq!(state.body, b"cache me");
        assert!(state.finished);
    }

    #[tokio::test]
    async fn test_send_cached() {
        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());

        let mut wire: Vec<u8> = Vec::new();
        let mut scratch = BytesMut::new();
        let mut out = Output::new(&mut wire, &mut scratch);
        stream.write(&mut out, b"discarded").await.unwrap();

        let mut cached = CachedResponse::new(StatusCode::OK, "from cache");
        cached.headers.push(("ETag".to_owned(), "\"1\"".to_owned()));
        stream.send_cached(&mut out, &cached).await.unwrap();
        stream.close(&mut out).await.unwrap();

        assert_eq!(strip_date(&wire), "HTTP/1.1 200 OK\r\nETag: \"1\"\r\nContent-Length: 10\r\n\r\nfrom cache");
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_client_disconnect() {
        let mut writer = BrokenPipe;
        let mut scratch = BytesMut::new();

        let mut stream = ResponseStream::new(Arc::new(BufferPool::default()));
        stream.start(ctx());
        let mut out = Output::new(&mut writer, &mut scratch);
        stream.write(&mut out, b"lost").await.unwrap();
        stream.close(&mut out).await.unwrap();
        assert!(stream.is_disconnected());
        assert!(!stream.keepalive());

        let config = EngineConfig { ignore_client_disconnect: false, ..EngineConfig::default() };
        let mut stream = ResponseStream::new(pool_with(config));
        stream.start(ctx());
        let err = stream.flush(&mut out).await.unwrap_err();
        assert!(err.is_client_disconnect());
        stream.write(&mut out, b"dropped").await.unwrap();
        stream.close(&mut out).await.unwrap();
        assert!(stream.is_closed());
    }
}
