use std::sync::Arc;

use bytes::BytesMut;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

use crate::codec::{HeaderDecoder, PayloadDecoder};
use crate::connection::{BodyState, Exchange, KeepAlive, RequestLifecycle, Response};
use crate::handler::Handler;
use crate::pool::{BufferPool, BufferStore, RequestBuffers};
use crate::protocol::{HttpError, LifecycleError, ParseError, Request, RequestContext, RequestHead};
use crate::response::{Output, ResponseStream};

/// What became of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The peer closed the connection before sending another request.
    NoRequest,
    /// The request is done and the connection may serve the next one.
    KeepAlive,
    /// The request is done and the connection must be closed.
    Close,
    /// The handler suspended the request; see [`HttpConnection::complete`].
    Suspended,
    /// The connection switched protocols; see [`HttpConnection::into_parts`].
    Upgraded,
}

/// Why [`HttpConnection::process`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Closed,
    Suspended,
    Upgraded,
}

/// An HTTP/1.x connection over a reader and a writer.
///
/// `HttpConnection` parses request heads, hands each request to a [`Handler`] as an
/// [`Exchange`], and decides after every response whether the connection may be reused:
/// - request buffers are leased from the [`BufferPool`] per request and handed back when it
///   finishes, so an idle keep-alive connection holds no parse buffers
/// - the response stream lives as long as the connection and is reset per request
/// - an unread request body is skipped before the next head is parsed
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    read_buf: BytesMut,
    pool: Arc<BufferPool>,
    store: Option<Box<BufferStore>>,
    head: RequestHead,
    body: BodyState,
    stream: ResponseStream,
    lifecycle: RequestLifecycle,
    keepalive: KeepAlive,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// A connection with a private pool and the default configuration.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_pool(reader, writer, Arc::new(BufferPool::default()))
    }

    /// A connection sharing `pool`, and its configuration, with other connections.
    pub fn with_pool(reader: R, writer: W, pool: Arc<BufferPool>) -> Self {
        let config = pool.config();
        let read_buf = BytesMut::with_capacity(config.read_buffer_size);
        let keepalive = KeepAlive::new(config.keepalive_max_requests);
        let stream = ResponseStream::new(Arc::clone(&pool));

        Self {
            reader,
            writer,
            read_buf,
            pool,
            store: None,
            head: RequestHead::default(),
            body: BodyState::default(),
            stream,
            lifecycle: RequestLifecycle::default(),
            keepalive,
        }
    }

    /// Serves requests until the connection can't be reused, a request is suspended or the
    /// connection switches protocols.
    pub async fn process<H: Handler>(&mut self, handler: &H) -> Result<ConnectionOutcome, HttpError> {
        loop {
            match self.handle_request(handler).await? {
                RequestOutcome::KeepAlive => continue,
                RequestOutcome::NoRequest | RequestOutcome::Close => {
                    info!(served = self.keepalive.served(), "connection finished");
                    return Ok(ConnectionOutcome::Closed);
                }
                RequestOutcome::Suspended => return Ok(ConnectionOutcome::Suspended),
                RequestOutcome::Upgraded => return Ok(ConnectionOutcome::Upgraded),
            }
        }
    }

    /// Reads one request, runs `handler` on it and finishes it.
    ///
    /// # Errors
    /// [`LifecycleError::PendingAsync`] while a suspended request is open, otherwise socket
    /// failures that end the connection. Malformed requests, malformed bodies included, are
    /// answered with `400` and handler failures with `500`, both reported as
    /// [`RequestOutcome::Close`].
    pub async fn handle_request<H: Handler>(&mut self, handler: &H) -> Result<RequestOutcome, HttpError> {
        if self.lifecycle.is_suspended() {
            return Err(LifecycleError::PendingAsync.into());
        }
        if !self.keepalive.is_alive() {
            return Ok(RequestOutcome::Close);
        }

        let mut store = self.pool.acquire_store();
        let max_head_bytes = self.pool.config().max_head_bytes;
        let parsed = read_head(&mut self.reader, &mut self.read_buf, &mut store.request, max_head_bytes).await;
        self.store = Some(store);

        let head = match parsed {
            Ok(Some(head)) => head,
            Ok(None) => {
                self.release_store();
                return Ok(RequestOutcome::NoRequest);
            }
            Err(e) if e.is_malformed() => {
                error!(cause = %e, "malformed request head");
                self.reject(StatusCode::BAD_REQUEST, RequestContext::default()).await?;
                return Ok(RequestOutcome::Close);
            }
            Err(e) => {
                self.release_store();
                if e.is_client_disconnect() {
                    debug!(cause = %e, "connection closed inside a request head");
                    return Ok(RequestOutcome::NoRequest);
                }
                return Err(e.into());
            }
        };

        self.head = head;
        self.lifecycle.reset();
        let Some(store) = self.store.as_deref() else {
            return Err(LifecycleError::NoActiveRequest.into());
        };
        let request = Request::new(&self.head, &store.request);

        let ctx = RequestContext {
            version: head.version(),
            head_method: request.is_head(),
            keepalive: head.is_keepalive(),
            keepalive_capacity: self.keepalive.has_capacity(),
            duplex: false,
        };
        let selected = PayloadDecoder::select(
            request.method_bytes(),
            head.content_length(),
            head.has_transfer_encoding(),
            head.version(),
            false,
        );

        match selected {
            Ok(decoder) => self.body.start(decoder, head.expects_continue()),
            Err(e) => {
                error!(cause = %e, "can't frame request body");
                self.body.start(PayloadDecoder::empty(), false);
                self.reject(StatusCode::BAD_REQUEST, RequestContext { keepalive_capacity: false, ..ctx }).await?;
                return Ok(RequestOutcome::Close);
            }
        }

        self.stream.start(ctx);
        let result = {
            let mut exchange = self.exchange()?;
            handler.call(&mut exchange).await.map_err(HttpError::handler)
        };

        if let Err(e) = result {
            let status = if self.body.is_malformed() {
                warn!(cause = %e, "malformed request body");
                StatusCode::BAD_REQUEST
            } else {
                error!(cause = %e, "handler failed");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            self.keepalive.kill();
            if !self.stream.is_committed() {
                self.stream.clear_buffer()?;
                let head = self.stream.head_mut();
                head.clear();
                head.set_status(status);
                head.set_header("Connection", "close");
                head.set_content_length(0);
            }
        }

        if self.lifecycle.is_suspended() {
            debug!("request suspended");
            return Ok(RequestOutcome::Suspended);
        }
        self.finish().await
    }

    /// A new [`Exchange`] over the suspended request.
    ///
    /// # Errors
    /// [`LifecycleError::NoActiveRequest`] when no request is suspended.
    pub fn resume(&mut self) -> Result<Exchange<'_>, LifecycleError> {
        if !self.lifecycle.is_suspended() {
            return Err(LifecycleError::NoActiveRequest);
        }
        self.exchange()
    }

    /// Finishes the suspended request.
    ///
    /// # Errors
    /// [`LifecycleError::NoActiveRequest`] when no request is suspended, or the socket failures
    /// of closing the response.
    pub async fn complete(&mut self) -> Result<RequestOutcome, HttpError> {
        if !self.lifecycle.is_suspended() {
            return Err(LifecycleError::NoActiveRequest.into());
        }
        self.lifecycle.reset();
        self.finish().await
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.lifecycle.is_suspended()
    }

    /// Requests served so far.
    #[inline]
    pub fn served(&self) -> usize {
        self.keepalive.served()
    }

    /// The reader, the writer and the bytes read past the last request.
    pub fn into_parts(mut self) -> (R, W, BytesMut) {
        self.release_store();
        let Self { reader, writer, read_buf, .. } = self;
        (reader, writer, read_buf)
    }

    fn exchange(&mut self) -> Result<Exchange<'_>, LifecycleError> {
        let BufferStore { request, scratch } = self.store.as_deref_mut().ok_or(LifecycleError::NoActiveRequest)?;
        let request = Request::new(&self.head, request);
        let response = Response::new(&mut self.stream, Output::new(&mut self.writer, scratch));
        Ok(Exchange::new(request, &mut self.body, &mut self.reader, &mut self.read_buf, response, &mut self.lifecycle))
    }

    /// Closes the response, drains the body and hands the request buffers back.
    async fn finish(&mut self) -> Result<RequestOutcome, HttpError> {
        let upgraded = self.lifecycle.is_duplex();
        if self.body.is_malformed() {
            self.keepalive.kill();
            if !self.stream.is_committed() {
                self.stream.head_mut().set_header("Connection", "close");
            }
        }
        let closed = self.close_stream().await;

        if upgraded {
            self.keepalive.kill();
        } else if self.body.is_continue_pending() {
            debug!("body never requested, connection can't be reused");
            self.keepalive.kill();
        } else if !self.body.is_eof() {
            if let Err(e) = self.body.skip(&mut self.reader, &mut self.read_buf).await {
                warn!(cause = %e, "can't skip request body");
                self.keepalive.kill();
            }
        }

        self.body.reset();
        self.release_store();
        self.keepalive.record_request();
        if !self.stream.keepalive() {
            self.keepalive.kill();
        }
        closed?;

        if upgraded {
            Ok(RequestOutcome::Upgraded)
        } else if self.keepalive.is_alive() {
            Ok(RequestOutcome::KeepAlive)
        } else {
            Ok(RequestOutcome::Close)
        }
    }

    async fn close_stream(&mut self) -> Result<(), HttpError> {
        let Some(store) = self.store.as_deref_mut() else {
            return Err(LifecycleError::NoActiveRequest.into());
        };
        let mut out = Output::new(&mut self.writer, &mut store.scratch);
        let result = self.stream.close(&mut out).await;
        if result.is_err() {
            self.keepalive.kill();
        }
        result
    }

    /// Answers the current request with an empty `status` response and closes the
    /// connection.
    async fn reject(&mut self, status: StatusCode, ctx: RequestContext) -> Result<(), HttpError> {
        self.stream.start(ctx);
        let head = self.stream.head_mut();
        head.set_status(status);
        head.set_content_length(0);

        self.keepalive.kill();
        let closed = self.close_stream().await;
        self.body.reset();
        self.release_store();
        self.keepalive.record_request();
        closed
    }

    fn release_store(&mut self) {
        if let Some(store) = self.store.take() {
            self.pool.release_store(store);
        }
    }
}

impl<R, W> std::fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("buffered", &self.read_buf.len())
            .field("head", &self.head)
            .field("body", &self.body)
            .field("lifecycle", &self.lifecycle)
            .field("keepalive", &self.keepalive)
            .finish_non_exhaustive()
    }
}

/// Reads until `buffers` hold a complete request head. `None` when the stream ends before a
/// request starts.
async fn read_head<R: AsyncRead + Unpin>(
    reader: &mut R,
    read_buf: &mut BytesMut,
    buffers: &mut RequestBuffers,
    max_head_bytes: usize,
) -> Result<Option<RequestHead>, ParseError> {
    let mut decoder = HeaderDecoder::new(buffers, max_head_bytes);
    loop {
        if let Some(head) = decoder.decode(read_buf)? {
            return Ok(Some(head));
        }

        read_buf.reserve(1024);
        if reader.read_buf(read_buf).await? == 0 {
            return if read_buf.is_empty() { Ok(None) } else { Err(ParseError::UnexpectedEof) };
        }
    }
}
