//! Response head serialization.
//!
//! Every line is written as `\r\n<line>`: the status line carries no CRLF of its own and each
//! following line starts with the CRLF that ends the previous one. The [`DateCache`] line
//! closes the head, one CRLF short when the body is chunked.

use std::time::SystemTime;

use bytes::{BufMut, BytesMut};
use http::{StatusCode, Version};
use tracing::debug;

use crate::codec::DateCache;
use crate::protocol::{PayloadSize, RequestContext, ResponseHead};
use crate::utils::{eq_ignore_case, put_decimal};

/// Initial buffer size reserved for a head.
const INIT_HEADER_SIZE: usize = 1024;

const EXPIRES_PAST: &[u8] = b"\r\nExpires: Thu, 01 Dec 1994 16:00:00 GMT";

/// The output encoding, as reported in `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset<'a> {
    pub name: &'a str,
    /// Report the charset even for non-text types: it was set explicitly or chars were
    /// written.
    pub forced: bool,
}

/// What the written head decided about the body and the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadOutcome {
    pub framing: PayloadSize,
    pub keepalive: bool,
    /// No body bytes may follow the head.
    pub head_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HeaderEncoder {
    date: DateCache,
    server: Option<String>,
    cookie_http_only: bool,
}

impl HeaderEncoder {
    pub fn new(server: Option<String>, cookie_http_only: bool) -> Self {
        Self { date: DateCache::new(), server, cookie_http_only }
    }

    /// Writes the head of `head` into `dst`.
    ///
    /// `head` may be adjusted on the way: cache validators of error responses are dropped and
    /// a 204 or 304 loses its content type.
    pub fn encode_head(
        &mut self,
        head: &mut ResponseHead,
        ctx: &RequestContext,
        charset: Charset<'_>,
        dst: &mut BytesMut,
        now: SystemTime,
    ) -> HeadOutcome {
        if ctx.version < Version::HTTP_10 {
            return HeadOutcome { framing: PayloadSize::Unframed, keepalive: false, head_only: ctx.head_method };
        }

        dst.reserve(INIT_HEADER_SIZE);
        let status = head.status();
        write_status_line(head, ctx.version, dst);

        if ctx.duplex {
            if let Some(protocol) = head.header("Upgrade") {
                put_line(dst, b"Upgrade", protocol.as_bytes());
            }
            dst.put_slice(b"\r\nConnection: Upgrade");
        }

        if let Some(server) = &self.server {
            if !head.contains_header("Server") {
                put_line(dst, b"Server", server.as_bytes());
            }
        }

        apply_cache_policy(head, ctx.version, dst);

        for (name, value) in head.headers() {
            if ctx.duplex && eq_ignore_case(name.as_bytes(), b"upgrade") {
                continue;
            }
            put_line(dst, name.as_bytes(), value.as_bytes());
        }

        for cookie in head.cookies() {
            dst.put_slice(b"\r\nSet-Cookie: ");
            cookie.write_classic(dst, now, self.cookie_http_only);
            if cookie.version() > 0 {
                dst.put_slice(b"\r\nSet-Cookie2: ");
                cookie.write_versioned(dst, self.cookie_http_only);
            }
        }

        if let Some(content_type) = head.content_type() {
            dst.put_slice(b"\r\nContent-Type: ");
            dst.put_slice(content_type.as_bytes());
            if needs_charset(content_type, charset.forced) {
                dst.put_slice(b"; charset=");
                dst.put_slice(charset.name.as_bytes());
            }
        }

        let mut keepalive = ctx.keepalive && !head.is_close_requested();
        let mut head_only = ctx.head_method;
        let framing = if ctx.duplex {
            keepalive = false;
            PayloadSize::Unframed
        } else {
            match head.content_length() {
                Some(length) if head.footers().is_empty() => {
                    dst.put_slice(b"\r\nContent-Length: ");
                    put_decimal(dst, length);
                    PayloadSize::Length(length)
                }
                _ if status == StatusCode::NOT_MODIFIED || status == StatusCode::NO_CONTENT => {
                    dst.put_slice(b"\r\nContent-Length: 0");
                    head_only = true;
                    PayloadSize::Length(0)
                }
                _ if ctx.version >= Version::HTTP_11 && !ctx.head_method => {
                    dst.put_slice(b"\r\nTransfer-Encoding: chunked");
                    PayloadSize::Chunked
                }
                _ => {
                    keepalive = false;
                    PayloadSize::Unframed
                }
            }
        };

        if ctx.version < Version::HTTP_11 || !ctx.keepalive_capacity {
            keepalive = false;
        }
        if ctx.version >= Version::HTTP_11 && !keepalive && !ctx.duplex {
            dst.put_slice(b"\r\nConnection: close");
        }

        self.date.update(now);
        dst.put_slice(self.date.line(framing.is_chunked()));

        debug!(status = status.as_u16(), ?framing, keepalive, head_only, "response head written");
        HeadOutcome { framing, keepalive, head_only }
    }
}

fn write_status_line(head: &ResponseHead, version: Version, dst: &mut BytesMut) {
    let http11 = version >= Version::HTTP_11;
    if head.status() == StatusCode::OK && !head.has_explicit_reason() {
        dst.put_slice(if http11 { b"HTTP/1.1 200 OK" } else { b"HTTP/1.0 200 OK" });
        return;
    }

    dst.put_slice(if http11 { b"HTTP/1.1 " } else { b"HTTP/1.0 " });
    dst.put_slice(head.status().as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(head.reason().as_bytes());
}

fn apply_cache_policy(head: &mut ResponseHead, version: Version, dst: &mut BytesMut) {
    let status = head.status();
    if status.is_client_error() || status.is_server_error() {
        remove_validators(head);
        return;
    }
    if status == StatusCode::NOT_MODIFIED || status == StatusCode::NO_CONTENT {
        head.clear_content_type();
        return;
    }

    let policy = *head.cache_policy();
    if policy.is_app_controlled() {
        return;
    }

    if policy.no_cache {
        remove_validators(head);
        dst.put_slice(EXPIRES_PAST);
        dst.put_slice(b"\r\nCache-Control: no-cache");
    } else if policy.no_cache_unless_vary && !head.contains_header("Vary") {
        dst.put_slice(b"\r\nCache-Control: private");
    } else if policy.private {
        if version >= Version::HTTP_11 {
            dst.put_slice(b"\r\nCache-Control: private");
        } else {
            dst.put_slice(EXPIRES_PAST);
            dst.put_slice(b"\r\nCache-Control: no-cache");
        }
    }
}

fn remove_validators(head: &mut ResponseHead) {
    head.remove_header("ETag");
    head.remove_header("Last-Modified");
}

/// Whether `; charset=` must be appended to `content_type`.
fn needs_charset(content_type: &str, forced: bool) -> bool {
    match content_type.parse::<mime::Mime>() {
        Ok(mime) => mime.get_param(mime::CHARSET).is_none() && (forced || mime.type_() == mime::TEXT),
        Err(_) => {
            let lower = content_type.to_ascii_lowercase();
            !lower.contains("charset=") && (forced || lower.starts_with("text/"))
        }
    }
}

#[inline]
fn put_line(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.put_slice(b"\r\n");
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
}
