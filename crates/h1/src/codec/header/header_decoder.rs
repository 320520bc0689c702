//! Request line and header tokenizer.
//!
//! The decoder copies the request head into the fixed buffers of a [`RequestBuffers`]: the
//! method (uppercased) and URI into their own buffers, header keys and values into the header
//! buffer, recorded as [`Span`]s. Nothing is allocated per request.
//!
//! Parsing restarts from the first byte of the head on every call, so an incomplete head
//! costs a re-scan once more bytes arrive but needs no resumable state. A complete head is
//! consumed from the read buffer exactly; pipelined bytes after it stay put.
//!
//! Tolerated input:
//!
//! - leading blank lines before the request line
//! - a missing or garbled protocol token, read as HTTP/0.9 (which has no headers)
//! - bare LF line endings
//! - obsolete line folding, joined with a single space
//! - header lines without a colon, which are skipped

use bytes::{Buf, BytesMut};
use http::Version;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::ensure;
use crate::pool::RequestBuffers;
use crate::protocol::{ParseError, RequestHead, Span};
use crate::utils::{eq_ignore_case, trim_end_ws};

/// Protocol token bytes kept for version scanning.
const PROTOCOL_CAPACITY: usize = 16;

/// Decodes one request head into the borrowed buffers.
#[derive(Debug)]
pub struct HeaderDecoder<'s> {
    buffers: &'s mut RequestBuffers,
    max_head_bytes: usize,
}

impl<'s> HeaderDecoder<'s> {
    /// `max_head_bytes` bounds how many bytes an incomplete head may occupy in the read buffer.
    pub fn new(buffers: &'s mut RequestBuffers, max_head_bytes: usize) -> Self {
        Self { buffers, max_head_bytes }
    }
}

impl Decoder for HeaderDecoder<'_> {
    type Item = RequestHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(start) = src.iter().position(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n')) else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        self.buffers.clear();
        match parse_head(self.buffers, &src[..])? {
            Some((head, consumed)) => {
                trace!(head_size = consumed, "parsed request head");
                src.advance(consumed);
                debug!(
                    method = %String::from_utf8_lossy(self.buffers.method()),
                    uri = %String::from_utf8_lossy(self.buffers.uri()),
                    version = ?head.version,
                    "request line"
                );
                Ok(Some(head))
            }
            None => {
                ensure!(src.len() <= self.max_head_bytes, ParseError::too_large_header(src.len(), self.max_head_bytes));
                Ok(None)
            }
        }
    }
}

struct Cursor<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl Cursor<'_> {
    #[inline]
    fn next(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }
}

/// Yields the next byte, or reports an incomplete head.
macro_rules! next {
    ($cursor:ident) => {
        match $cursor.next() {
            Some(b) => b,
            None => return Ok(None),
        }
    };
}

macro_rules! peek {
    ($cursor:ident) => {
        match $cursor.peek() {
            Some(b) => b,
            None => return Ok(None),
        }
    };
}

#[inline]
fn is_lws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn parse_head(buffers: &mut RequestBuffers, buf: &[u8]) -> Result<Option<(RequestHead, usize)>, ParseError> {
    let mut cur = Cursor { buf, pos: 0 };
    let mut head = RequestHead::default();

    // method
    let mut b = next!(cur);
    while b > b' ' {
        buffers.push_method(b.to_ascii_uppercase());
        b = next!(cur);
    }
    while is_lws(b) {
        b = next!(cur);
    }

    // request target
    let target_start = cur.pos - 1;
    while b > b' ' {
        b = next!(cur);
    }
    let target = &buf[target_start..cur.pos - 1];
    head.uri_host = store_target(buffers, target)?;

    // protocol
    while is_lws(b) {
        b = next!(cur);
    }
    let mut protocol = [0u8; PROTOCOL_CAPACITY];
    let mut protocol_len = 0;
    while b > b' ' {
        if protocol_len < PROTOCOL_CAPACITY {
            protocol[protocol_len] = b.to_ascii_uppercase();
        }
        protocol_len += 1;
        b = next!(cur);
    }
    head.version = parse_version(&protocol[..protocol_len.min(PROTOCOL_CAPACITY)], protocol_len);

    while b != b'\n' {
        b = next!(cur);
    }

    if head.version < Version::HTTP_11 {
        head.keepalive = false;
    }

    if head.version == Version::HTTP_09 {
        return Ok(Some((head, cur.pos)));
    }

    loop {
        let mut b = next!(cur);
        if b == b'\r' {
            b = next!(cur);
        }
        if b == b'\n' {
            break;
        }

        // key
        let key_start = buffers.chars_len();
        while b != b':' && b != b'\n' {
            buffers.push_char(b)?;
            b = next!(cur);
        }
        if b == b'\n' {
            debug!(line = %String::from_utf8_lossy(&buffers.chars()[key_start..]), "skip header line without colon");
            buffers.truncate_chars(key_start);
            continue;
        }
        let key_end = key_start + trim_end_lws(&buffers.chars()[key_start..]).len();
        buffers.truncate_chars(key_end);
        let key = Span::from_range(key_start..key_end);

        // value
        b = next!(cur);
        while is_lws(b) {
            b = next!(cur);
        }
        let value_start = buffers.chars_len();
        loop {
            if b == b'\n' {
                if !is_lws(peek!(cur)) {
                    break;
                }
                // folded line: the CR before the fold is dropped, the fold becomes one space
                if buffers.chars()[value_start..].last() == Some(&b'\r') {
                    buffers.truncate_chars(buffers.chars_len() - 1);
                }
                buffers.push_char(b' ')?;
                while is_lws(peek!(cur)) {
                    cur.pos += 1;
                }
            } else {
                buffers.push_char(b)?;
            }
            b = next!(cur);
        }
        let value_end = value_start + trim_end_ws(&buffers.chars()[value_start..]).len();
        buffers.truncate_chars(value_end);
        let value = Span::from_range(value_start..value_end);

        if !record_special(buffers, &mut head, key, value) {
            buffers.truncate_chars(key_start);
            continue;
        }
        buffers.push_header(key, value)?;
    }

    if head.version == Version::HTTP_11 && head.host.is_none() && head.uri_host.is_none() {
        return Err(ParseError::MissingHost);
    }

    Ok(Some((head, cur.pos)))
}

fn trim_end_lws(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| !is_lws(*b)).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Copies the request target into the URI buffer. For an absolute URI the host goes into the
/// header buffer and its span is returned.
fn store_target(buffers: &mut RequestBuffers, target: &[u8]) -> Result<Option<Span>, ParseError> {
    if target.first() == Some(&b'/') {
        buffers.push_uri(target);
        return Ok(None);
    }

    let Some(authority_start) = absolute_authority(target) else {
        buffers.push_uri(target);
        return Ok(None);
    };

    let rest = &target[authority_start..];
    let host_len = rest.iter().position(|b| *b == b'/' || *b == b'?').unwrap_or(rest.len());
    let host = buffers.push_chars(&rest[..host_len])?;

    let path = &rest[host_len..];
    if path.first() != Some(&b'/') {
        buffers.push_uri(b"/");
    }
    buffers.push_uri(path);
    Ok(Some(host))
}

/// Offset just past `scheme://`, if `target` is an absolute URI.
fn absolute_authority(target: &[u8]) -> Option<usize> {
    let scheme_len = target.iter().position(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')))?;
    (scheme_len > 0 && target[scheme_len..].starts_with(b"://")).then_some(scheme_len + 3)
}

/// Maps an uppercased protocol token to a version. `len` is the full token length, which may
/// exceed what was kept.
fn parse_version(token: &[u8], len: usize) -> Version {
    if len == 8 {
        match token {
            b"HTTP/1.1" => return Version::HTTP_11,
            b"HTTP/1.0" => return Version::HTTP_10,
            _ => {}
        }
    }

    if len < 8 || !token.starts_with(b"HTTP/") {
        return Version::HTTP_09;
    }

    let digits = &token[5..];
    let Some(dot) = digits.iter().position(|b| *b == b'.') else {
        return Version::HTTP_09;
    };
    let (Some(major), Some(minor)) = (parse_digits(&digits[..dot]), parse_digits(&digits[dot + 1..])) else {
        return Version::HTTP_09;
    };

    match (major, minor) {
        (1, 0) => Version::HTTP_10,
        (1, _) | (2.., _) => Version::HTTP_11,
        _ => Version::HTTP_09,
    }
}

fn parse_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u32, |n, b| if b.is_ascii_digit() { n.checked_mul(10)?.checked_add(u32::from(b - b'0')) } else { None })
}

/// Applies the headers the engine interprets. Returns `false` for a header that must not be
/// stored.
fn record_special(buffers: &mut RequestBuffers, head: &mut RequestHead, key: Span, value: Span) -> bool {
    let chars = buffers.chars();
    let name = &chars[key.range()];
    let text = &chars[value.range()];

    match (name.first().map(u8::to_ascii_lowercase), name.len()) {
        (Some(b'c'), 10) if eq_ignore_case(name, b"connection") => {
            if eq_ignore_case(text, b"close") {
                head.keepalive = false;
            }
        }
        (Some(b'c'), 6) if eq_ignore_case(name, b"cookie") => {
            buffers.scan_cookies(value);
        }
        (Some(b'c'), 14) if eq_ignore_case(name, b"content-length") => {
            head.content_length = leading_number(text);
        }
        (Some(b'e'), 6) if eq_ignore_case(name, b"expect") => {
            if eq_ignore_case(text, b"100-continue") {
                head.expect_continue = true;
                return false;
            }
        }
        (Some(b'h'), 4) if eq_ignore_case(name, b"host") => {
            head.host = Some(value);
        }
        (Some(b't'), 17) if eq_ignore_case(name, b"transfer-encoding") => {
            head.transfer_encoding = true;
        }
        _ => {}
    }
    true
}

/// The leading decimal digits of `bytes`, `None` when there are none or they overflow.
fn leading_number(bytes: &[u8]) -> Option<u64> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    bytes[..digits].iter().try_fold(0u64, |n, b| n.checked_mul(10)?.checked_add(u64::from(b - b'0')))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::protocol::Request;

    fn decode(buffers: &mut RequestBuffers, input: &str) -> (Result<Option<RequestHead>, ParseError>, BytesMut) {
        let mut src = BytesMut::from(input.as_bytes());
        let result = HeaderDecoder::new(buffers, 64 * 1024).decode(&mut src);
        (result, src)
    }

    fn buffers() -> RequestBuffers {
        RequestBuffers::new(&EngineConfig::default())
    }

    #[test]
    fn test_basic_request() {
        let str = indoc! {r"
        GET /index.html?lang=en HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "};
        let mut buffers = buffers();
        let (result, rest) = decode(&mut buffers, str);
        let head = result.unwrap().unwrap();
        assert!(rest.is_empty());

        let request = Request::new(&head, &buffers);
        assert_eq!(request.method(), Some(http::Method::GET));
        assert_eq!(request.uri(), b"/index.html?lang=en");
        assert_eq!(request.path(), b"/index.html");
        assert_eq!(request.query(), Some(&b"lang=en"[..]));
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.host().unwrap(), "127.0.0.1:8080");
        assert_eq!(request.header_count(), 3);
        assert_eq!(request.header("user-agent").unwrap(), "curl/7.79.1");
        assert!(request.is_keepalive());

        let names: Vec<String> = request.headers().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, ["Host", "User-Agent", "Accept"]);
    }

    #[test]
    fn test_incomplete_then_complete() {
        let full = "POST /submit HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhelloGET";
        let mut buffers = buffers();
        for cut in 0..full.find("\r\n\r\n").unwrap() + 4 {
            let (result, _) = decode(&mut buffers, &full[..cut]);
            assert!(result.unwrap().is_none(), "cut at {cut}");
        }

        let (result, rest) = decode(&mut buffers, full);
        let head = result.unwrap().unwrap();
        assert_eq!(head.content_length(), Some(5));
        assert_eq!(buffers.method(), b"POST");
        assert_eq!(&rest[..], b"helloGET");
    }

    #[test]
    fn test_leading_whitespace() {
        let mut buffers = buffers();
        let (result, rest) = decode(&mut buffers, "\r\n \r\n");
        assert!(result.unwrap().is_none());
        assert!(rest.is_empty());

        let (result, _) = decode(&mut buffers, "\r\n\r\nget / HTTP/1.0\r\n\r\n");
        let head = result.unwrap().unwrap();
        assert_eq!(buffers.method(), b"GET");
        assert_eq!(head.version(), Version::HTTP_10);
        assert!(!head.is_keepalive());
    }

    #[test]
    fn test_http09_is_headerless() {
        let mut buffers = buffers();
        let (result, rest) = decode(&mut buffers, "GET /old\r\nHost: ignored\r\n");
        let head = result.unwrap().unwrap();
        assert_eq!(head.version(), Version::HTTP_09);
        assert_eq!(buffers.uri(), b"/old");
        assert_eq!(buffers.header_count(), 0);
        assert_eq!(&rest[..], b"Host: ignored\r\n");
    }

    #[test]
    fn test_protocol_variants() {
        let cases = [
            ("HTTP/1.1", Version::HTTP_11),
            ("http/1.0", Version::HTTP_10),
            ("HTTP/1.2", Version::HTTP_11),
            ("HTTP/2.0", Version::HTTP_11),
            ("HTTP/01.00", Version::HTTP_10),
            ("HTTP/0.9", Version::HTTP_09),
            ("HTTP/1", Version::HTTP_09),
            ("HTTP/x.y", Version::HTTP_09),
            ("FOO/1.1X", Version::HTTP_09),
        ];
        for (token, expected) in cases {
            let mut buffers = buffers();
            let input = format!("GET / {token}\r\nHost: h\r\n\r\n");
            let (result, _) = decode(&mut buffers, &input);
            assert_eq!(result.unwrap().unwrap().version(), expected, "{token}");
        }
    }

    #[test]
    fn test_absolute_uri() {
        let mut buffers = buffers();
        let (result, _) = decode(&mut buffers, "GET http://example.com:8080/a/b?c=d HTTP/1.1\r\n\r\n");
        let head = result.unwrap().unwrap();
        let request = Request::new(&head, &buffers);
        assert_eq!(request.uri(), b"/a/b?c=d");
        assert_eq!(request.host().unwrap(), "example.com:8080");

        let mut buffers = self::buffers();
        let (result, _) = decode(&mut buffers, "GET http://example.com?q HTTP/1.1\r\nHost: other\r\n\r\n");
        let head = result.unwrap().unwrap();
        let request = Request::new(&head, &buffers);
        assert_eq!(request.uri(), b"/?q");
        assert_eq!(request.host().unwrap(), "example.com");

        let mut buffers = self::buffers();
        let (result, _) = decode(&mut buffers, "OPTIONS * HTTP/1.1\r\nHost: h\r\n\r\n");
        result.unwrap().unwrap();
        assert_eq!(buffers.uri(), b"*");
    }

    #[test]
    fn test_missing_host() {
        let mut buffers = buffers();
        let (result, _) = decode(&mut buffers, "GET / HTTP/1.1\r\nAccept: */*\r\n\r\n");
        assert!(matches!(result, Err(ParseError::MissingHost)));

        let (result, _) = decode(&mut buffers, "GET / HTTP/1.0\r\n\r\n");
        assert!(result.unwrap().is_some());
    }

    #[test]
    fn test_folding_and_trimming() {
        let input = "GET / HTTP/1.1\r\nHost: h\r\nX-Long : first\r\n \t second \r\nX-Empty:\r\nno colon here\nX-Bare: lf\n\n";
        let mut buffers = buffers();
        let (result, rest) = decode(&mut buffers, input);
        let head = result.unwrap().unwrap();
        assert!(rest.is_empty());

        let request = Request::new(&head, &buffers);
        assert_eq!(request.header("x-long").unwrap(), "first second");
        assert_eq!(request.header("x-empty").unwrap(), "");
        assert_eq!(request.header("x-bare").unwrap(), "lf");
        assert_eq!(request.header_count(), 4);
    }

    #[test]
    fn test_fold_needs_lookahead() {
        let mut buffers = buffers();
        let (result, _) = decode(&mut buffers, "GET / HTTP/1.1\r\nHost: h\r\n");
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_special_headers() {
        let str = indoc! {r"
        PUT /upload HTTP/1.1
        host: h
        Connection: Close
        Expect: 100-continue
        Transfer-Encoding: chunked
        Content-Length: 12abc
        Cookie: a=1; b=2

        "};
        let mut buffers = buffers();
        let (result, _) = decode(&mut buffers, str);
        let head = result.unwrap().unwrap();
        let request = Request::new(&head, &buffers);

        assert!(!request.is_keepalive());
        assert!(request.expects_continue());
        assert!(request.header("expect").is_none());
        assert!(request.is_chunked());
        assert_eq!(request.content_length(), Some(12));
        assert_eq!(request.cookie("b").unwrap(), "2");
        assert_eq!(request.header_count(), 5);
    }

    #[test]
    fn test_content_length_without_digits() {
        let mut buffers = buffers();
        let (result, _) = decode(&mut buffers, "POST / HTTP/1.1\r\nHost: h\r\nContent-Length: abc\r\n\r\n");
        assert_eq!(result.unwrap().unwrap().content_length(), None);
    }

    #[test]
    fn test_limits() {
        let config = EngineConfig { header_buffer_size: 16, max_headers: 2, ..EngineConfig::default() };

        let mut buffers = RequestBuffers::new(&config);
        let (result, _) = decode(&mut buffers, "GET / HTTP/1.1\r\nHost: h\r\nX-Very-Long-Header: value\r\n\r\n");
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));

        let mut buffers = RequestBuffers::new(&config);
        let (result, _) = decode(&mut buffers, "GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        assert!(matches!(result, Err(ParseError::TooManyHeaders { max_num: 2 })));

        let mut buffers = RequestBuffers::new(&config);
        let mut src = BytesMut::from(&b"GET /aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"[..]);
        let result = HeaderDecoder::new(&mut buffers, 16).decode(&mut src);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { max_size: 16, .. })));
    }
}
