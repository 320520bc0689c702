//! Request body in chunked transfer-encoding.
//!
//! `<hex-size>[;ext]\r\n<data>\r\n ... 0\r\n[trailer lines]\r\n`. Extensions are skipped
//! without being validated, except that a bare LF inside one is refused. Trailer lines are
//! consumed and dropped.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

use ChunkedState::{
    Body, BodyCr, BodyLf, End, EndCr, EndLf, Extension, Size, SizeLf, SizeLws, SizeStart, Trailer, TrailerLf,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: SizeStart, remaining: 0 }
    }

    /// Whether the terminal chunk and trailer have been consumed.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == End
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// First byte of a size line, which must be a hex digit.
    SizeStart,
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

type Step = Poll<Result<ChunkedState, ParseError>>;

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked body");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut data = None;
            self.state = match self.state.step(src, &mut self.remaining, &mut data) {
                Poll::Pending => return Ok(None),
                Poll::Ready(state) => state?,
            };

            if let Some(bytes) = data {
                trace!(len = bytes.len(), "read chunk data");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

/// Consumes one byte that must be `$expected`, moving to `$next`.
macro_rules! expect_byte {
    ($src:ident, $expected:literal, $next:expr, $what:literal) => {{
        if next_byte!($src) == $expected {
            Poll::Ready(Ok($next))
        } else {
            Poll::Ready(Err(ParseError::invalid_body($what)))
        }
    }};
}

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining: &mut u64, data: &mut Option<Bytes>) -> Step {
        match self {
            SizeStart => Self::read_size_start(src, remaining),
            Size => Self::read_size(src, remaining),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => {
                let next = if *remaining == 0 { EndCr } else { Body };
                expect_byte!(src, b'\n', next, "invalid chunk size line ending")
            }
            Body => Self::read_body(src, remaining, data),
            BodyCr => expect_byte!(src, b'\r', BodyLf, "missing CR after chunk data"),
            BodyLf => expect_byte!(src, b'\n', SizeStart, "missing LF after chunk data"),
            Trailer => match next_byte!(src) {
                b'\r' => Poll::Ready(Ok(TrailerLf)),
                _ => Poll::Ready(Ok(Trailer)),
            },
            TrailerLf => expect_byte!(src, b'\n', EndCr, "invalid trailer line ending"),
            // anything but CR starts a trailer line
            EndCr => match next_byte!(src) {
                b'\r' => Poll::Ready(Ok(EndLf)),
                _ => Poll::Ready(Ok(Trailer)),
            },
            EndLf => expect_byte!(src, b'\n', End, "invalid chunked body ending"),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size_start(src: &mut BytesMut, size: &mut u64) -> Step {
        let digit = match next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b - b'a' + 10,
            b @ b'A'..=b'F' => b - b'A' + 10,
            _ => return Poll::Ready(Err(ParseError::invalid_body("missing chunk size"))),
        };
        *size = u64::from(digit);
        Poll::Ready(Ok(Size))
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Step {
        let digit = match next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b - b'a' + 10,
            b @ b'A'..=b'F' => b - b'A' + 10,
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(ParseError::invalid_body("invalid chunk size"))),
        };

        match size.checked_mul(16).and_then(|s| s.checked_add(u64::from(digit))) {
            Some(s) => {
                *size = s;
                Poll::Ready(Ok(Size))
            }
            None => Poll::Ready(Err(ParseError::invalid_body("chunk size overflow"))),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> Step {
        match next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_body("invalid whitespace after chunk size"))),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Step {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_body("chunk extension contains a bare LF"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_body(src: &mut BytesMut, remaining: &mut u64, data: &mut Option<Bytes>) -> Step {
        if *remaining == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let n = usize::try_from(*remaining).unwrap_or(usize::MAX).min(src.len());
        *remaining -= n as u64;
        *data = Some(src.split_to(n).freeze());

        if *remaining > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<Vec<u8>, ParseError> {
        let mut buffer = BytesMut::from(input);
        let mut decoder = ChunkedDecoder::new();
        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut buffer)? {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return Ok(body),
                None => panic!("incomplete input"),
            }
        }
    }

    #[test]
    fn test_multiple_chunks() {
        assert_eq!(decode_all(b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n").unwrap(), b"hello, world");
        assert_eq!(decode_all(b"10\r\n1234567890abcdef\r\n0\r\n\r\n").unwrap(), b"1234567890abcdef");
        assert_eq!(decode_all(b"0\r\n\r\n").unwrap(), b"");
    }

    #[test]
    fn test_extensions_and_trailers_are_skipped() {
        assert_eq!(decode_all(b"5;name=\"v\"\r\nhello\r\n0\r\n\r\n").unwrap(), b"hello");
        assert_eq!(decode_all(b"5 \r\nhello\r\n0\r\nX-Sum: 1\r\nX-Other: 2\r\n\r\n").unwrap(), b"hello");
    }

    #[test]
    fn test_bare_lf_in_extension_rejected() {
        let err = decode_all(b"5;ext\nhello\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidBody { .. }));
    }

    #[test]
    fn test_garbage_size_is_an_error() {
        let err = decode_all(b"ZZZ\r\n").unwrap_err();
        assert!(err.is_malformed());

        let err = decode_all(b"fffffffffffffffff\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidBody { .. }));
    }

    #[test]
    fn test_size_line_without_digits_is_an_error() {
        let inputs: [&[u8]; 4] = [b"\r\n\r\n", b";ext\r\n\r\n", b" 5\r\nhello\r\n0\r\n\r\n", b"5\r\nhello\r\n\r\n\r\n"];
        for input in inputs {
            let err = decode_all(input).unwrap_err();
            assert!(matches!(err, ParseError::InvalidBody { .. }), "{input:?}");
        }
    }

    #[test]
    fn test_missing_crlf_after_data() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"hello"));
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_partial_input() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"hel"));
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\nGET /next");
        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"lo"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finished());
        assert_eq!(&buffer[..], b"GET /next");
    }
}
