//! Picks the body framing of a request and decodes it.

use bytes::BytesMut;
use http::Version;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::raw_decoder::RawDecoder;
use crate::protocol::{ParseError, PayloadItem};

/// Methods that must declare how long their body is.
const BODY_METHODS: [&[u8]; 3] = [b"POST", b"PUT", b"PATCH"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    Raw(RawDecoder),
}

impl PayloadDecoder {
    /// A body of zero bytes.
    pub fn empty() -> Self {
        Self::fix_length(0)
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    /// The unframed body of an upgraded connection.
    pub fn raw() -> Self {
        Self { kind: Kind::Raw(RawDecoder) }
    }

    /// Selects the decoder for a parsed request head.
    ///
    /// A duplex connection reads raw. Otherwise chunking applies on HTTP/1.1 when
    /// `Transfer-Encoding` was sent without a length, then a declared length. A body-bearing
    /// method with neither fails with [`ParseError::LengthRequired`]; the caller installs
    /// [`PayloadDecoder::empty`] so the stream stays positioned at the next request.
    pub fn select(
        method: &[u8],
        content_length: Option<u64>,
        transfer_encoding: bool,
        version: Version,
        duplex: bool,
    ) -> Result<Self, ParseError> {
        if duplex {
            return Ok(Self::raw());
        }

        if version >= Version::HTTP_11 && transfer_encoding && content_length.is_none() {
            return Ok(Self::chunked());
        }

        if let Some(length) = content_length {
            return Ok(Self::fix_length(length));
        }

        if BODY_METHODS.contains(&method) {
            debug!(method = %String::from_utf8_lossy(method), "body length not declared");
            return Err(ParseError::length_required(method));
        }

        Ok(Self::empty())
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    #[inline]
    pub fn is_fix_length(&self) -> bool {
        matches!(self.kind, Kind::Length(_))
    }

    #[inline]
    pub fn is_raw(&self) -> bool {
        matches!(self.kind, Kind::Raw(_))
    }

    /// Whether the body is known to be zero bytes long.
    pub fn is_empty(&self) -> bool {
        matches!(&self.kind, Kind::Length(d) if d.remaining() == 0)
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::Raw(decoder) => decoder.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Raw(decoder) => decoder.decode_eof(src),
            _ => match self.decode(src)? {
                Some(item) => Ok(Some(item)),
                None => Err(ParseError::UnexpectedEof),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_order() {
        let v11 = Version::HTTP_11;

        assert!(PayloadDecoder::select(b"POST", Some(3), true, v11, true).unwrap().is_raw());
        assert!(PayloadDecoder::select(b"POST", None, true, v11, false).unwrap().is_chunked());
        assert!(PayloadDecoder::select(b"POST", Some(3), true, v11, false).unwrap().is_fix_length());
        assert!(PayloadDecoder::select(b"GET", None, false, v11, false).unwrap().is_empty());

        // chunking needs HTTP/1.1
        let err = PayloadDecoder::select(b"PUT", None, true, Version::HTTP_10, false).unwrap_err();
        assert!(matches!(err, ParseError::LengthRequired { .. }));

        let err = PayloadDecoder::select(b"PATCH", None, false, v11, false).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_eof_inside_body() {
        let mut decoder = PayloadDecoder::fix_length(4);
        let mut buffer = BytesMut::new();
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));

        let mut decoder = PayloadDecoder::raw();
        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_eof());
    }
}
