//! Body of an upgraded connection: no framing, everything until the peer closes.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Hands out whatever is buffered. The end of the body is the end of the stream, which only
/// the reader can see, so this decoder never yields `Eof` by itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Ok(Some(PayloadItem::Eof)),
        }
    }
}
