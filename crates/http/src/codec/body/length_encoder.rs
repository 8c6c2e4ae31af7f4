use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Writes a request body announced with `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    pub fn is_finish(&self) -> bool {
        self.length == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                if bytes.remaining() as u64 > self.length {
                    warn!(remaining = self.length, len = bytes.remaining(), "payload exceeds announced content-length");
                    return Err(SendError::invalid_body("payload exceeds announced content-length"));
                }
                self.length -= bytes.remaining() as u64;
                dst.extend_from_slice(bytes.chunk());
                Ok(())
            }
            PayloadItem::Trailers(_) => Err(SendError::invalid_body("trailers need a chunked body")),
            PayloadItem::Eof if self.length == 0 => Ok(()),
            PayloadItem::Eof => Err(SendError::invalid_body(format!("payload is {} bytes short of content-length", self.length))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn write_exact_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"hello");
    }

    #[test]
    fn reject_overflow() {
        let mut encoder = LengthEncoder::new(2);
        let mut dst = BytesMut::new();

        let result = encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
        assert!(dst.is_empty());
    }

    #[test]
    fn reject_short_body() {
        let mut encoder = LengthEncoder::new(4);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ab")), &mut dst).unwrap();
        let result = encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
