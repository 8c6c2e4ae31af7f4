//! Decoder for response bodies sent with `Transfer-Encoding: chunked`.
//!
//! A chunked body is a series of `size-in-hex [; extensions] CRLF data CRLF`
//! chunks, ended by a zero sized chunk and an optional trailer section
//! ([RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1)).
//! Chunk extensions are ignored; trailer fields are handed out as
//! [`PayloadItem::Trailers`] right before [`PayloadItem::Eof`].

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Maximum length of a chunk size line, extensions included
const MAX_SIZE_LINE_BYTES: usize = 4 * 1024;

/// Maximum number of trailer fields after the last chunk
const MAX_TRAILER_NUM: usize = 32;

/// Maximum size in bytes of the trailer section
const MAX_TRAILER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Expecting a chunk size line
    Size,
    /// Inside the data of a chunk, with this many bytes left
    Data(u64),
    /// Expecting the CRLF closing a chunk's data
    DataEnd,
    /// After the last chunk, up to the empty line ending the trailer section
    Trailers,
    /// The whole body was read
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes the next piece of a chunked body.
    ///
    /// Chunk data is handed out as soon as it arrives, so one chunk on the
    /// wire may be split over several [`PayloadItem::Chunk`]s.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }

                ChunkedState::Size => match httparse::parse_chunk_size(src) {
                    Ok(Status::Complete((consumed, 0))) => {
                        src.advance(consumed);
                        self.state = ChunkedState::Trailers;
                    }
                    Ok(Status::Complete((consumed, size))) => {
                        src.advance(consumed);
                        self.state = ChunkedState::Data(size);
                    }
                    Ok(Status::Partial) => {
                        ensure!(src.len() <= MAX_SIZE_LINE_BYTES, ParseError::invalid_body("chunk size line too long"));
                        return Ok(None);
                    }
                    Err(_) => return Err(ParseError::invalid_body("invalid chunk size line")),
                },

                ChunkedState::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    // `remaining` may not fit into usize on 32 bit targets
                    let len = usize::try_from(remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
                    let left = remaining - len as u64;
                    self.state = if left == 0 { ChunkedState::DataEnd } else { ChunkedState::Data(left) };

                    trace!(len, "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        ensure!(src.first().is_none_or(|&b| b == b'\r'), ParseError::invalid_body("missing CRLF after chunk data"));
                        return Ok(None);
                    }
                    ensure!(src.starts_with(b"\r\n"), ParseError::invalid_body("missing CRLF after chunk data"));
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailers => {
                    let Some(trailers) = parse_trailers(src)? else {
                        return Ok(None);
                    };

                    self.state = ChunkedState::End;
                    if !trailers.is_empty() {
                        trace!(count = trailers.len(), "read chunked trailers");
                        return Ok(Some(PayloadItem::Trailers(trailers)));
                    }
                }
            }
        }
    }
}

/// Parses the trailer section that follows the last chunk.
///
/// Returns `Ok(None)` while the terminating empty line has not arrived yet.
fn parse_trailers(src: &mut BytesMut) -> Result<Option<HeaderMap>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];

    let (consumed, trailers) = match httparse::parse_headers(src, &mut headers) {
        Ok(Status::Complete((consumed, parsed))) => {
            let mut trailers = HeaderMap::with_capacity(parsed.len());
            for header in parsed {
                let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
                trailers.append(name, value);
            }
            (consumed, trailers)
        }
        Ok(Status::Partial) => {
            ensure!(src.len() <= MAX_TRAILER_BYTES, ParseError::too_large_header(src.len(), MAX_TRAILER_BYTES));
            return Ok(None);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_TRAILER_NUM)),
        Err(e) => return Err(ParseError::invalid_header(e.to_string())),
    };

    src.advance(consumed);
    Ok(Some(trailers))
}
