//! HTTP response decoder module
//!
//! This module provides functionality for decoding HTTP responses using a streaming approach.
//! It handles both head parsing and payload decoding through a state machine pattern.
//!
//! # Components
//!
//! - [`ResponseDecoder`]: Main decoder that coordinates head and payload parsing
//! - Head parsing: Uses [`HeaderDecoder`] for parsing the status line and headers
//! - Payload handling: Uses [`PayloadDecoder`] for handling response bodies if any
//!
//! # Example
//!
//! ```
//! use micro_http_client::codec::ResponseDecoder;
//! use micro_http_client::protocol::Message;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//! use http::Method;
//!
//! let mut decoder = ResponseDecoder::new(Method::GET);
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//!
//! let head = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(head.is_header());
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHeader};
use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

/// A decoder for HTTP responses that handles both the head and the payload
///
/// The decoder operates in two phases:
/// 1. Head parsing: Decodes the status line and headers using [`HeaderDecoder`]
/// 2. Payload parsing: If present, decodes the response body using [`PayloadDecoder`]
///
/// # State Machine
///
/// The decoder maintains its state through the `payload_decoder` field:
/// - `None`: Currently parsing the head, or the payload is finished
/// - `Some(PayloadDecoder)`: Currently parsing payload
#[derive(Debug)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    head_decoded: bool,
}

impl ResponseDecoder {
    /// Creates a decoder for the response to a request sent with `request_method`
    pub fn new(request_method: Method) -> Self {
        Self { header_decoder: HeaderDecoder::new(request_method), payload_decoder: None, head_decoded: false }
    }

    /// Returns true once the head and the whole payload were decoded
    pub fn is_finished(&self) -> bool {
        self.head_decoded && self.payload_decoder.is_none()
    }

    fn payload_message(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Eof) => {
                // no need payload decoder in this response now
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            Some(item) => Some(Message::Payload(item)),
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, PayloadSize)>;
    type Error = ParseError;

    /// Attempts to decode an HTTP response from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: Successfully decoded the response head
    /// - `Ok(Some(Message::Payload(_)))`: Successfully decoded a payload chunk, the trailers or EOF
    /// - `Ok(None)`: Need more data to proceed
    /// - `Err(_)`: Encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // parse payload if have payload_decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.payload_message(item));
        }

        if self.head_decoded {
            // a response carries exactly one head
            return Ok(None);
        }

        // parse response head
        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.head_decoded = true;
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    /// Decodes what is left once the server closed the stream.
    ///
    /// A head cut short is reported as [`ParseError::Io`], a truncated body
    /// as [`ParseError::IncompleteBody`] by the caller, which knows how much
    /// was received.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.payload_message(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if self.head_decoded => Ok(None),
            None => Err(ParseError::io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before the response head was complete",
            ))),
        }
    }
}
