use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode, Version};
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::codec::ResponseDecoder;
use crate::connection::Connection;
use crate::pool::Connector;
use crate::protocol::{ConnectionError, Cookies, HttpError, Message, ParseError, PayloadItem, PayloadSize, ResponseHeader};

/// A response whose head was read; the body is read by [`read`](Response::read).
///
/// The response owns the connection it came from until the body is fully
/// read, then gives it back to the connector. Dropping a response before
/// that discards the connection.
#[derive(Debug)]
pub struct Response {
    header: ResponseHeader,
    payload_size: PayloadSize,
    content_length: Option<u64>,
    trailers: HeaderMap,
    cookies: Cookies,
    body: Option<Bytes>,
    decoder: ResponseDecoder,
    connection: Option<Connection>,
    connector: Connector,
}

impl Response {
    pub(crate) fn new(
        header: ResponseHeader,
        payload_size: PayloadSize,
        decoder: ResponseDecoder,
        connection: Connection,
        connector: Connector,
    ) -> Self {
        let content_length = match payload_size {
            PayloadSize::Length(n) => Some(n),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        };

        let mut cookies = Cookies::new();
        cookies.extend_from_headers(header.headers());

        let mut response = Self {
            header,
            payload_size,
            content_length,
            trailers: HeaderMap::new(),
            cookies,
            body: None,
            decoder,
            connection: Some(connection),
            connector,
        };

        if payload_size.is_empty() {
            response.finish_empty();
        }
        response
    }

    /// A response without body is complete with its head.
    fn finish_empty(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        match self.decoder.decode(connection.read_buffer_mut()) {
            Ok(Some(Message::Payload(PayloadItem::Eof))) => {
                self.body = Some(Bytes::new());
                connection.finish_exchange(self.header.is_keep_alive());
                self.release();
            }
            // the next read reports it
            _ => debug!("empty body did not finish"),
        }
    }

    /// Reads the whole body, returning it.
    ///
    /// Calling it again returns the same body without any I/O. Once the body
    /// is read, the trailers, cookies and content length are final and the
    /// connection is released to the connector.
    ///
    /// # Errors
    ///
    /// - [`ParseError::IncompleteBody`] if the server closed the connection
    ///   before the announced end of the body
    /// - [`ParseError`] if the chunked framing is malformed
    /// - [`ConnectionError::ReadTimeout`] and other socket errors
    ///
    /// After an error the connection is discarded and further calls fail
    /// with [`ConnectionError::Configuration`].
    pub async fn read(&mut self) -> Result<Bytes, HttpError> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }

        match self.drain().await {
            Ok(body) => {
                self.body = Some(body.clone());
                Ok(body)
            }
            Err(e) => {
                warn!(cause = %e, "reading response body failed");
                // dropping discards it and frees its slots
                self.connection.take();
                Err(e)
            }
        }
    }

    async fn drain(&mut self) -> Result<Bytes, HttpError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(ConnectionError::configuration("response body is no longer readable").into());
        };

        let mut body = BytesMut::new();
        let mut eof = false;
        loop {
            let message = if eof {
                self.decoder.decode_eof(connection.read_buffer_mut())?
            } else {
                self.decoder.decode(connection.read_buffer_mut())?
            };

            match message {
                Some(Message::Payload(PayloadItem::Chunk(bytes))) => body.extend_from_slice(&bytes),
                Some(Message::Payload(PayloadItem::Trailers(trailers))) => {
                    trace!(id = %connection.id(), count = trailers.len(), "received trailers");
                    self.cookies.extend_from_headers(&trailers);
                    self.trailers.extend(trailers);
                }
                Some(Message::Payload(PayloadItem::Eof)) => break,
                Some(Message::Header(_)) => return Err(ParseError::invalid_header("unexpected second response head").into()),
                None if eof => return Err(ParseError::incomplete_body(body.len()).into()),
                None => eof = connection.fill_buf().await? == 0,
            }
        }

        let body = body.freeze();
        if self.content_length.is_none() {
            self.content_length = Some(body.len() as u64);
        }

        let keep_alive = self.header.is_keep_alive() && !self.payload_size.is_until_close();
        connection.finish_exchange(keep_alive);
        debug!(id = %connection.id(), len = body.len(), keep_alive, "response body read");
        self.release();

        Ok(body)
    }

    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.connector.release(connection);
        }
    }

    /// True for 2xx and 3xx status codes.
    pub fn ok(&self) -> bool {
        (200..400).contains(&self.status_code())
    }

    pub fn status(&self) -> StatusCode {
        self.header.status()
    }

    pub fn status_code(&self) -> u16 {
        self.header.status().as_u16()
    }

    /// The reason phrase of the status line, which may be empty.
    pub fn reason(&self) -> &str {
        self.header.reason()
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// The body length: known from the head for length framed responses,
    /// otherwise known once the body was read.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.payload_size.is_chunked()
    }

    /// Fields of the trailer section of a chunked body, empty until the body was read.
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// Cookies set by the `Set-Cookie` headers and, once the body was read,
    /// by the trailers. A later cookie of the same name wins.
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// The body, if it was read already.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// True once the body was read and the connection released.
    pub fn is_complete(&self) -> bool {
        self.body.is_some()
    }
}
