//! HTTP header encoder implementation for serializing HTTP request heads
//!
//! This module provides functionality for encoding the request line and header
//! section of an outgoing request into raw bytes, managing the framing header
//! according to the payload that follows.

use crate::protocol::{PayloadSize, RequestHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Method, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for HTTP request heads implementing the [`Encoder`] trait.
///
/// This encoder serializes a [`RequestHead`] and [`PayloadSize`] into raw bytes,
/// setting `Content-Length` or `Transfer-Encoding` based on the payload size.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes an HTTP request head into the provided bytes buffer.
    ///
    /// The request target is written in origin-form (`/path?query`), or in
    /// authority-form for `CONNECT`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - HTTP version is not HTTP/1.0 or HTTP/1.1
    /// - a `CONNECT` request has no authority
    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);

        let version = match header.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        let target = if header.method() == Method::CONNECT {
            header.uri().authority().map(|authority| authority.as_str()).ok_or_else(|| SendError::invalid_uri("CONNECT needs an authority"))?
        } else {
            header.uri().path_and_query().map_or("/", |path_and_query| path_and_query.as_str())
        };

        write!(FastWrite(dst), "{} {} {}\r\n", header.method(), target, version)?;

        // Set appropriate content length or transfer encoding header
        match payload_size {
            PayloadSize::Length(n) => {
                header.headers_mut().remove(header::TRANSFER_ENCODING);
                header.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                header.headers_mut().remove(header::CONTENT_LENGTH);
                header.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty | PayloadSize::UntilClose => {
                // requests without a body don't announce one
                if needs_zero_length(header.method()) && !header.headers().contains_key(header::CONTENT_LENGTH) {
                    const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");
                    header.headers_mut().insert(header::CONTENT_LENGTH, ZERO_VALUE);
                }
            }
        }

        // Write all headers
        for (header_name, header_value) in header.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Methods whose requests are expected to carry a body, so an empty one is announced explicitly.
fn needs_zero_length(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Fast writer implementation for writing to BytesMut.
///
/// We've already reserved enough space, so writes go straight into the buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn encode(head: RequestHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn encode_get() {
        let head = Request::get("http://example/index.html?a=1").header("Host", "example").body(()).unwrap();

        assert_eq!(encode(head, PayloadSize::Empty), "GET /index.html?a=1 HTTP/1.1\r\nhost: example\r\n\r\n");
    }

    #[test]
    fn encode_post_with_length() {
        let head = Request::post("/upload").header("Host", "example").header("Transfer-Encoding", "gzip").body(()).unwrap();

        assert_eq!(encode(head, PayloadSize::Length(5)), "POST /upload HTTP/1.1\r\nhost: example\r\ncontent-length: 5\r\n\r\n");
    }

    #[test]
    fn encode_empty_post_announces_zero_length() {
        let head = Request::post("/").body(()).unwrap();

        assert_eq!(encode(head, PayloadSize::Empty), "POST / HTTP/1.1\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn encode_connect_uses_authority() {
        let head = Request::connect("example:443").header("Host", "example:443").body(()).unwrap();

        assert_eq!(encode(head, PayloadSize::Empty), "CONNECT example:443 HTTP/1.1\r\nhost: example:443\r\n\r\n");
    }

    #[test]
    fn reject_http2() {
        let head = Request::get("/").version(Version::HTTP_2).body(()).unwrap();

        let mut dst = BytesMut::new();
        let result = HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst);
        assert!(matches!(result, Err(SendError::Io { .. })));
    }
}
