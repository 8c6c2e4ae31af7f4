//! HTTP header decoder implementation for parsing HTTP response heads
//!
//! This module provides functionality for decoding the status line and header
//! section of an HTTP response from raw bytes into a [`ResponseHeader`], and for
//! choosing how the body that follows is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only supports HTTP/1.0 and HTTP/1.1
//!
//! # Implementation Details
//!
//! The decoder works in multiple stages:
//!
//! 1. Parse raw bytes using `httparse`
//! 2. Record header name/value byte ranges
//! 3. Convert to typed `http::Response` structure
//! 4. Determine payload framing based on status, request method and headers
//!
//! Interim `1xx` responses (other than `101 Switching Protocols`) are consumed
//! and skipped, the decoder only yields the final response head.

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Method, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, ResponseHeader};

/// Maximum number of headers allowed in a response
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP response heads implementing the [`Decoder`] trait.
///
/// The request method is needed to frame the body: a response to `HEAD` never
/// carries one, whatever its `Content-Length` says.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    request_method: Method,
}

impl HeaderDecoder {
    pub fn new(request_method: Method) -> Self {
        Self { request_method }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode an HTTP response head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete head was successfully parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // the shortest status line is "HTTP/1.1 200"
            if src.len() < 12 {
                return Ok(None);
            }

            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            let mut resp = httparse::Response::new(&mut headers);

            let parsed_result = resp.parse(src).map_err(|e| match e {
                Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
                e => ParseError::invalid_header(e.to_string()),
            });

            let body_offset = match parsed_result? {
                Status::Complete(body_offset) => body_offset,
                Status::Partial => {
                    ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                    return Ok(None);
                }
            };

            trace!(head_size = body_offset, "parsed response head");
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let version = match resp.version {
                Some(0) => http::Version::HTTP_10,
                Some(1) => http::Version::HTTP_11,
                // HTTP/2 and HTTP/3 are not spoken over this transport
                v => return Err(ParseError::InvalidVersion(v)),
            };

            let status = resp
                .code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or(ParseError::InvalidStatus(resp.code))?;

            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                debug!(status = status.as_u16(), "skip interim response");
                src.advance(body_offset);
                continue;
            }

            let reason = resp.reason.unwrap_or_default().to_string();
            let header_count = resp.headers.len();

            // Calculate and record byte range indices for each header
            let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
            HeaderIndex::record(src, resp.headers, &mut header_index);

            let mut response = Response::new(());
            *response.status_mut() = status;
            *response.version_mut() = version;

            let headers = response.headers_mut();
            headers.reserve(header_count);

            // Split header portion from source buffer
            let header_bytes = src.split_to(body_offset).freeze();
            for index in &header_index[..header_count] {
                let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
                    .map_err(ParseError::invalid_header)?;

                headers.append(name, value);
            }

            let header = ResponseHeader::new(response, reason);
            let payload_size = parse_payload(&header, &self.request_method)?;

            return Ok(Some((header, payload_size)));
        }
    }
}

/// Stores the byte range positions of a header's name and value within the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    /// Start and end byte positions of the header name
    pub(crate) name: (usize, usize),
    /// Start and end byte positions of the header value
    pub(crate) value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    /// Records the byte positions of header names and values from the parsed headers.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

/// Determines how the response body is framed.
///
/// refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length
///
/// - responses to HEAD and 1xx/204/304 responses have no body
/// - `Transfer-Encoding` ending in `chunked` selects chunked framing
/// - `Content-Length` selects a fixed length
/// - otherwise the body runs until the server closes the connection
fn parse_payload(header: &ResponseHeader, request_method: &Method) -> Result<PayloadSize, ParseError> {
    if request_method == Method::HEAD || header.is_bodyless_status() {
        return Ok(PayloadSize::Empty);
    }

    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::UntilClose),

        (te_value @ Some(_), _) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                // a transfer coding we can't frame, the body ends with the connection
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, Some(_)) => {
            let length = parse_content_length(header)?;
            Ok(PayloadSize::Length(length))
        }
    }
}

/// Parses the `Content-Length` header, rejecting conflicting duplicates.
pub(crate) fn parse_content_length(header: &ResponseHeader) -> Result<u64, ParseError> {
    let mut length = None;
    for cl_value in header.headers().get_all(http::header::CONTENT_LENGTH) {
        let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

        let value = cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

        match length {
            Some(previous) if previous != value => {
                return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {value}")));
            }
            _ => length = Some(value),
        }
    }

    length.ok_or_else(|| ParseError::invalid_content_length("header is absent"))
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value
        && let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next()
    {
        return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
    }
    false
}
