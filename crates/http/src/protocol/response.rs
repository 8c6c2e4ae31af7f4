//! HTTP response header handling implementation.
//!
//! This module wraps the standard `http::Response<()>` with the reason phrase
//! the peer sent, which `http` itself does not keep.

use http::{HeaderMap, Response, StatusCode, Version, header};

/// Type alias for HTTP response heads before a body is attached.
pub type ResponseHead = Response<()>;

/// Represents a parsed HTTP response status line and header section.
#[derive(Debug)]
pub struct ResponseHeader {
    inner: ResponseHead,
    reason: String,
}

impl AsRef<ResponseHead> for ResponseHeader {
    fn as_ref(&self) -> &ResponseHead {
        &self.inner
    }
}

impl ResponseHeader {
    pub fn new(inner: ResponseHead, reason: impl Into<String>) -> Self {
        Self { inner, reason: reason.into() }
    }

    /// Consumes the header and returns the inner `Response<()>`.
    pub fn into_inner(self) -> ResponseHead {
        self.inner
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Returns the reason phrase from the status line, which may be empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if the response forbids a body regardless of its framing headers.
    ///
    /// Returns true for:
    /// - 1xx informational responses
    /// - 204 No Content
    /// - 304 Not Modified
    pub fn is_bodyless_status(&self) -> bool {
        let status = self.status();
        status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    }

    /// Returns whether the peer allows the connection to be reused after this response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is present,
    /// HTTP/1.0 requires an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers().get_all(header::CONNECTION).iter().any(|value| {
                value.to_str().is_ok_and(|value| value.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
            })
        };

        match self.version() {
            Version::HTTP_11 => !has_token("close"),
            _ => has_token("keep-alive"),
        }
    }
}
