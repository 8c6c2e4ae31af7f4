//! HTTP request handling for the client side.
//!
//! A [`Request`] wraps `http::Request<Option<Bytes>>`: method, target url, an
//! ordered case-insensitive header multimap and an optional body that is sent
//! with a `Content-Length` framing.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use crate::protocol::SendError;

/// Type alias for the head of an outgoing request, the body is written separately.
pub type RequestHead = http::Request<()>;

/// An outgoing HTTP/1.1 request.
#[derive(Debug, Clone)]
pub struct Request {
    inner: http::Request<Option<Bytes>>,
}

/// Builds a [`Request`] from its parts.
///
/// The url is parsed with `http::Uri`; both absolute urls (`http://example/path`)
/// and origin-form targets (`/path?query`) are accepted.
///
/// # Errors
///
/// Returns [`SendError::InvalidUri`] if `url` can't be parsed.
pub fn make_request(method: Method, url: &str, headers: HeaderMap, body: Option<Bytes>) -> Result<Request, SendError> {
    let uri = Uri::try_from(url).map_err(SendError::invalid_uri)?;

    let mut inner = http::Request::new(body);
    *inner.method_mut() = method;
    *inner.uri_mut() = uri;
    *inner.version_mut() = Version::HTTP_11;
    *inner.headers_mut() = headers;

    Ok(Request { inner })
}

impl Request {
    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Returns the request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.inner.body().as_ref()
    }

    /// Splits the request into the head to encode and the body to send after it.
    pub fn into_parts(self) -> (RequestHead, Option<Bytes>) {
        let (parts, body) = self.inner.into_parts();
        (RequestHead::from_parts(parts, ()), body)
    }

    /// Consumes the request and returns the inner `http::Request`.
    pub fn into_inner(self) -> http::Request<Option<Bytes>> {
        self.inner
    }
}

impl From<http::Request<Option<Bytes>>> for Request {
    #[inline]
    fn from(inner: http::Request<Option<Bytes>>) -> Self {
        Self { inner }
    }
}

impl From<http::Request<Bytes>> for Request {
    #[inline]
    fn from(request: http::Request<Bytes>) -> Self {
        Self { inner: request.map(Some) }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn make_get_request() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, HeaderValue::from_static("example"));

        let request = make_request(Method::GET, "/", headers, None).unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.uri().path(), "/");
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.headers().get("host"), Some(&HeaderValue::from_static("example")));
        assert!(request.body().is_none());
    }

    #[test]
    fn make_request_keeps_duplicate_headers_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("X-Trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));

        let request = make_request(Method::POST, "http://example:8080/upload?x=1", headers, Some(Bytes::from_static(b"hi"))).unwrap();

        let values: Vec<_> = request.headers().get_all("X-TRACE").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("a"), &HeaderValue::from_static("b")]);
        assert_eq!(request.uri().host(), Some("example"));
        assert_eq!(request.uri().port_u16(), Some(8080));
        assert_eq!(request.body(), Some(&Bytes::from_static(b"hi")));

        let (head, body) = request.into_parts();
        assert_eq!(head.method(), &Method::POST);
        assert_eq!(body, Some(Bytes::from_static(b"hi")));
    }

    #[test]
    fn make_request_rejects_invalid_url() {
        let result = make_request(Method::GET, "http://exa mple/", HeaderMap::new(), None);
        assert!(matches!(result, Err(SendError::InvalidUri { .. })));
    }
}
