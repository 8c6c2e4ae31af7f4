use bytes::{Bytes, BytesMut};
use http::header::HOST;
use http::HeaderValue;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::connection::{Connection, Response};
use crate::pool::Connector;
use crate::protocol::{
    ConnectionError, HttpError, Message, ParseError, PayloadItem, PayloadSize, Request, RequestHead, ResponseHeader, SendError,
};

/// Initial size of the buffer a request is encoded into
const INIT_REQUEST_SIZE: usize = 4 * 1024;

/// One HTTP/1.1 exchange over a connection acquired from a [`Connector`].
///
/// The exchange consumes the connection: it lives on in the returned
/// [`Response`] until the body was read, then goes back to the connector.
/// Any error on the way discards it.
///
/// ```no_run
/// use std::time::Duration;
/// use http::{HeaderMap, Method};
/// use micro_http_client::connection::HttpConnection;
/// use micro_http_client::pool::Connector;
/// use micro_http_client::protocol::{HttpError, make_request};
/// use micro_http_client::timeout::Timeout;
///
/// # async fn run() -> Result<(), HttpError> {
/// let connector = Connector::default();
/// let connection = connector.acquire("example.com", 80, None, Timeout::uniform(Duration::from_secs(5)), None).await?;
///
/// let request = make_request(Method::GET, "http://example.com/", HeaderMap::new(), None)?;
/// let mut response = HttpConnection::new(connector, connection).write_request_read_response(request).await?;
///
/// let body = response.read().await?;
/// assert!(response.ok());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpConnection {
    connector: Connector,
    connection: Connection,
}

impl HttpConnection {
    pub fn new(connector: Connector, connection: Connection) -> Self {
        Self { connector, connection }
    }

    /// Writes `request` and reads the response up to the end of its head.
    ///
    /// A `Host` header is added when absent, taken from the request url or
    /// else from the connection's destination.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Configuration`] if the connection is already
    ///   closed, without any I/O
    /// - [`SendError`] if the request can't be serialized
    /// - any [`ConnectionError`] of the socket writes and reads
    /// - [`ParseError`] if the response head is malformed
    pub async fn write_request_read_response(self, request: Request) -> Result<Response, HttpError> {
        let Self { connector, mut connection } = self;

        if connection.is_closed() {
            return Err(ConnectionError::configuration(format!("connection {} is closed", connection.id())).into());
        }

        let (mut head, body) = request.into_parts();
        if !head.headers().contains_key(HOST) {
            let host = host_header(&head, &connection)?;
            head.headers_mut().insert(HOST, host);
        }
        let method = head.method().clone();
        trace!(id = %connection.id(), %method, uri = %head.uri(), "sending request");

        let buf = encode_request(head, body)?;
        connection.begin_exchange();
        connection.send_all(&buf).await?;
        trace!(id = %connection.id(), len = buf.len(), "request sent");

        let mut decoder = ResponseDecoder::new(method);
        let (header, payload_size) = read_head(&mut decoder, &mut connection).await?;
        debug!(id = %connection.id(), status = %header.status(), ?payload_size, "received response head");

        Ok(Response::new(header, payload_size, decoder, connection, connector))
    }
}

fn host_header(head: &RequestHead, connection: &Connection) -> Result<HeaderValue, SendError> {
    let host = match head.uri().authority() {
        Some(authority) => authority.as_str().to_owned(),
        None => {
            let default_port = if connection.is_tls() { 443 } else { 80 };
            if connection.port() == default_port {
                connection.host().to_owned()
            } else {
                format!("{}:{}", connection.host(), connection.port())
            }
        }
    };

    HeaderValue::try_from(host).map_err(SendError::invalid_header)
}

fn encode_request(head: RequestHead, body: Option<Bytes>) -> Result<BytesMut, SendError> {
    let payload_size = match &body {
        Some(body) if !body.is_empty() => PayloadSize::Length(body.len() as u64),
        _ => PayloadSize::Empty,
    };

    let mut encoder = RequestEncoder::new();
    let mut buf = BytesMut::with_capacity(INIT_REQUEST_SIZE);

    encoder.encode(Message::<_, Bytes>::Header((head, payload_size)), &mut buf)?;
    if let Some(body) = body {
        encoder.encode(Message::<(RequestHead, PayloadSize), _>::Payload(PayloadItem::Chunk(body)), &mut buf)?;
    }
    encoder.encode(Message::<(RequestHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut buf)?;

    Ok(buf)
}

async fn read_head(
    decoder: &mut ResponseDecoder,
    connection: &mut Connection,
) -> Result<(ResponseHeader, PayloadSize), HttpError> {
    let mut eof = false;
    loop {
        let message = if eof {
            decoder.decode_eof(connection.read_buffer_mut())?
        } else {
            decoder.decode(connection.read_buffer_mut())?
        };

        match message {
            Some(Message::Header(head)) => return Ok(head),
            Some(Message::Payload(_)) => return Err(ParseError::invalid_body("received payload before the response head").into()),
            None if eof => return Err(ParseError::invalid_header("connection closed before the response head").into()),
            None => eof = connection.fill_buf().await? == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::make_request;
    use crate::timeout::Timeout;
    use http::{HeaderMap, Method, StatusCode};
    use indoc::indoc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `response` for every request on a single connection, returning what was received.
    async fn serve_once(response: &'static str) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = vec![0u8; 4096];
            let n = socket.read(&mut received).await.unwrap();
            received.truncate(n);
            socket.write_all(response.replace('\n', "\r\n").as_bytes()).await.unwrap();
            received
        });
        (port, handle)
    }

    fn timeout() -> Timeout {
        Timeout::uniform(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn closed_connection_fails_fast() {
        let connector = Connector::default();
        let mut connection = Connection::direct("127.0.0.1", 1, None, timeout());
        connection.close();

        let request = make_request(Method::GET, "/", HeaderMap::new(), None).unwrap();
        let result = HttpConnection::new(connector, connection).write_request_read_response(request).await;

        assert!(matches!(result, Err(HttpError::ConnectionError { source: ConnectionError::Configuration { .. } })));
    }

    #[tokio::test]
    async fn adds_host_header() {
        let (port, server) = serve_once(indoc! {"
            HTTP/1.1 204 No Content

        "})
        .await;
        let connector = Connector::default();
        let connection = connector.acquire("127.0.0.1", port, None, timeout(), None).await.unwrap();

        let request = make_request(Method::GET, "/index.html", HeaderMap::new(), None).unwrap();
        let response = HttpConnection::new(connector, connection).write_request_read_response(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let received = String::from_utf8(server.await.unwrap()).unwrap();
        assert_eq!(received, format!("GET /index.html HTTP/1.1\r\nhost: 127.0.0.1:{port}\r\n\r\n"));
    }

    #[tokio::test]
    async fn sends_body_with_length() {
        let (port, server) = serve_once(indoc! {"
            HTTP/1.1 201 Created
            Content-Length: 0

        "})
        .await;
        let connector = Connector::default();
        let connection = connector.acquire("127.0.0.1", port, None, timeout(), None).await.unwrap();

        let request = make_request(Method::POST, "http://example/submit", HeaderMap::new(), Some(Bytes::from_static(b"a=1"))).unwrap();
        let response = HttpConnection::new(connector, connection).write_request_read_response(request).await.unwrap();
        assert!(response.ok());

        let received = String::from_utf8(server.await.unwrap()).unwrap();
        assert_eq!(received, "POST /submit HTTP/1.1\r\nhost: example\r\ncontent-length: 3\r\n\r\na=1");
    }

    #[tokio::test]
    async fn truncated_head() {
        let (port, _server) = serve_once("HTTP/1.1 200 OK\nContent-Len").await;
        let connector = Connector::default();
        let connection = connector.acquire("127.0.0.1", port, None, timeout(), None).await.unwrap();

        let request = make_request(Method::GET, "/", HeaderMap::new(), None).unwrap();
        let result = HttpConnection::new(connector.clone(), connection).write_request_read_response(request).await;

        assert!(matches!(result, Err(HttpError::ResponseError { .. })));
        assert_eq!(connector.acquired_count(), 0);
    }

    #[tokio::test]
    async fn malformed_status_line() {
        let (port, _server) = serve_once("SMTP/1.0 200 OK\n\n").await;
        let connector = Connector::default();
        let connection = connector.acquire("127.0.0.1", port, None, timeout(), None).await.unwrap();

        let request = make_request(Method::GET, "/", HeaderMap::new(), None).unwrap();
        let result = HttpConnection::new(connector, connection).write_request_read_response(request).await;

        assert!(matches!(result, Err(HttpError::ResponseError { .. })));
    }
}
