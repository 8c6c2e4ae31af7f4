use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use indoc::indoc;
use micro_http_client::connection::{Connection, HttpConnection, Response, TlsContext};
use micro_http_client::pool::Connector;
use micro_http_client::protocol::{ConnectionError, HttpError, Request, make_request};
use micro_http_client::timeout::Timeout;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A loopback server answering every request of every connection with `response`.
struct Server {
    port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<std::sync::Mutex<Vec<String>>>,
}

impl Server {
    async fn start(response: impl Into<Bytes>) -> Self {
        let response = response.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(std::sync::Mutex::new(Vec::new()));

        let (accepted_clone, requests_clone) = (accepted.clone(), requests.clone());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                accepted_clone.fetch_add(1, Ordering::SeqCst);
                let (response, requests) = (response.clone(), requests_clone.clone());
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    loop {
                        let n = match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        requests.lock().unwrap().push(String::from_utf8_lossy(&buf[..n]).into_owned());
                        if socket.write_all(&response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self { port, accepted, requests }
    }

    /// A server that accepts and never answers.
    async fn silent() -> Self {
        Self::start(Bytes::new()).await
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn crlf(s: &str) -> Bytes {
    Bytes::from(s.replace('\n', "\r\n"))
}

fn timeout() -> Timeout {
    Timeout::uniform(Duration::from_secs(5))
}

fn get(url: &str) -> Request {
    make_request(Method::GET, url, HeaderMap::new(), None).unwrap()
}

async fn send(connector: &Connector, connection: Connection, request: Request) -> Result<Response, HttpError> {
    HttpConnection::new(connector.clone(), connection).write_request_read_response(request).await
}

#[tokio::test]
async fn end_to_end_get() {
    let server = Server::start(crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Type: text/plain
        Content-Length: 12

        Hello World!"}))
    .await;
    let connector = Connector::default();

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    let mut response = send(&connector, connection, get("/")).await.unwrap();

    assert!(response.ok());
    assert_eq!(response.read().await.unwrap(), Bytes::from_static(b"Hello World!"));
    assert_eq!(server.requests(), vec![format!("GET / HTTP/1.1\r\nhost: 127.0.0.1:{}\r\n\r\n", server.port)]);
}

#[tokio::test]
async fn content_length_body() {
    let server = Server::start(format!("HTTP/1.1 200 OK\r\nContent-Length: 602\r\n\r\n{}", "a".repeat(602))).await;
    let connector = Connector::default();

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    let mut response = send(&connector, connection, get("/")).await.unwrap();

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.read().await.unwrap().len(), 602);
    assert!(response.ok());
    assert_eq!(response.content_length(), Some(602));
}

#[tokio::test]
async fn chunked_body_with_cookie_trailer() {
    let server = Server::start(crlf(indoc! {"
        HTTP/1.1 200 OK
        Transfer-Encoding: chunked

        7
        Mozilla
        9
        Developer
        7
        Network
        0
        Set-Cookie: test=passed

    "}))
    .await;
    let connector = Connector::default();

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    let mut response = send(&connector, connection, get("/")).await.unwrap();
    let body = response.read().await.unwrap();

    assert_eq!(body, Bytes::from_static(b"MozillaDeveloperNetwork"));
    assert!(response.is_chunked());
    assert_eq!(response.content_length(), Some(body.len() as u64));
    assert!(response.trailers().contains_key("set-cookie"));
    assert_eq!(response.cookies()["test"].value(), "passed");
}

#[tokio::test]
async fn refused_port_is_os_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let connector = Connector::default();
    let result = connector.acquire("127.0.0.1", port, None, timeout(), None).await;

    assert!(matches!(result, Err(ConnectionError::ConnectionOs { .. })));
    assert_eq!(connector.acquired_count(), 0);
}

#[tokio::test]
async fn tls_to_plain_server_is_tls_error() {
    let server = Server::start(crlf("HTTP/1.1 400 Bad Request\nContent-Length: 0\n\n")).await;
    let tls = TlsContext::with_webpki_roots().unwrap();

    let mut connection = Connection::direct("localhost", server.port, Some(tls), timeout());
    connection.connect_tcp().await.unwrap();
    let result = connection.connect_tls().await;

    assert!(matches!(result, Err(ConnectionError::ConnectionTls { .. })));
    assert!(connection.is_closed());
}

/// A TLS server for `localhost` with a freshly generated self-signed certificate.
///
/// Returns its port and the certificate, so a client can choose to trust it.
async fn self_signed_server(response: &'static str) -> (u16, rustls::pki_types::CertificateDer<'static>) {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap().self_signed(&key_pair).unwrap();
    let cert_der = cert.der().clone();
    let key_der = rustls::pki_types::PrivateKeyDer::try_from(key_pair.serialize_der()).unwrap();

    let config = rustls::ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = acceptor.accept(socket).await else {
                    return;
                };
                let mut buf = vec![0u8; 4096];
                if matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {
                    let _ = stream.write_all(response.replace('\n', "\r\n").as_bytes()).await;
                    let _ = stream.flush().await;
                }
            });
        }
    });

    (port, cert_der)
}

#[tokio::test]
async fn untrusted_certificate_is_tls_error() {
    let (port, _) = self_signed_server("HTTP/1.1 200 OK\nContent-Length: 0\n\n").await;
    let connector = Connector::default();
    let tls = TlsContext::with_webpki_roots().unwrap();

    let result = connector.acquire("localhost", port, Some(tls), timeout(), None).await;

    assert!(matches!(result, Err(ConnectionError::ConnectionTls { .. })));
    assert_eq!(connector.acquired_count(), 0);
}

#[tokio::test]
async fn trusted_self_signed_certificate() {
    let (port, cert) = self_signed_server("HTTP/1.1 200 OK\nContent-Length: 6\n\nsecret").await;
    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert).unwrap();
    let config = rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let tls = TlsContext::new(Arc::new(config));
    let connector = Connector::default();

    let connection = connector.acquire("localhost", port, Some(tls), timeout(), None).await.unwrap();
    let mut response = send(&connector, connection, get("/")).await.unwrap();

    assert!(response.ok());
    assert_eq!(response.read().await.unwrap(), Bytes::from_static(b"secret"));
}

#[tokio::test]
async fn unsupported_proxy_scheme() {
    let result = Connection::proxy("127.0.0.1", 80, "badprotocol://127.0.0.1:1", None, timeout());
    assert!(matches!(result, Err(ConnectionError::InvalidProxy { .. })));

    let connector = Connector::default();
    let result = connector.acquire("127.0.0.1", 80, None, timeout(), Some("badprotocol://127.0.0.1:1")).await;
    assert!(matches!(result, Err(ConnectionError::InvalidProxy { .. })));
}

#[tokio::test]
async fn zero_read_budget_without_total() {
    let server = Server::silent().await;
    let connector = Connector::default();
    let timeout = timeout().with_read(Duration::ZERO).with_total(Duration::ZERO);

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout, None).await.unwrap();
    let result = send(&connector, connection, get("/")).await;

    assert!(matches!(result, Err(HttpError::ConnectionError { source: ConnectionError::ReadTimeout })));
    assert_eq!(connector.acquired_count(), 0);
}

#[tokio::test]
async fn zero_connect_budget_without_total() {
    let server = Server::silent().await;
    let connector = Connector::default();
    let timeout = timeout().with_connect(Duration::ZERO).with_total(Duration::ZERO);

    let result = connector.acquire("127.0.0.1", server.port, None, timeout, None).await;
    assert!(matches!(result, Err(ConnectionError::ConnectionTimeout { .. })));
}

#[tokio::test]
async fn zero_phase_budgets_fall_back_to_total() {
    let server = Server::start(crlf("HTTP/1.1 204 No Content\n\n")).await;
    let connector = Connector::default();
    let timeout = Timeout::unlimited()
        .with_connect(Duration::ZERO)
        .with_read(Duration::ZERO)
        .with_write(Duration::ZERO)
        .with_total(Duration::from_secs(5));

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout, None).await.unwrap();
    let mut response = send(&connector, connection, get("/")).await.unwrap();
    assert!(response.read().await.unwrap().is_empty());
}

#[tokio::test]
async fn global_limit_bounds_all_destinations() {
    let (first, second) = (Server::silent().await, Server::silent().await);
    let connector = Connector::new(1, 0);
    let pool_wait = timeout().with_pool(Duration::from_millis(50));

    let held = connector.acquire("127.0.0.1", first.port, None, pool_wait, None).await.unwrap();

    let result = connector.acquire("127.0.0.1", first.port, None, pool_wait, None).await;
    assert!(matches!(result, Err(ConnectionError::PoolTimeout)));
    let result = connector.acquire("127.0.0.1", second.port, None, pool_wait, None).await;
    assert!(matches!(result, Err(ConnectionError::PoolTimeout)));

    drop(held);
    let connection = connector.acquire("127.0.0.1", second.port, None, pool_wait, None).await;
    assert!(connection.is_ok());
}

#[tokio::test]
async fn per_destination_limit() {
    let (first, second) = (Server::silent().await, Server::silent().await);
    let connector = Connector::new(0, 1);
    let pool_wait = timeout().with_pool(Duration::from_millis(50));

    let _first = connector.acquire("127.0.0.1", first.port, None, pool_wait, None).await.unwrap();
    let result = connector.acquire("127.0.0.1", first.port, None, pool_wait, None).await;
    assert!(matches!(result, Err(ConnectionError::PoolTimeout)));

    let _second = connector.acquire("127.0.0.1", second.port, None, pool_wait, None).await.unwrap();
    assert_eq!(connector.acquired_count(), 2);
}

#[tokio::test]
async fn drained_connection_is_reused() {
    let server = Server::start(crlf("HTTP/1.1 200 OK\nContent-Length: 2\n\nok")).await;
    let connector = Connector::new(10, 2);

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    let first_id = connection.id();
    let mut response = send(&connector, connection, get("/")).await.unwrap();
    response.read().await.unwrap();

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    assert_eq!(connection.id(), first_id);
    let mut response = send(&connector, connection, get("/again")).await.unwrap();
    assert_eq!(response.read().await.unwrap(), Bytes::from_static(b"ok"));

    assert_eq!(server.accepted(), 1);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn undrained_connection_is_not_reused() {
    let server = Server::start(crlf("HTTP/1.1 200 OK\nContent-Length: 2\n\nok")).await;
    let connector = Connector::new(10, 2);

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    let first_id = connection.id();
    let response = send(&connector, connection, get("/")).await.unwrap();
    drop(response);

    let connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    assert_ne!(connection.id(), first_id);
    assert_eq!(connector.acquired_count(), 1);
}

#[tokio::test]
async fn closed_connection_is_rejected_without_io() {
    let server = Server::silent().await;
    let connector = Connector::default();

    let mut connection = connector.acquire("127.0.0.1", server.port, None, timeout(), None).await.unwrap();
    connection.close();
    let result = send(&connector, connection, get("/")).await;

    assert!(matches!(result, Err(HttpError::ConnectionError { source: ConnectionError::Configuration { .. } })));
    assert!(server.requests().is_empty());
    assert_eq!(connector.acquired_count(), 0);
}
