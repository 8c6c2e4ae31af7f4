//! An asynchronous micro HTTP/1.1 client transport
//!
//! This crate provides the plumbing under an HTTP client: a bounded connection
//! pool, direct and proxied connections with optional TLS, staged timeouts and
//! the request/response exchange over a pooled connection. It is built on top
//! of tokio and reuses connections whose previous response was fully read.
//!
//! # Features
//!
//! - HTTP/1.1 requests with `Content-Length` bodies
//! - Fixed length, chunked (with trailers) and close-delimited response bodies
//! - `Set-Cookie` parsing from headers and trailers
//! - Keep-alive connection reuse, bounded globally and per destination
//! - TLS through rustls, HTTP `CONNECT` and SOCKS5 proxies
//! - Separate connect, read, write and pool wait budgets with a total fallback
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use http::{HeaderMap, Method};
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use micro_http_client::connection::{HttpConnection, TlsContext};
//! use micro_http_client::pool::Connector;
//! use micro_http_client::protocol::{HttpError, make_request};
//! use micro_http_client::timeout::Timeout;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HttpError> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let connector = Connector::new(100, 10);
//!     let timeout = Timeout::uniform(Duration::from_secs(10)).with_pool(Duration::from_secs(1));
//!     let tls = TlsContext::with_webpki_roots()?;
//!
//!     let connection = connector.acquire("example.com", 443, Some(tls), timeout, None).await?;
//!     let request = make_request(Method::GET, "https://example.com/", HeaderMap::new(), None)?;
//!
//!     let mut response = HttpConnection::new(connector.clone(), connection).write_request_read_response(request).await?;
//!     let body = response.read().await?;
//!     info!(status = response.status_code(), len = body.len(), "received response");
//!
//!     connector.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`timeout`]: Per phase budgets and how they fall back to the total budget
//! - [`pool`]: The [`pool::Connector`] handing out connections under its limits
//! - [`connection`]: Connections, proxy tunnels, TLS and the HTTP exchange
//! - [`codec`]: Protocol encoding/decoding implementation
//! - [`protocol`]: Protocol types, cookies and errors
//!
//! # Core Components
//!
//! ## Connection Pooling
//!
//! [`pool::Connector::acquire`] reuses an idle connection of the same
//! destination, host, port, TLS and proxy, or opens a new one once a global and
//! a per destination slot are free. A connection goes back to the idle set
//! only through [`pool::Connector::release`] after its response was fully
//! read; a dropped connection is discarded and its slots are freed.
//!
//! ## Exchange
//!
//! [`connection::HttpConnection`] writes one request and reads the response
//! head. The [`connection::Response`] it returns owns the connection until
//! [`connection::Response::read`] drained the body.
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ConnectionError`]: Pool, connect, TLS, proxy and timeout errors
//! - [`protocol::ParseError`]: Response parsing errors
//! - [`protocol::SendError`]: Request serialization errors
//!
//! # Limitations
//!
//! - HTTP/1.1 only (currently HTTP/2 or HTTP/3 is not supported)
//! - No chunked request bodies, no redirects, no authentication
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod timeout;

mod utils;
pub(crate) use utils::ensure;
