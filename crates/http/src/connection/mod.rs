//! HTTP connection handling module
//!
//! This module provides the client side of a connection: the socket to an
//! origin, the route it takes, and the HTTP/1.1 exchange run over it.
//!
//! # Components
//!
//! - [`Connection`]: One socket to one origin, direct or through a proxy
//!   - Staged connect: TCP, proxy tunnel, TLS handshake
//!   - Reads and writes bounded by the [`Timeout`](crate::timeout::Timeout) budgets
//!   - Closes itself on I/O errors and timeouts
//!
//! - [`ConnectionKey`]: The destination used to find similar connections
//!
//! - [`Proxy`]: A parsed proxy url, `http` (CONNECT) or `socks5`
//!
//! - [`TlsContext`]: The rustls client configuration used for handshakes
//!
//! - [`HttpConnection`]: Writes one request and parses the response head
//!   - [`Response`]: Reads the body, trailers and cookies, then hands the
//!     connection back to its [`Connector`](crate::pool::Connector)

mod conn;
mod http_connection;
mod key;
mod proxy;
mod response;
mod stream;
mod tls;

pub use conn::Connection;
pub use conn::ConnectionState;
pub use conn::Route;
pub use http_connection::HttpConnection;
pub use key::ConnectionId;
pub use key::ConnectionKey;
pub use proxy::Proxy;
pub use proxy::ProxyScheme;
pub use proxy::SUPPORTED_PROXY_SCHEMES;
pub use response::Response;
pub use tls::TlsContext;
