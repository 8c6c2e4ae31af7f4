use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::connection::stream::MaybeTlsStream;
use crate::connection::{ConnectionId, ConnectionKey, Proxy, TlsContext};
use crate::pool::Lease;
use crate::protocol::ConnectionError;
use crate::timeout::{Phase, Timeout};

/// Initial capacity of the read buffer, and the minimum free space kept before each read
const READ_BUF_SIZE: usize = 8 * 1024;

/// How a connection reaches its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy(Proxy),
}

impl Route {
    pub fn proxy(&self) -> Option<&Proxy> {
        match self {
            Route::Direct => None,
            Route::Proxy(proxy) => Some(proxy),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    TcpConnected,
    TlsConnected,
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Exchange {
    Idle,
    InFlight,
}

/// One socket to one origin, either direct or tunnelled through a proxy.
///
/// Every suspension point is bounded by the [`Timeout`] budget of its phase.
/// A connection that hits an I/O error or a timeout closes itself, and every
/// operation on a closed connection fails with [`ConnectionError::Configuration`].
///
/// Dropping a connection closes its socket. A connection handed out by a
/// [`Connector`](crate::pool::Connector) also gives its pool slots back when
/// dropped, without ever returning to the idle set.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    host: String,
    port: u16,
    route: Route,
    tls: Option<TlsContext>,
    timeout: Timeout,
    key: ConnectionKey,
    state: ConnectionState,
    stream: Option<MaybeTlsStream>,
    read_buf: BytesMut,
    exchange: Exchange,
    keep_alive: bool,
    lease: Option<Lease>,
}

impl Connection {
    /// A connection straight to `host:port`, upgraded to TLS iff `tls` is present.
    pub fn direct(host: impl Into<String>, port: u16, tls: Option<TlsContext>, timeout: Timeout) -> Self {
        Self::with_route(host.into(), port, Route::Direct, tls, timeout)
    }

    /// A connection to `host:port` tunnelled through the proxy at `proxy_url`.
    ///
    /// # Errors
    ///
    /// Fails with [`ConnectionError::InvalidProxy`] before any socket is opened
    /// if the url is malformed or its scheme isn't supported.
    pub fn proxy(
        host: impl Into<String>,
        port: u16,
        proxy_url: &str,
        tls: Option<TlsContext>,
        timeout: Timeout,
    ) -> Result<Self, ConnectionError> {
        let proxy = Proxy::parse(proxy_url)?;
        Ok(Self::with_route(host.into(), port, Route::Proxy(proxy), tls, timeout))
    }

    pub(crate) fn with_route(host: String, port: u16, route: Route, tls: Option<TlsContext>, timeout: Timeout) -> Self {
        let key = ConnectionKey::new(&host, port, tls.is_some(), route.proxy().cloned());

        Self {
            id: ConnectionId::next(),
            host,
            port,
            route,
            tls,
            timeout,
            key,
            state: ConnectionState::Unconnected,
            stream: None,
            read_buf: BytesMut::with_capacity(READ_BUF_SIZE),
            exchange: Exchange::Idle,
            keep_alive: true,
            lease: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn timeout(&self) -> &Timeout {
        &self.timeout
    }

    /// Budgets apply from the next suspension point on.
    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    /// Opens the TCP socket, to the proxy when there is one, and negotiates the
    /// proxy tunnel, all within the connect budget.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Configuration`] if the connection is not unconnected
    /// - [`ConnectionError::ConnectionTimeout`] if the connect budget runs out
    /// - [`ConnectionError::ConnectionOs`] if the socket can't be opened or the tunnel is refused
    pub async fn connect_tcp(&mut self) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Unconnected {
            return Err(ConnectionError::configuration(format!("connection {} is already {:?}", self.id, self.state)));
        }

        let (addr_host, addr_port) = match &self.route {
            Route::Direct => (self.host.as_str(), self.port),
            Route::Proxy(proxy) => (proxy.host(), proxy.port()),
        };
        trace!(id = %self.id, host = addr_host, port = addr_port, "connecting");

        let connect = async {
            let mut stream = TcpStream::connect((addr_host, addr_port)).await?;
            stream.set_nodelay(true)?;
            if let Route::Proxy(proxy) = &self.route {
                proxy.tunnel(&mut stream, &self.host, self.port).await?;
            }
            Ok::<_, io::Error>(stream)
        };

        match self.timeout.run(Phase::Connect, connect).await {
            Ok(Ok(stream)) => {
                debug!(id = %self.id, key = %self.key, "tcp connected");
                self.stream = Some(MaybeTlsStream::from(stream));
                self.state = ConnectionState::TcpConnected;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(id = %self.id, host = %self.host, port = self.port, cause = %e, "connect failed");
                self.close();
                Err(ConnectionError::os(e))
            }
            Err(_elapsed) => {
                warn!(id = %self.id, host = %self.host, port = self.port, "connect timed out");
                self.close();
                Err(ConnectionError::connection_timeout(&self.host, self.port))
            }
        }
    }

    /// Runs the TLS handshake over the established TCP stream (or proxy tunnel)
    /// within the connect budget.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Configuration`] without a TLS context, before
    ///   [`connect_tcp`](Self::connect_tcp), or once already upgraded
    /// - [`ConnectionError::ConnectionTimeout`] if the connect budget runs out
    /// - [`ConnectionError::ConnectionTls`] if the handshake or certificate check fails
    pub async fn connect_tls(&mut self) -> Result<(), ConnectionError> {
        let Some(tls) = self.tls.clone() else {
            return Err(ConnectionError::configuration(format!("connection {} has no tls context", self.id)));
        };

        let stream = match (self.state, self.stream.take()) {
            (ConnectionState::TcpConnected, Some(MaybeTlsStream::Tcp { stream })) => stream,
            (state, stream) => {
                self.stream = stream;
                return Err(ConnectionError::configuration(format!("can't start tls on connection {} in state {state:?}", self.id)));
            }
        };

        match self.timeout.run(Phase::Connect, tls.handshake(&self.host, stream)).await {
            Ok(Ok(stream)) => {
                debug!(id = %self.id, key = %self.key, "tls connected");
                self.stream = Some(MaybeTlsStream::from(stream));
                self.state = ConnectionState::TlsConnected;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(id = %self.id, host = %self.host, cause = %e, "tls handshake failed");
                self.close();
                Err(ConnectionError::tls(e))
            }
            Err(_elapsed) => {
                warn!(id = %self.id, host = %self.host, "tls handshake timed out");
                self.close();
                Err(ConnectionError::connection_timeout(&self.host, self.port))
            }
        }
    }

    /// [`connect_tcp`](Self::connect_tcp), followed by [`connect_tls`](Self::connect_tls)
    /// when a TLS context is present.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connect_tcp().await?;
        if self.tls.is_some() {
            self.connect_tls().await?;
        }
        Ok(())
    }

    /// Returns up to `max` bytes, or an empty buffer once the peer closed the stream.
    pub async fn recv(&mut self, max: usize) -> Result<Bytes, ConnectionError> {
        if self.is_closed() {
            return Err(closed_error(self.id));
        }
        if max == 0 {
            return Ok(Bytes::new());
        }
        if self.read_buf.is_empty() {
            self.fill_buf().await?;
        }

        let len = max.min(self.read_buf.len());
        Ok(self.read_buf.split_to(len).freeze())
    }

    /// Returns exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// A stream that ends first fails with [`ConnectionError::ConnectionOs`]
    /// of kind [`io::ErrorKind::UnexpectedEof`] and closes the connection.
    pub async fn recv_exactly(&mut self, len: usize) -> Result<Bytes, ConnectionError> {
        if self.is_closed() {
            return Err(closed_error(self.id));
        }
        while self.read_buf.len() < len {
            if self.fill_buf().await? == 0 {
                let received = self.read_buf.len();
                self.close();
                return Err(ConnectionError::os(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed after {received} of {len} bytes"),
                )));
            }
        }

        Ok(self.read_buf.split_to(len).freeze())
    }

    /// Writes all of `data` and flushes it within the write budget.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(closed_error(self.id));
        };

        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };

        match self.timeout.run(Phase::Write, write).await {
            Ok(Ok(())) => {
                trace!(id = %self.id, len = data.len(), "sent bytes");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(id = %self.id, cause = %e, "write failed");
                self.close();
                Err(ConnectionError::os(e))
            }
            Err(_elapsed) => {
                warn!(id = %self.id, "write timed out");
                self.close();
                Err(ConnectionError::WriteTimeout)
            }
        }
    }

    /// Drops the socket. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        trace!(id = %self.id, key = %self.key, "closing connection");
        self.stream = None;
        self.state = ConnectionState::Closed;
        self.read_buf.clear();
        self.keep_alive = false;
    }

    /// Reads once from the socket into the read buffer within the read budget,
    /// returning the number of bytes read (`0` at end of stream).
    pub(crate) async fn fill_buf(&mut self) -> Result<usize, ConnectionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(closed_error(self.id));
        };

        if self.read_buf.capacity() - self.read_buf.len() < READ_BUF_SIZE / 2 {
            self.read_buf.reserve(READ_BUF_SIZE);
        }

        match self.timeout.run(Phase::Read, stream.read_buf(&mut self.read_buf)).await {
            Ok(Ok(n)) => {
                trace!(id = %self.id, len = n, "read bytes");
                Ok(n)
            }
            Ok(Err(e)) => {
                warn!(id = %self.id, cause = %e, "read failed");
                self.close();
                Err(ConnectionError::os(e))
            }
            Err(_elapsed) => {
                warn!(id = %self.id, "read timed out");
                self.close();
                Err(ConnectionError::ReadTimeout)
            }
        }
    }

    pub(crate) fn read_buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.read_buf
    }

    pub(crate) fn begin_exchange(&mut self) {
        self.exchange = Exchange::InFlight;
    }

    /// Marks the current response as fully read; `keep_alive` tells whether
    /// the server allows another exchange on this socket.
    pub(crate) fn finish_exchange(&mut self, keep_alive: bool) {
        self.exchange = Exchange::Idle;
        self.keep_alive &= keep_alive;
    }

    /// A connection may go back to the idle set only if it is open, its last
    /// response was read to the end with nothing left over, and the server
    /// didn't ask to close it.
    pub(crate) fn is_reusable(&self) -> bool {
        !self.is_closed() && self.exchange == Exchange::Idle && self.read_buf.is_empty() && self.keep_alive
    }

    pub(crate) fn attach_lease(&mut self, lease: Lease) {
        self.lease = Some(lease);
    }

    pub(crate) fn take_lease(&mut self) -> Option<Lease> {
        self.lease.take()
    }

    #[cfg(test)]
    pub(crate) fn stream_is_tls(&self) -> bool {
        self.stream.as_ref().is_some_and(MaybeTlsStream::is_tls)
    }
}

fn closed_error(id: ConnectionId) -> ConnectionError {
    ConnectionError::configuration(format!("connection {id} is closed"))
}
