//! Proxy routes.
//!
//! A proxied connection opens its socket to the proxy and negotiates a tunnel
//! to the origin before any request bytes (or the TLS handshake) are sent:
//!
//! - `http` proxies receive a `CONNECT host:port` request and must answer `2xx`
//! - `socks5` proxies are spoken to without authentication, with the origin
//!   given as a domain name (or an IP literal when the host is one)

use std::fmt;
use std::io;
use std::net::IpAddr;

use bytes::BytesMut;
use http::Uri;
use httparse::Status;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::protocol::ConnectionError;

/// Proxy url schemes a connection knows how to tunnel through.
pub const SUPPORTED_PROXY_SCHEMES: [&str; 2] = ["http", "socks5"];

/// The largest `CONNECT` response head accepted from a proxy
const MAX_TUNNEL_RESPONSE_BYTES: usize = 8 * 1024;

const SOCKS5_VERSION: u8 = 0x05;
const SOCKS5_NO_AUTH: u8 = 0x00;
const SOCKS5_NO_ACCEPTABLE_METHOD: u8 = 0xff;
const SOCKS5_CMD_CONNECT: u8 = 0x01;
const SOCKS5_ATYP_IPV4: u8 = 0x01;
const SOCKS5_ATYP_DOMAIN: u8 = 0x03;
const SOCKS5_ATYP_IPV6: u8 = 0x04;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Socks5 => "socks5",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ProxyScheme::Http => 80,
            ProxyScheme::Socks5 => 1080,
        }
    }
}

/// A parsed proxy url: the identity `(scheme, host, port)` that takes part in
/// the [`ConnectionKey`](crate::connection::ConnectionKey).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    scheme: ProxyScheme,
    host: String,
    port: u16,
}

impl Proxy {
    /// Parses a proxy url such as `http://proxy:3128` or `socks5://127.0.0.1`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidProxy`] if the url is malformed, has no
    /// host, or its scheme is not one of [`SUPPORTED_PROXY_SCHEMES`].
    pub fn parse(url: &str) -> Result<Self, ConnectionError> {
        let uri = url.parse::<Uri>().map_err(|e| ConnectionError::invalid_proxy(format!("{url}: {e}")))?;

        let scheme = match uri.scheme_str().map(str::to_ascii_lowercase).as_deref() {
            Some("http") => ProxyScheme::Http,
            Some("socks5") => ProxyScheme::Socks5,
            Some(other) => {
                return Err(ConnectionError::invalid_proxy(format!(
                    "unsupported scheme {other} in {url}, expected one of {SUPPORTED_PROXY_SCHEMES:?}"
                )));
            }
            None => return Err(ConnectionError::invalid_proxy(format!("missing scheme in {url}"))),
        };

        let host = match uri.host() {
            Some(host) if !host.is_empty() => host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase(),
            _ => return Err(ConnectionError::invalid_proxy(format!("missing host in {url}"))),
        };

        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

        Ok(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Negotiates a tunnel to `host:port` over an established proxy socket.
    ///
    /// A proxy refusing the tunnel is reported as an [`io::Error`].
    pub(crate) async fn tunnel<S>(&self, stream: &mut S, host: &str, port: u16) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(proxy = %self, host, port, "negotiating proxy tunnel");
        match self.scheme {
            ProxyScheme::Http => http_connect(stream, host, port).await,
            ProxyScheme::Socks5 => socks5_connect(stream, host, port).await,
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

async fn http_connect<S>(stream: &mut S, host: &str, port: u16) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let authority = authority(host, port);
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(tunnel_eof());
        }

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&buf) {
            Ok(Status::Complete(head_len)) => {
                let code = response.code.unwrap_or_default();
                if (200..300).contains(&code) {
                    // the origin has nothing to say before we speak, so bytes
                    // past the head can't belong to the tunnel
                    if buf.len() > head_len {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("{} unexpected bytes after proxy response", buf.len() - head_len),
                        ));
                    }
                    return Ok(());
                }
                warn!(code, reason = response.reason.unwrap_or_default(), "proxy refused tunnel");
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, format!("unsuccessful tunnel: status {code}")));
            }
            Ok(Status::Partial) if buf.len() < MAX_TUNNEL_RESPONSE_BYTES => {}
            Ok(Status::Partial) => return Err(io::Error::new(io::ErrorKind::InvalidData, "proxy response head too large")),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("invalid proxy response: {e}"))),
        }
    }
}

async fn socks5_connect<S>(stream: &mut S, host: &str, port: u16) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_VERSION, 1, SOCKS5_NO_AUTH]).await?;
    stream.flush().await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    match reply {
        [SOCKS5_VERSION, SOCKS5_NO_AUTH] => {}
        [SOCKS5_VERSION, SOCKS5_NO_ACCEPTABLE_METHOD] => {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "socks5 proxy requires authentication"));
        }
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid socks5 method reply")),
    }

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(SOCKS5_ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(SOCKS5_ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_e| io::Error::new(io::ErrorKind::InvalidInput, "host name too long for socks5"))?;
            request.push(SOCKS5_ATYP_DOMAIN);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid socks5 reply version"));
    }
    if head[1] != 0x00 {
        warn!(reply = head[1], "socks5 proxy refused tunnel");
        return Err(io::Error::new(io::ErrorKind::ConnectionRefused, socks5_reply_message(head[1])));
    }

    // the bound address is of no use to us, but it has to be consumed
    let addr_len = match head[3] {
        SOCKS5_ATYP_IPV4 => 4,
        SOCKS5_ATYP_IPV6 => 16,
        SOCKS5_ATYP_DOMAIN => usize::from(stream.read_u8().await?),
        atyp => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("invalid socks5 address type {atyp}"))),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    Ok(())
}

fn socks5_reply_message(reply: u8) -> &'static str {
    match reply {
        0x01 => "socks5: general server failure",
        0x02 => "socks5: connection not allowed by ruleset",
        0x03 => "socks5: network unreachable",
        0x04 => "socks5: host unreachable",
        0x05 => "socks5: connection refused",
        0x06 => "socks5: ttl expired",
        0x07 => "socks5: command not supported",
        0x08 => "socks5: address type not supported",
        _ => "socks5: unknown failure",
    }
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') { format!("[{host}]:{port}") } else { format!("{host}:{port}") }
}

fn tunnel_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected eof while tunneling")
}
