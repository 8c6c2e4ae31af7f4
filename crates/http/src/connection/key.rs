use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::connection::Proxy;

/// Opaque identity of a [`Connection`](crate::connection::Connection), unique within the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The destination a connection leads to.
///
/// Two connections are similar, and may stand in for each other in the pool,
/// iff their keys are equal: same origin host and port, same transport mode
/// and same proxy (if any).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    host: String,
    port: u16,
    tls: bool,
    proxy: Option<Proxy>,
}

impl ConnectionKey {
    /// Host names are compared case-insensitively.
    pub fn new(host: &str, port: u16, tls: bool, proxy: Option<Proxy>) -> Self {
        Self { host: host.to_ascii_lowercase(), port, tls, proxy }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {proxy}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = (0..100).map(|_| ConnectionId::next()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn similar_keys() {
        let proxy = Proxy::parse("http://proxy:3128").unwrap();

        assert_eq!(ConnectionKey::new("Example.com", 80, false, None), ConnectionKey::new("example.com", 80, false, None));
        assert_ne!(ConnectionKey::new("example.com", 80, false, None), ConnectionKey::new("example.com", 80, true, None));
        assert_ne!(ConnectionKey::new("example.com", 80, false, None), ConnectionKey::new("example.com", 8080, false, None));
        assert_ne!(
            ConnectionKey::new("example.com", 80, false, None),
            ConnectionKey::new("example.com", 80, false, Some(proxy.clone()))
        );
        assert_eq!(
            ConnectionKey::new("example.com", 80, false, Some(proxy.clone())),
            ConnectionKey::new("example.com", 80, false, Some(proxy))
        );
    }

    #[test]
    fn display_key() {
        let proxy = Proxy::parse("socks5://127.0.0.1").unwrap();
        let key = ConnectionKey::new("example.com", 443, true, Some(proxy));

        assert_eq!(key.to_string(), "https://example.com:443 via socks5://127.0.0.1:1080");
    }
}
