//! TLS configuration handed to connections that need it.

use std::fmt;
use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::protocol::ConnectionError;

/// A shareable TLS client configuration.
///
/// Certificate verification policy is entirely the business of the wrapped
/// [`ClientConfig`]; the connection only drives the handshake.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
}

impl TlsContext {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { connector: TlsConnector::from(config) }
    }

    /// Verifies servers against the Mozilla root store shipped with `webpki-roots`.
    pub fn with_webpki_roots() -> Result<Self, ConnectionError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ConnectionError::tls(io::Error::other(e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self::new(Arc::new(config)))
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        self.connector.config()
    }

    pub(crate) async fn handshake(&self, host: &str, stream: TcpStream) -> io::Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid server name {host}: {e}")))?;

        self.connector.connect(server_name, stream).await
    }
}

impl From<Arc<ClientConfig>> for TlsContext {
    fn from(config: Arc<ClientConfig>) -> Self {
        Self::new(config)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext").field("alpn_protocols", &self.config().alpn_protocols).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webpki_roots_context() {
        let context = TlsContext::with_webpki_roots().unwrap();
        assert!(context.config().alpn_protocols.is_empty());
        assert!(format!("{context:?}").starts_with("TlsContext"));
    }
}
