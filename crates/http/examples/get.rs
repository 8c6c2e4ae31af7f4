//! Fetches a url and prints the status, cookies and body size.
//!
//! ```text
//! cargo run --example get -- https://example.com/ [http://proxy:3128]
//! ```

use std::time::Duration;

use http::{HeaderMap, Method, Uri};
use micro_http_client::connection::{HttpConnection, TlsContext};
use micro_http_client::pool::Connector;
use micro_http_client::protocol::{HttpError, SendError, make_request};
use micro_http_client::timeout::Timeout;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "http://example.com/".to_owned());
    let proxy = args.next();

    if let Err(e) = fetch(&url, proxy.as_deref()).await {
        error!(cause = %e, %url, "request failed");
    }
}

async fn fetch(url: &str, proxy: Option<&str>) -> Result<(), HttpError> {
    let uri: Uri = url.parse().map_err(SendError::invalid_uri)?;
    let host = uri.host().ok_or_else(|| SendError::invalid_uri("url needs a host"))?;
    let https = uri.scheme_str() == Some("https");
    let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
    let tls = if https { Some(TlsContext::with_webpki_roots()?) } else { None };

    let connector = Connector::new(10, 2);
    let timeout = Timeout::uniform(Duration::from_secs(10)).with_pool(Duration::from_secs(1));

    // the second round trip reuses the first connection
    for _ in 0..2 {
        let connection = connector.acquire(host, port, tls.clone(), timeout, proxy).await?;
        info!(id = %connection.id(), key = %connection.key(), "acquired connection");

        let request = make_request(Method::GET, url, HeaderMap::new(), None)?;
        let mut response = HttpConnection::new(connector.clone(), connection).write_request_read_response(request).await?;
        let body = response.read().await?;

        info!(status = response.status_code(), reason = response.reason(), chunked = response.is_chunked(), len = body.len(), "received response");
        for cookie in response.cookies() {
            info!(name = cookie.name(), value = cookie.value(), "cookie");
        }
    }

    connector.close().await;
    Ok(())
}
