//! The ambient client dialer: parses a `ws://`/`wss://` URL, opens the TCP
//! socket (wrapping it in TLS for `wss://`), and completes the handshake.
//! Like `server.rs`, this is a convenience layer over
//! `connection::connect_async` — a caller already holding a stream (e.g. a
//! Unix socket, or a stream obtained some other way) can call
//! `connect_async` directly instead.

use crate::config::ClientConfig;
use crate::connection::{connect_async, Connection};
use crate::error::Error;
use crate::stream::WebSocketStream;
use pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

/// Dials `url` (`ws://host[:port]/path` or `wss://host[:port]/path`) and
/// completes the WebSocket handshake, using `config.tls_config` for the
/// `wss://` case.
pub async fn connect(url: &str, config: &ClientConfig) -> Result<Connection<WebSocketStream>, Error> {
    let parsed = Url::parse(url)?;
    let use_tls = match parsed.scheme() {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidSchemeURL),
    };

    let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
    let port = parsed
        .port_or_known_default()
        .unwrap_or(if use_tls { 443 } else { 80 });

    let mut path = parsed.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }

    let tcp = TcpStream::connect((host.as_str(), port)).await?;

    let stream = if use_tls {
        let tls_config = config
            .tls_config
            .clone()
            .ok_or_else(|| Error::SchemeAgainstTlsConfig(false, "wss://".to_string()))?;
        let connector = TlsConnector::from(tls_config);
        let server_name = ServerName::try_from(host.clone())?;
        let tls_stream = connector.connect(server_name, tcp).await?;
        WebSocketStream::TlsClient(Box::new(tls_stream))
    } else {
        WebSocketStream::Plain(tcp)
    };

    connect_async(stream, &host, &path, config).await
}
