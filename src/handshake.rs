//! The server and client sides of the RFC 6455 §4 HTTP/1.1 upgrade
//! handshake, per `spec.md` §4.5.

use crate::config::{ClientConfig, ServerConfig};
use crate::error::Error;
use crate::extensions::{add_extension_headers, answer_extensions, extensions_from_headers, Extensions};
use crate::http::{self, HandshakeRequest, HandshakeResponse, HeaderMap};
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

const MIN_SUPPORTED_VERSION: u32 = 13;

/// Everything negotiated during the handshake that the connection needs
/// afterward: which subprotocol (if any) was chosen, and how
/// `permessage-deflate` (if any) was negotiated.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub subprotocol: Option<String>,
    pub extensions: Option<Extensions>,
}

fn require_upgrade_headers(headers: &HeaderMap) -> Result<(), Error> {
    if !headers.contains_token("Upgrade", "websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }
    if !headers.contains_token("Connection", "Upgrade") {
        return Err(Error::NoConnectionHeaderPresent);
    }
    Ok(())
}

/// Picks the first subprotocol the client offered (in the order it sent
/// them) that this server also supports.
fn choose_subprotocol(request: &HandshakeRequest, config: &ServerConfig) -> Option<String> {
    if config.websocket_config.supported_subprotocols.is_empty() {
        return None;
    }
    request
        .headers
        .get_all("Sec-WebSocket-Protocol")
        .iter()
        .flat_map(|value| value.split(','))
        .map(|candidate| candidate.trim())
        .find(|candidate| {
            config
                .websocket_config
                .supported_subprotocols
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(candidate))
        })
        .map(|candidate| candidate.to_string())
}

/// Reads the upgrade request off `stream`, validates it, and writes back
/// the 101 response (or an error response, if validation failed and the
/// transport is still usable enough to report it).
pub async fn accept<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    config: &ServerConfig,
    idle_timeout: Option<Duration>,
) -> Result<(HandshakeRequest, HandshakeOutcome), Error> {
    let request = http::read_request(stream, idle_timeout).await?;
    require_upgrade_headers(&request.headers)?;

    let key = request
        .headers
        .get("Sec-WebSocket-Key")
        .filter(|k| !k.is_empty())
        .ok_or(Error::KeyMissing)?
        .to_string();

    let version = request
        .headers
        .get("Sec-WebSocket-Version")
        .and_then(|v| v.trim().parse::<u32>().ok());
    match version {
        Some(v) if v >= MIN_SUPPORTED_VERSION => {}
        _ => {
            return Err(Error::VersionNotSupported {
                version: request
                    .headers
                    .get("Sec-WebSocket-Version")
                    .unwrap_or("")
                    .to_string(),
            })
        }
    }

    let subprotocol = choose_subprotocol(&request, config);

    let offer = extensions_from_headers(&request.headers)?;
    let deflate = &config.websocket_config.per_message_deflate;
    let extensions = answer_extensions(
        offer.as_ref(),
        deflate.enabled,
        deflate.client_context_takeover,
        deflate.server_context_takeover,
    )?;

    let mut headers = HeaderMap::new();
    headers.set("Upgrade", "websocket");
    headers.set("Connection", "Upgrade");
    headers.set("Sec-WebSocket-Accept", generate_websocket_accept_value(&key));
    if let Some(subprotocol) = &subprotocol {
        headers.set("Sec-WebSocket-Protocol", subprotocol.clone());
    }
    add_extension_headers(&mut headers, extensions.as_ref());

    let response = HandshakeResponse {
        status_code: 101,
        reason: "Switching Protocols".to_string(),
        version: 1,
        headers,
        body: None,
    };
    http::write_response(stream, &response).await?;

    Ok((request, HandshakeOutcome { subprotocol, extensions }))
}

/// Sends the upgrade request for `path`/`host` and validates the server's
/// response.
pub async fn connect<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    host: &str,
    path: &str,
    config: &ClientConfig,
) -> Result<HandshakeOutcome, Error> {
    let key = generate_websocket_key();

    let mut headers = HeaderMap::new();
    headers.set("Host", host);
    headers.set("Upgrade", "websocket");
    headers.set("Connection", "Upgrade");
    headers.set("Sec-WebSocket-Key", key.clone());
    headers.set("Sec-WebSocket-Version", MIN_SUPPORTED_VERSION.to_string());
    for (name, value) in &config.additional_headers {
        headers.append(name, value.clone());
    }
    if !config.sec_websocket_protocol.is_empty() {
        headers.set("Sec-WebSocket-Protocol", config.sec_websocket_protocol.join(", "));
    }

    let offer = if config.websocket_config.per_message_deflate.enabled {
        Some(Extensions {
            permessage_deflate: true,
            client_no_context_takeover: matches!(
                config.websocket_config.per_message_deflate.client_context_takeover,
                crate::extensions::ContextTakeoverPolicy::ForceDisabled
            ),
            server_no_context_takeover: matches!(
                config.websocket_config.per_message_deflate.server_context_takeover,
                crate::extensions::ContextTakeoverPolicy::ForceDisabled
            ),
            client_max_window_bits: None,
            server_max_window_bits: None,
        })
    } else {
        None
    };
    add_extension_headers(&mut headers, offer.as_ref());

    let request = HandshakeRequest {
        method: "GET".to_string(),
        path: path.to_string(),
        version: 1,
        headers,
        body: None,
    };
    http::write_request(stream, &request).await?;

    let response = http::read_response(stream, None).await?;

    let fail = |detail: &str, response: &HandshakeResponse| Error::HandshakeFailed {
        response_code: response.status_code,
        response_headers: Box::new(response.clone()),
        detail: detail.to_string(),
    };

    if response.status_code != 101 {
        return Err(fail("expected status 101 Switching Protocols", &response));
    }
    if !response.headers.contains_token("Upgrade", "websocket") {
        return Err(fail("missing Upgrade: websocket", &response));
    }
    if !response.headers.contains_token("Connection", "Upgrade") {
        return Err(fail("missing Connection: Upgrade", &response));
    }
    let expected_accept = generate_websocket_accept_value(&key);
    match response.headers.get("Sec-WebSocket-Accept") {
        Some(accept) if accept == expected_accept => {}
        _ => return Err(fail("Sec-WebSocket-Accept did not match the sent key", &response)),
    }

    let subprotocol = response.headers.get("Sec-WebSocket-Protocol").map(|s| s.to_string());
    let extensions = extensions_from_headers(&response.headers)?;

    Ok(HandshakeOutcome { subprotocol, extensions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerMessageDeflateConfig;

    struct Loopback {
        inbound: std::io::Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl AsyncRead for Loopback {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.inbound).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Loopback {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.outbound).poll_write(cx, buf)
        }
        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.outbound).poll_flush(cx)
        }
        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.outbound).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn accept_known_key_produces_rfc_vector_accept_value() {
        let raw = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let mut stream = Loopback {
            inbound: std::io::Cursor::new(raw.to_vec()),
            outbound: Vec::new(),
        };
        let config = ServerConfig::default();
        let (_, outcome) = accept(&mut stream, &config, None).await.unwrap();
        assert!(outcome.subprotocol.is_none());
        let response = String::from_utf8(stream.outbound).unwrap();
        assert!(response.contains("101 Switching Protocols"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[tokio::test]
    async fn accept_rejects_missing_key() {
        let raw = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let mut stream = Loopback {
            inbound: std::io::Cursor::new(raw.to_vec()),
            outbound: Vec::new(),
        };
        let config = ServerConfig::default();
        let err = accept(&mut stream, &config, None).await.unwrap_err();
        assert!(matches!(err, Error::KeyMissing));
    }

    #[tokio::test]
    async fn accept_rejects_old_version() {
        let raw = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n";
        let mut stream = Loopback {
            inbound: std::io::Cursor::new(raw.to_vec()),
            outbound: Vec::new(),
        };
        let config = ServerConfig::default();
        let err = accept(&mut stream, &config, None).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotSupported { .. }));
    }

    #[tokio::test]
    async fn accept_negotiates_deflate_with_force_disabled_policy() {
        let raw = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Extensions: permessage-deflate\r\n\r\n";
        let mut stream = Loopback {
            inbound: std::io::Cursor::new(raw.to_vec()),
            outbound: Vec::new(),
        };
        let mut config = ServerConfig::default();
        config.websocket_config.per_message_deflate = PerMessageDeflateConfig {
            enabled: true,
            server_context_takeover: crate::extensions::ContextTakeoverPolicy::ForceDisabled,
            client_context_takeover: crate::extensions::ContextTakeoverPolicy::Allow,
        };
        let (_, outcome) = accept(&mut stream, &config, None).await.unwrap();
        let extensions = outcome.extensions.unwrap();
        assert!(extensions.server_no_context_takeover);
    }

    #[tokio::test]
    async fn connect_then_accept_round_trips_successfully() {
        let (mut client_side, mut server_side) = tokio::io::duplex(4096);
        let client_config = ClientConfig::default();
        let server_config = ServerConfig::default();

        let (client_result, server_result) = tokio::join!(
            connect(&mut client_side, "example.com", "/chat", &client_config),
            accept(&mut server_side, &server_config, None)
        );

        let client_outcome = client_result.unwrap();
        let (request, server_outcome) = server_result.unwrap();

        assert_eq!(request.path, "/chat");
        assert!(client_outcome.subprotocol.is_none());
        assert!(server_outcome.subprotocol.is_none());
    }
}
