//! The ambient TCP/TLS accept loop: binds a listener, completes the
//! WebSocket handshake on each incoming socket, and fans every connection's
//! lifecycle out through one `EventStream`. This is deliberately a thin
//! convenience layer over `connection::accept_async` — nothing here is
//! required to use the library, a caller that owns its own listener can
//! call `accept_async` directly on whatever stream it already has.

use crate::config::ServerConfig;
use crate::connection::{accept_async, Connection};
use crate::event::{Event, EventStream, ID};
use crate::message::{Message, MessageType};
use crate::stream::WebSocketStream;
use log::{info, warn};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_rustls::TlsAcceptor;

/// A connection shared between the reader task that drives `receive` and
/// whichever caller wants to `send`/`close` it from the `Event` it was
/// announced on.
pub type ConnectionHandle = Arc<Mutex<Connection<WebSocketStream>>>;

/// Binds `port` on all interfaces and starts accepting WebSocket
/// connections with default configuration.
pub async fn start_server(port: u16) -> Result<EventStream, std::io::Error> {
    start_server_with_config(port, None).await
}

/// Binds `port` and starts accepting WebSocket connections, optionally
/// with TLS (when `config.tls_config` is set) and the rest of
/// `ServerConfig`'s policy.
pub async fn start_server_with_config(
    port: u16,
    config: Option<ServerConfig>,
) -> Result<EventStream, std::io::Error> {
    let config = config.unwrap_or_default();
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {}", port);

    let (tx, rx) = mpsc::channel(128);

    tokio::spawn(async move {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };
            info!("accepted connection from {}", peer);
            tokio::spawn(handle_connection(socket, config.clone(), tx.clone()));
        }
    });

    Ok(EventStream::new(rx))
}

async fn handle_connection(socket: TcpStream, config: ServerConfig, tx: mpsc::Sender<Event>) {
    let stream = match &config.tls_config {
        Some(tls_config) => {
            let acceptor = TlsAcceptor::from(tls_config.clone());
            match acceptor.accept(socket).await {
                Ok(tls_stream) => WebSocketStream::TlsServer(Box::new(tls_stream)),
                Err(e) => {
                    warn!("TLS handshake failed: {}", e);
                    return;
                }
            }
        }
        None => WebSocketStream::Plain(socket),
    };

    let connection = match accept_async(stream, &config).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let id: ID = connection.context.id;
    let handle: ConnectionHandle = Arc::new(Mutex::new(connection));

    if tx.send(Event::NewClient(id, handle.clone())).await.is_err() {
        return;
    }

    read_loop(id, handle, tx).await;
}

async fn read_loop(id: ID, handle: ConnectionHandle, tx: mpsc::Sender<Event>) {
    let mut buf = vec![0u8; 8192];
    let mut message_buffer: Vec<u8> = Vec::new();
    let mut current_type: Option<MessageType> = None;

    loop {
        let result = handle.lock().await.receive(&mut buf).await;

        match result {
            Ok(received) if received.message_type == MessageType::Close => {
                let state = handle.lock().await.state();
                let _ = tx.send(Event::Disconnect(id, state)).await;
                break;
            }
            Ok(received) => {
                message_buffer.extend_from_slice(&buf[..received.bytes]);
                current_type.get_or_insert(received.message_type);

                if received.end_of_message {
                    let message_type = current_type.take().unwrap_or(MessageType::Binary);
                    let bytes = std::mem::take(&mut message_buffer);
                    match Message::from_parts(message_type, bytes) {
                        Ok(message) => {
                            let _ = tx.send(Event::NewMessage(id, message)).await;
                        }
                        Err(e) => {
                            let _ = tx.send(Event::Error(id, e)).await;
                        }
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Event::Error(id, e)).await;
                break;
            }
        }
    }
}
