//! Plain-TCP echo server: accepts the handshake on each socket directly,
//! then loops `receive`/`send` back whatever arrived unchanged.

use fluxsocket::config::ServerConfig;
use fluxsocket::connection::accept_async;
use fluxsocket::message::MessageType;
use log::*;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

async fn handle_connection(peer: SocketAddr, stream: TcpStream) {
    let config = ServerConfig::default();
    let mut connection = match accept_async(stream, &config).await {
        Ok(connection) => connection,
        Err(err) => {
            error!("handshake with {} failed: {}", peer, err);
            return;
        }
    };

    let mut buf = vec![0u8; 8192];
    loop {
        match connection.receive(&mut buf).await {
            Ok(received) if received.message_type == MessageType::Close => {
                info!("{} closed the connection", peer);
                break;
            }
            Ok(received) => {
                if connection
                    .send(&buf[..received.bytes], received.message_type, received.end_of_message)
                    .await
                    .is_err()
                {
                    error!("failed to echo message back to {}", peer);
                    break;
                }
            }
            Err(e) => {
                error!("received error from {}: {}", peer, e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:9002";
    let listener = TcpListener::bind(&addr).await.expect("can't listen");
    info!("listening on: {}", addr);

    while let Ok((stream, peer)) = listener.accept().await {
        info!("peer address: {}", peer);
        tokio::spawn(handle_connection(peer, stream));
    }
}
