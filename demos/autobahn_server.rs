//! Echo server for the Autobahn Testsuite, with `permessage-deflate`
//! forced on so the fuzzing client's compressed cases get exercised too.

use fluxsocket::config::{PerMessageDeflateConfig, ServerConfig, WebSocketConfig};
use fluxsocket::connection::accept_async;
use fluxsocket::message::MessageType;
use log::*;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

fn get_config() -> ServerConfig {
    ServerConfig {
        websocket_config: WebSocketConfig {
            per_message_deflate: PerMessageDeflateConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        tls_config: None,
    }
}

async fn handle_connection(_: SocketAddr, stream: TcpStream) {
    let config = get_config();

    match accept_async(stream, &config).await {
        Ok(mut connection) => {
            let mut buf = vec![0u8; 16 << 20];
            loop {
                match connection.receive(&mut buf).await {
                    Ok(received) if received.message_type == MessageType::Close => break,
                    Ok(received) => {
                        if connection
                            .send(&buf[..received.bytes], received.message_type, received.end_of_message)
                            .await
                            .is_err()
                        {
                            error!("failed to send message");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("received error from the stream: {}", e);
                        break;
                    }
                }
            }
        }
        Err(err) => error!("error when performing handshake: {}", err),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:9001";
    let listener = TcpListener::bind(&addr).await.expect("can't listen");
    info!("listening on: {}", addr);

    while let Ok((stream, peer)) = listener.accept().await {
        info!("peer address: {}", peer);
        tokio::spawn(handle_connection(peer, stream));
    }
}
