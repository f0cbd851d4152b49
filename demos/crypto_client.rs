//! Connects to a public `wss://` market-data feed and prints every text
//! message received, trusting the standard Mozilla root set via
//! `webpki-roots`.

use fluxsocket::client;
use fluxsocket::config::ClientConfig;
use fluxsocket::message::MessageType;
use log::*;
use std::sync::Arc;

fn default_tls_config() -> ClientConfig {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    ClientConfig {
        tls_config: Some(Arc::new(tls_config)),
        ..Default::default()
    }
}

async fn handle_connection(addr: &str) {
    let config = default_tls_config();
    match client::connect(addr, &config).await {
        Ok(mut connection) => {
            let mut buf = vec![0u8; 65536];
            loop {
                match connection.receive(&mut buf).await {
                    Ok(received) if received.message_type == MessageType::Text => {
                        info!(
                            "received message: {}",
                            String::from_utf8_lossy(&buf[..received.bytes])
                        );
                    }
                    Ok(received) if received.message_type == MessageType::Close => break,
                    Ok(_) => {}
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
    handle_connection("wss://api.gemini.com/v1/marketdata/BTCUSD").await;
}
