//! `wss://` client trusting a custom CA file, otherwise identical to
//! `client.rs`.

use fluxsocket::client;
use fluxsocket::config::ClientConfig;
use fluxsocket::error::CloseStatus;
use fluxsocket::message::MessageType;
use log::*;
use rand::distr::Alphanumeric;
use rand::{thread_rng, Rng};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

fn client_config_with_ca(ca_file: &str) -> ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    let certs = certs(&mut BufReader::new(File::open(ca_file).expect("can't open CA file")))
        .collect::<Result<Vec<_>, _>>()
        .expect("invalid CA file");
    for cert in certs {
        roots.add(cert).expect("invalid CA certificate");
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    ClientConfig {
        tls_config: Some(Arc::new(tls_config)),
        ..Default::default()
    }
}

async fn handle_connection(addr: &str) {
    let config = client_config_with_ca("ca.crt");

    match client::connect(addr, &config).await {
        Ok(mut connection) => {
            let mut buf = vec![0u8; 4096];

            for round in 0..3 {
                let random_string = generate_random_string();
                if connection
                    .send(random_string.as_bytes(), MessageType::Binary, true)
                    .await
                    .is_err()
                {
                    eprintln!("failed to send message");
                    break;
                }

                match connection.receive(&mut buf).await {
                    Ok(received) if received.message_type != MessageType::Close => {
                        info!(
                            "received message: {}",
                            String::from_utf8_lossy(&buf[..received.bytes])
                        );
                    }
                    Ok(_) => break,
                    Err(err) => {
                        error!("received error from the stream: {}", err);
                        return;
                    }
                }

                if round < 2 {
                    sleep(Duration::from_secs(5)).await;
                }
            }

            if connection.close(CloseStatus::NormalClosure, "done").await.is_err() {
                error!("error occurred when closing connection");
            }
        }
        Err(err) => error!("error when performing handshake: {}", err),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    handle_connection("wss://localhost:9002").await;
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
