//! Sends one logical message as several fragments, demonstrating the
//! `send(..., end_of_message: bool)` continuation protocol from `spec.md`
//! §4.9: only the first call carries the real opcode, the rest ride on
//! `Continuation` until the final one sets `end_of_message = true`.

use fluxsocket::client;
use fluxsocket::config::ClientConfig;
use fluxsocket::error::CloseStatus;
use fluxsocket::message::MessageType;
use log::*;
use rand::distr::Alphanumeric;
use rand::{thread_rng, Rng};

const CHUNK_SIZE: usize = 8;

async fn handle_connection(addr: &str) {
    let config = ClientConfig::default();
    match client::connect(addr, &config).await {
        Ok(mut connection) => {
            let payload = generate_random_string().into_bytes();
            info!("sending random string in {}-byte fragments", CHUNK_SIZE);

            let chunks: Vec<&[u8]> = payload.chunks(CHUNK_SIZE).collect();
            let mut send_failed = false;
            for (i, chunk) in chunks.iter().enumerate() {
                let end_of_message = i == chunks.len() - 1;
                if connection.send(chunk, MessageType::Text, end_of_message).await.is_err() {
                    error!("error occurred when sending data in chunks");
                    send_failed = true;
                    break;
                }
            }

            if !send_failed {
                let _ = connection.close(CloseStatus::NormalClosure, "done").await;
            }
        }
        Err(err) => error!("error when performing handshake: {}", err),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    handle_connection("ws://127.0.0.1:9002").await;
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
