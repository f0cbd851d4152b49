//! Plain-`ws://` client: sends a random payload every few seconds and waits
//! for the echoed reply, closing politely after three round trips.

use fluxsocket::client;
use fluxsocket::config::ClientConfig;
use fluxsocket::error::CloseStatus;
use fluxsocket::message::MessageType;
use rand::distr::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::time::{sleep, Duration};

async fn handle_connection(addr: &str) {
    let config = ClientConfig::default();
    match client::connect(addr, &config).await {
        Ok(mut connection) => {
            let mut buf = vec![0u8; 4096];

            for round in 0..3 {
                let payload = generate_random_string();
                println!("sending: {}", payload);
                if connection
                    .send(payload.as_bytes(), MessageType::Binary, true)
                    .await
                    .is_err()
                {
                    eprintln!("failed to send message");
                    break;
                }

                match connection.receive(&mut buf).await {
                    Ok(received) if received.message_type != MessageType::Close => {
                        println!(
                            "received message: {}",
                            String::from_utf8_lossy(&buf[..received.bytes])
                        );
                    }
                    Ok(_) => {
                        println!("server closed the connection");
                        return;
                    }
                    Err(err) => {
                        eprintln!("received error from the stream: {}", err);
                        return;
                    }
                }

                if round < 2 {
                    sleep(Duration::from_secs(5)).await;
                }
            }

            if connection.close(CloseStatus::NormalClosure, "done").await.is_err() {
                eprintln!("error occurred when closing connection");
            }
        }
        Err(err) => eprintln!("error when performing handshake: {}", err),
    }
}

#[tokio::main]
async fn main() {
    handle_connection("ws://127.0.0.1:9002").await;
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
