//! Starts a server with a customized `WebSocketConfig` — a shorter
//! keep-alive interval and a declared subprotocol — then leaves the accept
//! loop running in the background while this task does other work.

use fluxsocket::config::{PerMessageDeflateConfig, ServerConfig, WebSocketConfig};
use fluxsocket::server::start_server_with_config;
use std::collections::HashSet;
use std::io;
use std::time::Duration;

#[tokio::main]
pub async fn main() -> io::Result<()> {
    let mut supported_subprotocols = HashSet::new();
    supported_subprotocols.insert("chat".to_string());

    let config = ServerConfig {
        websocket_config: WebSocketConfig {
            keep_alive_interval: Duration::from_secs(10),
            supported_subprotocols,
            per_message_deflate: PerMessageDeflateConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        tls_config: None,
    };

    let _events = start_server_with_config(9000, Some(config)).await?;

    loop {
        println!("doing some work here...");
        tokio::time::sleep(Duration::from_secs(120)).await;
    }
}
