//! Same as `simple_server.rs` but over TLS, using
//! `server::start_server_with_config` with a `ServerConfig.tls_config`
//! built from a cert/key pair.

use fluxsocket::config::ServerConfig;
use fluxsocket::event::{Event, ID};
use fluxsocket::server::{start_server_with_config, ConnectionHandle};
use futures::StreamExt;
use log::{error, info};
use pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "no private key found"))
}

async fn run_server(port: u16, tls_config: Arc<rustls::ServerConfig>) {
    let config = ServerConfig {
        websocket_config: Default::default(),
        tls_config: Some(tls_config),
    };

    match start_server_with_config(port, Some(config)).await {
        Ok(mut event_receiver) => {
            let mut clients: HashMap<ID, ConnectionHandle> = HashMap::new();
            info!("server started on address 127.0.0.1:{}", port);
            while let Some(event) = event_receiver.next().await {
                match event {
                    Event::NewClient(id, handle) => {
                        info!("new client {} connected", id);
                        clients.insert(id, handle);
                    }
                    Event::NewMessage(client_id, message) => {
                        info!("message from client {}: {:?}", client_id, message);
                        if let Some(handle) = clients.get(&client_id) {
                            let message_type = message.message_type();
                            let mut connection = handle.lock().await;
                            if let Err(err) = connection.send(message.as_bytes(), message_type, true).await {
                                error!("failed to reply to client {}: {}", client_id, err);
                            }
                        }
                    }
                    Event::Disconnect(client_id, state) => {
                        info!("client {} disconnected in state {:?}", client_id, state);
                        clients.remove(&client_id);
                    }
                    Event::Error(client_id, error) => {
                        error!("error occurred for client {}: {:?}", client_id, error);
                        clients.remove(&client_id);
                    }
                }
            }
        }
        Err(err) => {
            eprintln!("could not start the server due to: {:?}", err);
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let certs = load_certs(Path::new("cert.pem"))?;
    let key = load_key(Path::new("key.pem"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let port: u16 = 8080;
    run_server(port, Arc::new(tls_config)).await;

    Ok(())
}
