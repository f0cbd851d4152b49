//! Drives the ambient accept loop (`server::start_server`) from its
//! `EventStream` instead of handling each connection in its own task:
//! every accepted client, inbound message, and disconnect arrives as one
//! `Event`, and a reply is sent back through the `ConnectionHandle` the
//! `NewClient` event carried.

use fluxsocket::event::{Event, ID};
use fluxsocket::server::{start_server, ConnectionHandle};
use futures::StreamExt;
use log::*;
use std::collections::HashMap;

#[tokio::main]
async fn main() {
    env_logger::init();

    let port: u16 = 8080;
    match start_server(port).await {
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
