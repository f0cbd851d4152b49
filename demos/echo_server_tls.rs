//! TLS echo server: terminates TLS with `tokio-rustls` itself (certificate
//! selection is a caller concern, per `spec.md` §1), then hands the
//! resulting stream straight to `accept_async`, which works on any
//! `AsyncRead + AsyncWrite` type.

use fluxsocket::config::ServerConfig;
use fluxsocket::connection::accept_async;
use fluxsocket::message::MessageType;
use log::{error, info};
use pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

async fn handle_connection(peer: SocketAddr, stream: TlsStream<TcpStream>) {
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
            Ok(received) if received.message_type == MessageType::Close => break,
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

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "no private key found"))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = String::from("127.0.0.1:9002")
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))?;

    let certs = load_certs(Path::new("server.crt"))?;
    let key = load_key(Path::new("server.key"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let acceptor = TlsAcceptor::from(Arc::new(tls_config));
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on: {}", addr);

    while let Ok((stream, peer)) = listener.accept().await {
        info!("peer address: {}", peer);
        match acceptor.accept(stream).await {
            Ok(tls_stream) => {
                tokio::spawn(handle_connection(peer, tls_stream));
            }
            Err(err) => {
                error!("TLS handshake failed with {}: {}", peer, err);
            }
        }
    }

    Ok(())
}
