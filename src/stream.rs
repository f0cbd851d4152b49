//! The duplex transport a `Connection` speaks over: a plain TCP socket or
//! one wrapped in TLS. Listener policy and certificate selection stay a
//! caller concern; this enum is just enough plumbing so `server.rs`'s
//! accept loop and `client.rs`'s dialer can hand `Connection<S>` a single
//! concrete type regardless of which one was negotiated.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;

pub enum WebSocketStream {
    Plain(TcpStream),
    TlsServer(Box<ServerTlsStream<TcpStream>>),
    TlsClient(Box<ClientTlsStream<TcpStream>>),
}

impl WebSocketStream {
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            WebSocketStream::Plain(s) => s.peer_addr(),
            WebSocketStream::TlsServer(s) => s.get_ref().0.peer_addr(),
            WebSocketStream::TlsClient(s) => s.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for WebSocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WebSocketStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            WebSocketStream::TlsServer(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            WebSocketStream::TlsClient(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WebSocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            WebSocketStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            WebSocketStream::TlsServer(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            WebSocketStream::TlsClient(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WebSocketStream::Plain(s) => Pin::new(s).poll_flush(cx),
            WebSocketStream::TlsServer(s) => Pin::new(s.as_mut()).poll_flush(cx),
            WebSocketStream::TlsClient(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WebSocketStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            WebSocketStream::TlsServer(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            WebSocketStream::TlsClient(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
