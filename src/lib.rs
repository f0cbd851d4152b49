//! Async WebSocket endpoints (client and server) for the Tokio stack.
//!
//! This crate implements [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455)
//! and the `permessage-deflate` extension from
//! [RFC 7692](https://datatracker.ietf.org/doc/html/rfc7692) on top of any
//! `AsyncRead + AsyncWrite` stream: the handshake, frame codec, masking,
//! fragmentation, compression and the close/ping-pong keepalive handshake
//! are all handled for you, leaving connection setup (listener policy,
//! TLS certificate selection) to the caller.
//!
//! The fastest way in is [`server::start_server`] or [`client::connect`];
//! for full control over the underlying stream, [`connection::accept_async`]
//! and [`connection::connect_async`] work directly on anything implementing
//! `AsyncRead + AsyncWrite + Unpin + Send`.

mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
mod deflate;
pub mod error;
pub mod event;
pub mod extensions;
pub mod frame;
pub mod handshake;
pub mod http;
mod io;
pub mod message;
pub mod server;
pub mod stream;
mod utils;
mod write;

pub use connection::{accept_async, connect_async, Connection, ConnectionState};
pub use context::Context;
pub use error::{CloseStatus, Error};
pub use event::{Event, EventStream};
pub use message::{Message, MessageType, Received};
pub use server::ConnectionHandle;
