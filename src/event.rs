//! The accept-loop's event fan-out: `server.rs` spawns one reader task per
//! accepted connection and reports everything that happens on it —
//! arrival, messages, disconnects, errors — through a single channel so
//! callers can drive many connections from one `Stream`.

use crate::connection::ConnectionState;
use crate::error::Error;
use crate::message::Message;
use crate::server::ConnectionHandle;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

pub type ID = Uuid;

/// Every notification the accept loop can report about a connection.
pub enum Event {
    /// A connection completed its handshake; `ConnectionHandle` is shared
    /// with the reader task that produced the rest of this stream's events
    /// for the same `ID`, so a caller can reply from the event loop.
    NewClient(ID, ConnectionHandle),
    NewMessage(ID, Message),
    Disconnect(ID, ConnectionState),
    Error(ID, Error),
}

/// Wraps the `mpsc::Receiver<Event>` the accept loop feeds so callers get
/// a plain `Stream` instead of needing to poll a channel directly.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    pub fn new(receiver: Receiver<Event>) -> Self {
        Self { receiver }
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll_recv(cx)
    }
}
