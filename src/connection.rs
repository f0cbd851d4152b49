//! The connection state machine (§4.9): owns the split stream, the
//! optional deflate codec, the close handshake and the keep-alive ping
//! loop, and exposes the four operations callers drive a connection with:
//! `send`, `receive`, `close` and `abort`.

use crate::config::{ClientConfig, ServerConfig};
use crate::context::Context;
use crate::deflate::{Deflater, Inflater};
use crate::error::{CloseStatus, Error};
use crate::frame::{self, OpCode, ReadCursor};
use crate::message::{MessageType, Received};
use crate::write;
use log::warn;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// The five states a connection can be in, per §4.9's state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    CloseSent,
    CloseReceived,
    Closed,
    Aborted,
}

/// Tracks an in-progress message that spans more than one frame. For an
/// uncompressed message this exists purely to remember which `MessageType`
/// a later `Continuation` frame belongs to — the bytes themselves go
/// straight to the caller's buffer via `ReadCursor`. For a compressed
/// message the raw (still-compressed) bytes accumulate here until the
/// final fragment arrives, since DEFLATE can only be inflated as a whole.
struct FragmentedMessage {
    message_type: MessageType,
    compressed: bool,
    buffer: Vec<u8>,
}

/// State the keep-alive task shares with the connection without holding
/// the rest of it: whether a Ping is outstanding and how many have gone
/// unanswered.
struct PingState {
    pending_since_tick: Option<u64>,
    missed: u32,
}

fn opcode_for(message_type: MessageType) -> OpCode {
    match message_type {
        MessageType::Text => OpCode::Text,
        MessageType::Binary => OpCode::Binary,
        MessageType::Close => OpCode::Close,
    }
}

fn close_payload(status: CloseStatus, description: &str) -> Vec<u8> {
    let mut payload = status.code().to_be_bytes().to_vec();
    payload.extend_from_slice(description.as_bytes());
    payload
}

/// Short, static description for a `CloseStatus` — what goes in the Close
/// payload by default, before `include_exception_in_close_response` decides
/// whether the triggering error's own text is appended to it.
fn close_status_description(status: CloseStatus) -> &'static str {
    match status {
        CloseStatus::NormalClosure => "normal closure",
        CloseStatus::EndpointUnavailable => "endpoint unavailable",
        CloseStatus::ProtocolError => "protocol error",
        CloseStatus::UnsupportedData => "unsupported data",
        CloseStatus::InvalidPayloadData => "invalid payload data",
        CloseStatus::PolicyViolation => "policy violation",
        CloseStatus::MessageTooBig => "message too big",
        CloseStatus::InternalServerError => "internal server error",
    }
}

/// One negotiated WebSocket endpoint: half of a duplex byte stream plus
/// everything needed to speak framed, optionally-compressed messages over
/// it. `S` is generic so the same state machine serves plain TCP, TLS, and
/// the in-memory duplexes the test suite uses.
pub struct Connection<S> {
    read_half: ReadHalf<S>,
    write_half: Arc<Mutex<WriteHalf<S>>>,
    pub context: Context,
    config: crate::config::WebSocketConfig,
    state: ConnectionState,
    is_server: bool,

    deflate_encoder: Option<Deflater>,
    deflate_decoder: Option<Inflater>,

    pending_cursor: Option<ReadCursor>,
    fragmented: Option<FragmentedMessage>,
    pending_decoded: VecDeque<u8>,
    pending_decoded_type: MessageType,

    is_continuation: bool,
    send_message_type: Option<MessageType>,
    compress_accumulator: Option<Vec<u8>>,

    ping_state: Arc<Mutex<PingState>>,
    ticks: Arc<crate::utils::TickSource>,
    ping_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.ping_task.take() {
            handle.abort();
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send + 'static> Connection<S> {
    fn new(
        stream: S,
        is_server: bool,
        context: Context,
        config: crate::config::WebSocketConfig,
    ) -> Self {
        let (read_half, write_half) = split(stream);

        let (no_ctx_encode, no_ctx_decode) = match &context.extensions {
            Some(ext) if is_server => (ext.server_no_context_takeover, ext.client_no_context_takeover),
            Some(ext) => (ext.client_no_context_takeover, ext.server_no_context_takeover),
            None => (false, false),
        };
        let deflate_enabled = context
            .extensions
            .as_ref()
            .map(|e| e.permessage_deflate)
            .unwrap_or(false);

        let mut connection = Self {
            read_half,
            write_half: Arc::new(Mutex::new(write_half)),
            context,
            config,
            state: ConnectionState::Open,
            is_server,
            deflate_encoder: deflate_enabled.then(|| Deflater::new(no_ctx_encode)),
            deflate_decoder: deflate_enabled.then(|| Inflater::new(no_ctx_decode)),
            pending_cursor: None,
            fragmented: None,
            pending_decoded: VecDeque::new(),
            pending_decoded_type: MessageType::Binary,
            is_continuation: false,
            send_message_type: None,
            compress_accumulator: None,
            ping_state: Arc::new(Mutex::new(PingState {
                pending_since_tick: None,
                missed: 0,
            })),
            ticks: Arc::new(crate::utils::TickSource::new()),
            ping_task: None,
            cancel: CancellationToken::new(),
        };
        connection.start_ping_loop();
        connection
    }

    fn start_ping_loop(&mut self) {
        if self.config.keep_alive_interval.is_zero() {
            return;
        }

        let interval = self.config.keep_alive_interval;
        let max_missed = self.config.max_missed_pings.max(1);
        let write_half = self.write_half.clone();
        let ping_state = self.ping_state.clone();
        let ticks = self.ticks.clone();
        let cancel = self.cancel.clone();
        let is_client = !self.is_server;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let tick_to_send = {
                    let mut state = ping_state.lock().await;
                    if state.pending_since_tick.is_some() {
                        state.missed += 1;
                        if state.missed >= max_missed {
                            warn!("keep-alive ping went unanswered, closing connection");
                            let payload = close_payload(CloseStatus::NormalClosure, "ping timeout");
                            let mut writer = write_half.lock().await;
                            let _ = write::write(
                                &mut *writer,
                                OpCode::Close,
                                &payload,
                                true,
                                is_client,
                                false,
                                true,
                            )
                            .await;
                            break;
                        }
                        None
                    } else {
                        let tick = ticks.now();
                        state.pending_since_tick = Some(tick);
                        Some(tick)
                    }
                };

                if let Some(tick) = tick_to_send {
                    let payload = tick.to_be_bytes();
                    let mut writer = write_half.lock().await;
                    if write::write(&mut *writer, OpCode::Ping, &payload, true, is_client, false, true)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        });
        self.ping_task = Some(handle);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sends one fragment of a message. `end_of_message` marks the last
    /// fragment; when permessage-deflate is negotiated for this direction,
    /// fragments accumulate locally and the whole message goes out as a
    /// single compressed frame once `end_of_message` is true, matching
    /// §4.8's "rsv1 only on the first frame" rule trivially since there is
    /// only ever one frame.
    pub async fn send(
        &mut self,
        data: &[u8],
        message_type: MessageType,
        end_of_message: bool,
    ) -> Result<(), Error> {
        if self.state != ConnectionState::Open {
            return Err(Error::InvalidOperation(
                "cannot send on a connection that is not open".into(),
            ));
        }

        let result = self.send_inner(data, message_type, end_of_message).await;
        if result.is_err() {
            let _ = self.close_output(CloseStatus::InternalServerError, "send failed").await;
        }
        result
    }

    async fn send_inner(
        &mut self,
        data: &[u8],
        message_type: MessageType,
        end_of_message: bool,
    ) -> Result<(), Error> {
        let is_client = !self.is_server;

        if self.deflate_encoder.is_some() {
            let accumulator = self.compress_accumulator.get_or_insert_with(Vec::new);
            accumulator.extend_from_slice(data);
            self.send_message_type.get_or_insert(message_type);

            if let Some(max) = self.config.max_message_size {
                if accumulator.len() > max {
                    return Err(Error::MaxMessageSize);
                }
            }

            if !end_of_message {
                return Ok(());
            }

            let full = self.compress_accumulator.take().unwrap_or_default();
            let msg_type = self.send_message_type.take().unwrap_or(message_type);
            let opcode = opcode_for(msg_type);
            let compressed = self.deflate_encoder.as_mut().unwrap().compress_message(&full)?;

            let mut writer = self.write_half.lock().await;
            write::write(&mut *writer, opcode, &compressed, true, is_client, true, true).await
        } else {
            if let Some(max) = self.config.max_frame_size {
                if data.len() > max {
                    return Err(Error::MaxFrameSize);
                }
            }

            // `fragment_size` splits one caller-provided chunk into several
            // wire frames when it is smaller than `data`; absent a cap, the
            // whole chunk goes out as a single frame as before.
            let fragment_size = self.config.fragment_size.unwrap_or(data.len().max(1));

            let mut offset = 0;
            loop {
                let end = (offset + fragment_size).min(data.len());
                let chunk = &data[offset..end];
                let is_last_chunk = end == data.len();
                let frame_end_of_message = is_last_chunk && end_of_message;

                let opcode = if self.is_continuation {
                    OpCode::Continuation
                } else {
                    opcode_for(message_type)
                };
                let is_first_fragment = !self.is_continuation;

                let mut writer = self.write_half.lock().await;
                write::write(&mut *writer, opcode, chunk, frame_end_of_message, is_client, false, is_first_fragment)
                    .await?;
                drop(writer);

                self.is_continuation = !frame_end_of_message;
                offset = end;
                if is_last_chunk {
                    break;
                }
            }
            Ok(())
        }
    }

    /// Reads the next chunk of the current (or next) message into `buf`.
    /// Ping/Pong frames are absorbed transparently; a Close frame completes
    /// the close handshake and is reported back as `MessageType::Close`.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<Received, Error> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Aborted) {
            return Err(Error::InvalidOperation(
                "receive called on a closed connection".into(),
            ));
        }

        if !self.pending_decoded.is_empty() {
            return Ok(self.drain_pending_decoded(buf));
        }

        loop {
            let (cursor, was_resumed) = if let Some(cursor) = self.pending_cursor.take() {
                match frame::read_from_cursor(&mut self.read_half, buf, cursor).await {
                    Ok(c) => (c, true),
                    Err(e) => return Err(self.fail(e).await),
                }
            } else {
                let allow_rsv1 = self.deflate_decoder.is_some();
                match frame::read(&mut self.read_half, buf, allow_rsv1, self.is_server).await {
                    Ok(c) => (c, false),
                    Err(e) => return Err(self.fail(e).await),
                }
            };

            match cursor.frame.opcode {
                OpCode::Ping => {
                    if !cursor.is_complete() {
                        return Err(self.fail(Error::BufferTooSmall).await);
                    }
                    let payload = buf[..cursor.num_bytes_read as usize].to_vec();
                    let mut writer = self.write_half.lock().await;
                    write::write(&mut *writer, OpCode::Pong, &payload, true, !self.is_server, false, true)
                        .await?;
                    drop(writer);
                    continue;
                }
                OpCode::Pong => {
                    if !cursor.is_complete() {
                        return Err(self.fail(Error::BufferTooSmall).await);
                    }
                    let mut state = self.ping_state.lock().await;
                    state.pending_since_tick = None;
                    state.missed = 0;
                    continue;
                }
                OpCode::Close => {
                    return self.handle_close_frame(&cursor).await;
                }
                OpCode::Reserved(op) => {
                    let _ = self.close_output(CloseStatus::ProtocolError, "unsupported opcode").await;
                    return Err(Error::NotSupported { opcode: op });
                }
                OpCode::Text | OpCode::Binary => {
                    if !was_resumed && self.fragmented.is_some() {
                        return Err(self.fail(Error::InvalidFrameFragmentation).await);
                    }
                    let message_type = if cursor.frame.opcode == OpCode::Text {
                        MessageType::Text
                    } else {
                        MessageType::Binary
                    };

                    if cursor.frame.rsv1 {
                        if let Some(received) =
                            self.accumulate_compressed(cursor, message_type, buf).await?
                        {
                            return Ok(received);
                        }
                        continue;
                    }
                    return self.deliver_uncompressed(cursor, message_type);
                }
                OpCode::Continuation => {
                    let Some(message_type) = self.fragmented.as_ref().map(|f| f.message_type) else {
                        return Err(self.fail(Error::InvalidContinuationFrame).await);
                    };
                    let compressed = self.fragmented.as_ref().map(|f| f.compressed).unwrap_or(false);

                    if compressed {
                        if let Some(received) =
                            self.accumulate_compressed(cursor, message_type, buf).await?
                        {
                            return Ok(received);
                        }
                        continue;
                    }
                    return self.deliver_uncompressed(cursor, message_type);
                }
            }
        }
    }

    fn deliver_uncompressed(
        &mut self,
        cursor: ReadCursor,
        message_type: MessageType,
    ) -> Result<Received, Error> {
        let bytes = cursor.num_bytes_read as usize;
        let frame_fin = cursor.frame.fin;
        let cursor_done = cursor.is_complete();

        if !cursor_done {
            self.fragmented = Some(FragmentedMessage {
                message_type,
                compressed: false,
                buffer: Vec::new(),
            });
            self.pending_cursor = Some(cursor);
            return Ok(Received {
                bytes,
                message_type,
                end_of_message: false,
                close_status: None,
                close_description: None,
            });
        }

        if frame_fin {
            self.fragmented = None;
        } else {
            self.fragmented = Some(FragmentedMessage {
                message_type,
                compressed: false,
                buffer: Vec::new(),
            });
        }

        Ok(Received {
            bytes,
            message_type,
            end_of_message: frame_fin,
            close_status: None,
            close_description: None,
        })
    }

    /// Reads a compressed frame's entire payload (looping internally past
    /// whatever `buf` could hold on the first call) and appends it to the
    /// in-progress message's accumulator. Returns `Ok(None)` if more
    /// frames are still expected, or `Ok(Some(received))` once the final
    /// fragment arrived and the whole message has been inflated and its
    /// first chunk copied into `buf`.
    async fn accumulate_compressed(
        &mut self,
        mut cursor: ReadCursor,
        message_type: MessageType,
        buf: &mut [u8],
    ) -> Result<Option<Received>, Error> {
        let frame_fin = cursor.frame.fin;

        let mut accumulator = match self.fragmented.take() {
            Some(fragment) if fragment.compressed => fragment.buffer,
            _ => Vec::new(),
        };
        accumulator.extend_from_slice(&buf[..cursor.num_bytes_read as usize]);

        let mut scratch = vec![0u8; 8192];
        while !cursor.is_complete() {
            let to_read = scratch.len().min(cursor.num_bytes_left_to_read as usize).max(1);
            cursor = match frame::read_from_cursor(&mut self.read_half, &mut scratch[..to_read], cursor).await
            {
                Ok(c) => c,
                Err(e) => return Err(self.fail(e).await),
            };
            accumulator.extend_from_slice(&scratch[..to_read]);
        }

        if let Some(max) = self.config.max_message_size {
            if accumulator.len() > max {
                return Err(self.fail(Error::MaxMessageSize).await);
            }
        }

        if !frame_fin {
            self.fragmented = Some(FragmentedMessage {
                message_type,
                compressed: true,
                buffer: accumulator,
            });
            return Ok(None);
        }

        let decoder = self.deflate_decoder.as_mut().ok_or_else(|| {
            Error::protocol("compressed frame received without negotiated permessage-deflate")
        })?;
        let decompressed = decoder.decompress_message(&accumulator)?;
        self.pending_decoded = decompressed.into_iter().collect();
        self.pending_decoded_type = message_type;
        Ok(Some(self.drain_pending_decoded(buf)))
    }

    fn drain_pending_decoded(&mut self, buf: &mut [u8]) -> Received {
        let to_copy = buf.len().min(self.pending_decoded.len());
        for slot in buf.iter_mut().take(to_copy) {
            *slot = self.pending_decoded.pop_front().unwrap();
        }
        let end_of_message = self.pending_decoded.is_empty();

        Received {
            bytes: to_copy,
            message_type: self.pending_decoded_type,
            end_of_message,
            close_status: None,
            close_description: None,
        }
    }

    async fn handle_close_frame(&mut self, cursor: &ReadCursor) -> Result<Received, Error> {
        let status = cursor.frame.close_status;
        let description = cursor.frame.close_description.clone();

        if self.state != ConnectionState::CloseSent {
            self.state = ConnectionState::CloseReceived;
            let mut writer = self.write_half.lock().await;
            write::write(&mut *writer, OpCode::Close, &[], true, !self.is_server, false, true).await?;
            drop(writer);
        }

        self.state = ConnectionState::Closed;
        self.cancel.cancel();

        Ok(Received {
            bytes: 0,
            message_type: MessageType::Close,
            end_of_message: true,
            close_status: status,
            close_description: description,
        })
    }

    /// Sends a Close frame and waits (up to `close_wait_timeout`) for the
    /// peer's reply before settling in `Closed`, per §4.9's close
    /// handshake. Unlike `close_output`, this one still reads.
    pub async fn close(&mut self, status: CloseStatus, description: &str) -> Result<(), Error> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Aborted) {
            return Ok(());
        }

        let payload = close_payload(status, description);
        {
            let mut writer = self.write_half.lock().await;
            write::write(&mut *writer, OpCode::Close, &payload, true, !self.is_server, false, true).await?;
        }
        self.state = ConnectionState::CloseSent;

        let mut scratch = vec![0u8; 256];
        let _ = timeout(self.config.close_wait_timeout, async {
            loop {
                match frame::read(&mut self.read_half, &mut scratch, self.deflate_decoder.is_some(), self.is_server)
                    .await
                {
                    Ok(cursor) if cursor.frame.opcode == OpCode::Close => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        })
        .await;

        self.state = ConnectionState::Closed;
        self.cancel.cancel();
        Ok(())
    }

    /// Sends a Close frame without waiting for the peer's reply. Used when
    /// this side is failing the connection over a protocol violation and
    /// isn't willing to keep reading.
    pub async fn close_output(&mut self, status: CloseStatus, description: &str) -> Result<(), Error> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Aborted) {
            return Ok(());
        }

        let payload = close_payload(status, description);
        let mut writer = self.write_half.lock().await;
        let result =
            write::write(&mut *writer, OpCode::Close, &payload, true, !self.is_server, false, true).await;
        drop(writer);

        self.state = ConnectionState::Closed;
        self.cancel.cancel();
        result
    }

    /// Drops the connection immediately without sending a Close frame.
    pub fn abort(&mut self) {
        self.state = ConnectionState::Aborted;
        self.cancel.cancel();
        if let Some(handle) = self.ping_task.take() {
            handle.abort();
        }
    }

    async fn fail(&mut self, err: Error) -> Error {
        let status = CloseStatus::from(&err);
        let description = if self.config.include_exception_in_close_response {
            format!("{}\r\n\r\n{}", close_status_description(status), err)
        } else {
            close_status_description(status).to_string()
        };
        let _ = self.close_output(status, &description).await;
        err
    }
}

/// Rejects a `fragment_size` that exceeds `max_frame_size` up front, rather
/// than discovering it frame-by-frame the first time a large message is
/// sent.
fn validate_websocket_config(config: &crate::config::WebSocketConfig) -> Result<(), Error> {
    if let (Some(fragment_size), Some(max_frame_size)) = (config.fragment_size, config.max_frame_size) {
        if fragment_size > max_frame_size {
            return Err(Error::CustomFragmentSizeExceeded(fragment_size, max_frame_size));
        }
    }
    Ok(())
}

/// Completes a server-side handshake on `stream` and returns the
/// negotiated connection.
pub async fn accept_async<S>(mut stream: S, config: &ServerConfig) -> Result<Connection<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    validate_websocket_config(&config.websocket_config)?;
    let (request, outcome) = crate::handshake::accept(&mut stream, config, None).await?;
    let context = Context::new_server(request.path, request.headers, outcome.subprotocol, outcome.extensions);
    Ok(Connection::new(stream, true, context, config.websocket_config.clone()))
}

/// Completes a client-side handshake on `stream` and returns the
/// negotiated connection.
pub async fn connect_async<S>(
    mut stream: S,
    host: &str,
    path: &str,
    config: &ClientConfig,
) -> Result<Connection<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    validate_websocket_config(&config.websocket_config)?;
    let outcome = crate::handshake::connect(&mut stream, host, path, config).await?;
    let context = Context::new_client(
        path.to_string(),
        crate::http::HeaderMap::new(),
        outcome.subprotocol,
        outcome.extensions,
    );
    Ok(Connection::new(stream, false, context, config.websocket_config.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extensions;

    fn server_config() -> ServerConfig {
        ServerConfig {
            websocket_config: crate::config::WebSocketConfig {
                keep_alive_interval: std::time::Duration::ZERO,
                ..Default::default()
            },
            tls_config: None,
        }
    }

    fn test_connection(is_server: bool, extensions: Option<Extensions>) -> Connection<tokio::io::DuplexStream> {
        let (a, _b) = tokio::io::duplex(4096);
        let context = if is_server {
            Context::new_server(
                "/".to_string(),
                crate::http::HeaderMap::new(),
                None,
                extensions,
            )
        } else {
            Context::new_client(
                "/".to_string(),
                crate::http::HeaderMap::new(),
                None,
                extensions,
            )
        };
        Connection::new(a, is_server, context, server_config().websocket_config)
    }

    #[tokio::test]
    async fn send_on_closed_connection_errors() {
        let mut connection = test_connection(true, None);
        connection.abort();
        let err = connection.send(b"hi", MessageType::Binary, true).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn first_uncompressed_send_is_not_a_continuation_frame() {
        let mut connection = test_connection(false, None);
        connection.send(b"hello", MessageType::Text, true).await.unwrap();
        assert!(!connection.is_continuation);
    }

    #[tokio::test]
    async fn fragmented_send_tracks_continuation_state() {
        let mut connection = test_connection(false, None);
        connection.send(b"part one", MessageType::Text, false).await.unwrap();
        assert!(connection.is_continuation);
        connection.send(b"part two", MessageType::Text, true).await.unwrap();
        assert!(!connection.is_continuation);
    }

    #[tokio::test]
    async fn full_round_trip_sends_and_receives_a_text_message() {
        let (client, server) = tokio::io::duplex(4096);
        let client_context = Context::new_client("/".into(), crate::http::HeaderMap::new(), None, None);
        let server_context = Context::new_server("/".into(), crate::http::HeaderMap::new(), None, None);
        let mut cfg = crate::config::WebSocketConfig::default();
        cfg.keep_alive_interval = std::time::Duration::ZERO;

        let mut client_conn = Connection::new(client, false, client_context, cfg.clone());
        let mut server_conn = Connection::new(server, true, server_context, cfg);

        client_conn.send(b"hello there", MessageType::Text, true).await.unwrap();

        let mut buf = vec![0u8; 64];
        let received = server_conn.receive(&mut buf).await.unwrap();
        assert_eq!(received.message_type, MessageType::Text);
        assert!(received.end_of_message);
        assert_eq!(&buf[..received.bytes], b"hello there");
    }

    #[tokio::test]
    async fn compressed_round_trip_reassembles_fragments() {
        let extensions = Extensions {
            permessage_deflate: true,
            ..Default::default()
        };
        let (client, server) = tokio::io::duplex(8192);
        let client_context =
            Context::new_client("/".into(), crate::http::HeaderMap::new(), None, Some(extensions.clone()));
        let server_context =
            Context::new_server("/".into(), crate::http::HeaderMap::new(), None, Some(extensions));
        let mut cfg = crate::config::WebSocketConfig::default();
        cfg.keep_alive_interval = std::time::Duration::ZERO;

        let mut client_conn = Connection::new(client, false, client_context, cfg.clone());
        let mut server_conn = Connection::new(server, true, server_context, cfg);

        let body = b"compress me please, several times over".repeat(8);
        client_conn.send(&body, MessageType::Binary, true).await.unwrap();

        let mut collected = Vec::new();
        let mut buf = vec![0u8; 16];
        loop {
            let received = server_conn.receive(&mut buf).await.unwrap();
            collected.extend_from_slice(&buf[..received.bytes]);
            if received.end_of_message {
                break;
            }
        }
        assert_eq!(collected, body);
    }

    #[tokio::test]
    async fn close_handshake_transitions_to_closed() {
        let (client, server) = tokio::io::duplex(4096);
        let client_context = Context::new_client("/".into(), crate::http::HeaderMap::new(), None, None);
        let server_context = Context::new_server("/".into(), crate::http::HeaderMap::new(), None, None);
        let mut cfg = crate::config::WebSocketConfig::default();
        cfg.keep_alive_interval = std::time::Duration::ZERO;
        cfg.close_wait_timeout = std::time::Duration::from_millis(50);

        let mut client_conn = Connection::new(client, false, client_context, cfg.clone());
        let mut server_conn = Connection::new(server, true, server_context, cfg);

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let received = server_conn.receive(&mut buf).await.unwrap();
            assert_eq!(received.message_type, MessageType::Close);
            server_conn.state()
        });

        client_conn.close(CloseStatus::NormalClosure, "done").await.unwrap();
        assert_eq!(client_conn.state(), ConnectionState::Closed);

        let server_state = server_task.await.unwrap();
        assert_eq!(server_state, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn fragment_size_splits_a_single_send_into_several_frames() {
        let (client, server) = tokio::io::duplex(8192);
        let client_context = Context::new_client("/".into(), crate::http::HeaderMap::new(), None, None);
        let server_context = Context::new_server("/".into(), crate::http::HeaderMap::new(), None, None);
        let mut cfg = crate::config::WebSocketConfig::default();
        cfg.keep_alive_interval = std::time::Duration::ZERO;
        cfg.fragment_size = Some(4);

        let mut client_conn = Connection::new(client, false, client_context, cfg.clone());
        let mut server_conn = Connection::new(server, true, server_context, cfg);

        client_conn.send(b"twelve bytes", MessageType::Text, true).await.unwrap();

        let mut collected = Vec::new();
        let mut buf = vec![0u8; 16];
        let mut chunks = 0;
        loop {
            let received = server_conn.receive(&mut buf).await.unwrap();
            collected.extend_from_slice(&buf[..received.bytes]);
            chunks += 1;
            if received.end_of_message {
                break;
            }
        }
        assert_eq!(collected, b"twelve bytes");
        assert!(chunks >= 3, "expected fragment_size=4 to split a 12-byte send into several frames, got {chunks}");
    }

    #[tokio::test]
    async fn accept_async_rejects_fragment_size_larger_than_max_frame_size() {
        let (stream, _peer) = tokio::io::duplex(4096);
        let config = ServerConfig {
            websocket_config: crate::config::WebSocketConfig {
                max_frame_size: Some(1024),
                fragment_size: Some(2048),
                ..Default::default()
            },
            tls_config: None,
        };
        let err = accept_async(stream, &config).await.unwrap_err();
        assert!(matches!(err, Error::CustomFragmentSizeExceeded(2048, 1024)));
    }

    #[tokio::test]
    async fn fail_includes_exception_detail_only_when_configured() {
        async fn close_description_for(include_exception: bool) -> String {
            let (server_stream, mut peer) = tokio::io::duplex(4096);
            let context = Context::new_server("/".to_string(), crate::http::HeaderMap::new(), None, None);
            let mut cfg = crate::config::WebSocketConfig::default();
            cfg.keep_alive_interval = std::time::Duration::ZERO;
            cfg.include_exception_in_close_response = include_exception;
            let mut connection = Connection::new(server_stream, true, context, cfg);

            connection.fail(Error::MaxMessageSize).await;

            let mut buf = vec![0u8; 256];
            let cursor = crate::frame::read(&mut peer, &mut buf, false, false).await.unwrap();
            String::from_utf8(buf[2..cursor.num_bytes_read as usize].to_vec()).unwrap()
        }

        let short = close_description_for(false).await;
        assert_eq!(short, "message too big");

        let detailed = close_description_for(true).await;
        assert!(detailed.starts_with("message too big\r\n\r\n"));
        assert!(detailed.contains("message exceeds the configured maximum size"));
    }
}
