//! Configuration surface, per §6's closed enumeration plus the ambient
//! frame/message size limits carried over from this crate's teacher.

use crate::extensions::ContextTakeoverPolicy;
use rustls::{ClientConfig as RustlsClientConfig, ServerConfig as RustlsServerConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// `permessage-deflate` policy, per direction, per §6.
#[derive(Debug, Clone, Default)]
pub struct PerMessageDeflateConfig {
    pub enabled: bool,
    pub server_context_takeover: ContextTakeoverPolicy,
    pub client_context_takeover: ContextTakeoverPolicy,
}

/// Options shared by both roles. `close_wait_timeout` and `max_missed_pings`
/// resolve the two Open Questions from `spec.md` §9: how long a server
/// waits for the peer's Close reply, and how many missed Pongs the ping
/// loop tolerates before giving up on the connection.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub keep_alive_interval: Duration,
    pub max_missed_pings: u32,
    pub close_wait_timeout: Duration,
    pub include_exception_in_close_response: bool,
    pub supported_subprotocols: HashSet<String>,
    pub per_message_deflate: PerMessageDeflateConfig,
    /// `None` disables the corresponding limit.
    pub max_frame_size: Option<usize>,
    pub max_message_size: Option<usize>,
    /// Caps how large each frame of an outbound fragmented message may be;
    /// must not exceed `max_frame_size` (`Error::CustomFragmentSizeExceeded`).
    pub fragment_size: Option<usize>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            keep_alive_interval: Duration::from_secs(20),
            max_missed_pings: 1,
            close_wait_timeout: Duration::from_millis(100),
            include_exception_in_close_response: false,
            supported_subprotocols: HashSet::new(),
            per_message_deflate: PerMessageDeflateConfig::default(),
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            fragment_size: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub websocket_config: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsServerConfig>>,
}

/// Client-only options (`additional_headers`, `sec_websocket_protocol`,
/// `sec_websocket_extensions`) live here rather than on `WebSocketConfig`,
/// since they only make sense when this endpoint is the one sending the
/// initial request.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub websocket_config: WebSocketConfig,
    pub tls_config: Option<Arc<RustlsClientConfig>>,
    pub additional_headers: Vec<(String, String)>,
    pub sec_websocket_protocol: Vec<String>,
}
