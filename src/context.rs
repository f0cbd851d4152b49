//! The post-handshake connection handle: request metadata and identity.
//!
//! The duplex stream itself stays owned by `Connection` (it has to be
//! split into read/write halves), so `Context` carries everything else a
//! caller might want to inspect about how the connection came to be:
//! which path/headers the client asked for, which subprotocol and
//! extensions were negotiated, and a stable identifier for logging.

use crate::extensions::Extensions;
use crate::http::HeaderMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Context {
    pub id: Uuid,
    pub path: String,
    pub headers: HeaderMap,
    pub subprotocol: Option<String>,
    pub extensions: Option<Extensions>,
    pub is_server: bool,
}

impl Context {
    pub fn new_server(
        path: String,
        headers: HeaderMap,
        subprotocol: Option<String>,
        extensions: Option<Extensions>,
    ) -> Self {
        Self {
            id: crate::utils::generate_connection_id(),
            path,
            headers,
            subprotocol,
            extensions,
            is_server: true,
        }
    }

    pub fn new_client(
        path: String,
        headers: HeaderMap,
        subprotocol: Option<String>,
        extensions: Option<Extensions>,
    ) -> Self {
        Self {
            id: crate::utils::generate_connection_id(),
            path,
            headers,
            subprotocol,
            extensions,
            is_server: false,
        }
    }
}
