use crate::http::HandshakeResponse;
use pki_types::InvalidDnsNameError;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

/// Every failure mode the crate surfaces, from header parsing through
/// frame decoding to handshake negotiation and DEFLATE.
#[derive(Error, Debug)]
pub enum Error {
    // --- General --------------------------------------------------------
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("IO error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // --- HTTP header codec -----------------------------------------------
    #[error("HTTP headers exceeded the size cap ({actual} > {max} bytes)")]
    HeaderTooLarge { actual: usize, max: usize },

    #[error("malformed HTTP request/response start line")]
    MalformedStartLine,

    #[error("invalid Content-Length header value")]
    InvalidContentLength,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    // --- Handshake negotiator --------------------------------------------
    #[error("Couldn't find a non-empty Sec-WebSocket-Key header in the request")]
    KeyMissing,

    #[error("unsupported WebSocket version: {version}")]
    VersionNotSupported { version: String },

    #[error("Upgrade: websocket header missing in the request")]
    NoUpgradeHeaderPresent,

    #[error("Connection: Upgrade header missing in the request")]
    NoConnectionHeaderPresent,

    #[error("handshake failed, server responded with status {response_code}: {detail}")]
    HandshakeFailed {
        response_code: u16,
        response_headers: Box<HandshakeResponse>,
        detail: String,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws:// or wss://")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("use_tls = `{0}` argument does not match the passed URL scheme: `{1}`")]
    SchemeAgainstTlsConfig(bool, String),

    // --- Buffer pool ------------------------------------------------------
    #[error("requested buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("operation attempted on a pooled buffer after it was released")]
    BufferReleased,

    // --- Frame codec -------------------------------------------------------
    #[error("caller buffer is too small to hold any payload byte")]
    BufferTooSmall,

    #[error("stream ended before the expected number of bytes arrived")]
    UnexpectedEndOfStream,

    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    #[error("frame payload length is out of the representable range")]
    PayloadLengthOutOfRange,

    #[error("fragment_size `{0}` can't be greater than max_frame_size `{1}`")]
    CustomFragmentSizeExceeded(usize, usize),

    #[error("max frame size reached")]
    MaxFrameSize,

    #[error("message exceeds the configured maximum size")]
    MaxMessageSize,

    #[error("invalid frame while a fragmented message is already in progress")]
    InvalidFrameFragmentation,

    #[error("continuation frame received with no fragmented message in progress")]
    InvalidContinuationFrame,

    #[error("unsupported opcode: {opcode:#04x}")]
    NotSupported { opcode: u8 },

    // --- Deflate -----------------------------------------------------------
    #[error("DEFLATE stream error: {0}")]
    Deflate(String),

    #[error("max_window_bits should be a value between 8 and 15")]
    InvalidMaxWindowBits,
}

impl Error {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Error::ProtocolError {
            reason: reason.into(),
        }
    }
}

/// The WebSocket Close status codes this crate maps its own errors to
/// (`spec.md` §7). Not an exhaustive IANA registry — only the values the
/// connection state machine can itself choose to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseStatus {
    NormalClosure = 1000,
    EndpointUnavailable = 1001,
    ProtocolError = 1002,
    UnsupportedData = 1003,
    InvalidPayloadData = 1007,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    InternalServerError = 1011,
}

impl CloseStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Maps a raw close status code received from the peer back to a known
    /// variant. Codes outside this crate's own vocabulary (e.g. application
    /// codes in the 3000-4999 range) are represented as `None` by design —
    /// callers read the raw `u16` from `Received::close_status` instead.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(CloseStatus::NormalClosure),
            1001 => Some(CloseStatus::EndpointUnavailable),
            1002 => Some(CloseStatus::ProtocolError),
            1003 => Some(CloseStatus::UnsupportedData),
            1007 => Some(CloseStatus::InvalidPayloadData),
            1008 => Some(CloseStatus::PolicyViolation),
            1009 => Some(CloseStatus::MessageTooBig),
            1011 => Some(CloseStatus::InternalServerError),
            _ => None,
        }
    }
}

/// Maps a mid-connection error to the Close status that must accompany it,
/// per `spec.md` §7's propagation policy.
impl From<&Error> for CloseStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::ProtocolError { .. }
            | Error::NotSupported { .. }
            | Error::PayloadLengthOutOfRange
            | Error::InvalidFrameFragmentation
            | Error::InvalidContinuationFrame => CloseStatus::ProtocolError,

            Error::BufferTooSmall | Error::MaxFrameSize | Error::MaxMessageSize => {
                CloseStatus::MessageTooBig
            }

            Error::UnexpectedEndOfStream | Error::FromUtf8Error { .. } => {
                CloseStatus::InvalidPayloadData
            }

            Error::Cancelled | Error::Timeout { .. } => CloseStatus::EndpointUnavailable,

            _ => CloseStatus::InternalServerError,
        }
    }
}
