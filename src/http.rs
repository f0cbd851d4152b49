//! A minimal, size-bounded HTTP/1.1 parser and writer — just enough to
//! negotiate the WebSocket upgrade on either side. Not a general HTTP
//! server: no chunked transfer-encoding, no pipelining, no content
//! negotiation beyond what the upgrade needs.
//!
//! Header-block framing (finding the `CRLF CRLF` terminator) is hand
//! rolled as a small state machine, bounded at [`MAX_HEADER_SIZE`]; once
//! the terminator is found, the collected bytes are handed to `httparse`
//! for structured parsing of the start line and header fields.

use crate::error::Error;
use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Hard cap on the header block, per `spec.md` §4.4.
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

const MAX_HTTPARSE_HEADERS: usize = 64;

/// An ordered, case-insensitive multimap of header names to value sets.
/// Duplicate headers collapse into one entry whose values preserve
/// insertion order; multi-line continuations (a following line starting
/// with space/tab) are concatenated into the same value with a single
/// space, per `spec.md` §4.4.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Appends a value under `name`, creating the entry (in original case)
    /// if this is the first occurrence, or adding to the existing value
    /// set (preserving the name's first-seen case) otherwise.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.find(name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// Replaces any existing values for `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.find(name) {
            Some(idx) => self.entries[idx].1 = vec![value.into()],
            None => self.entries.push((name.to_string(), vec![value.into()])),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// The first value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|idx| self.entries[idx].1[0].as_str())
    }

    /// All values recorded for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.find(name).map(|idx| self.entries[idx].1.as_slice()).unwrap_or(&[])
    }

    /// Case-insensitive substring match against any comma-separated token
    /// of `name`'s value(s) — used for `Connection: keep-alive, Upgrade`.
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter().any(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub method: String,
    pub path: String,
    pub version: u8,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub status_code: u16,
    pub reason: String,
    pub version: u8,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Reads bytes one at a time looking for `CRLF CRLF`, bounded at
/// `MAX_HEADER_SIZE`. Returns the header block including the terminator.
async fn read_header_block<S: AsyncRead + Unpin>(
    stream: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<Vec<u8>, Error> {
    #[derive(Clone, Copy)]
    enum State {
        Start,
        SawCr,
        SawCrLf,
        SawCrLfCr,
    }

    let mut state = State::Start;
    let mut buf = Vec::new();
    let mut first = true;

    loop {
        if buf.len() >= MAX_HEADER_SIZE {
            return Err(Error::HeaderTooLarge {
                actual: buf.len(),
                max: MAX_HEADER_SIZE,
            });
        }

        let mut byte = [0u8; 1];
        let read = if first {
            first = false;
            match idle_timeout {
                Some(d) => timeout(d, stream.read(&mut byte)).await??,
                None => stream.read(&mut byte).await?,
            }
        } else {
            stream.read(&mut byte).await?
        };

        if read == 0 {
            return Err(Error::UnexpectedEndOfStream);
        }

        let b = byte[0];
        buf.push(b);

        state = match (state, b) {
            (State::Start, b'\r') => State::SawCr,
            (State::SawCr, b'\n') => State::SawCrLf,
            (State::SawCrLf, b'\r') => State::SawCrLfCr,
            (State::SawCrLfCr, b'\n') => break,
            // A `\r` that doesn't complete the terminator may still start
            // a new attempt (e.g. `\r\n\r` followed by another `\r\n`).
            (State::SawCr, b'\r') => State::SawCr,
            (State::SawCrLf, b'\r') => State::SawCrLfCr,
            (State::SawCrLfCr, b'\r') => State::SawCr,
            _ => State::Start,
        };
    }

    Ok(buf)
}

/// Reads a full HTTP request (request line + headers, plus the body if
/// `Content-Length` is present and positive) from `stream`.
///
/// `idle_timeout` bounds only the very first byte read, matching a
/// keep-alive listener that wants to time out idle connections without
/// also timing out a client mid-request.
pub async fn read_request<S: AsyncRead + Unpin>(
    stream: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<HandshakeRequest, Error> {
    let block = read_header_block(stream, idle_timeout).await?;

    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HTTPARSE_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    let status = req.parse(&block)?;
    if status.is_partial() {
        return Err(Error::MalformedStartLine);
    }

    let method = req.method.ok_or(Error::MalformedStartLine)?.to_string();
    let path = req.path.ok_or(Error::MalformedStartLine)?.to_string();
    let version = req.version.ok_or(Error::MalformedStartLine)?;

    let mut headers = HeaderMap::new();
    for h in req.headers.iter() {
        headers.append(h.name, String::from_utf8_lossy(h.value).into_owned());
    }

    let body = read_optional_body(stream, &headers).await?;

    Ok(HandshakeRequest {
        method,
        path,
        version,
        headers,
        body,
    })
}

/// Reads a full HTTP response (status line + headers, plus body if
/// `Content-Length` is present) from `stream`.
pub async fn read_response<S: AsyncRead + Unpin>(
    stream: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<HandshakeResponse, Error> {
    let block = read_header_block(stream, idle_timeout).await?;

    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HTTPARSE_HEADERS];
    let mut resp = httparse::Response::new(&mut raw_headers);
    let status = resp.parse(&block)?;
    if status.is_partial() {
        return Err(Error::MalformedStartLine);
    }

    let status_code = resp.code.ok_or(Error::MalformedStartLine)?;
    let reason = resp.reason.unwrap_or("").to_string();
    let version = resp.version.ok_or(Error::MalformedStartLine)?;

    let mut headers = HeaderMap::new();
    for h in resp.headers.iter() {
        headers.append(h.name, String::from_utf8_lossy(h.value).into_owned());
    }

    let body = read_optional_body(stream, &headers).await?;

    Ok(HandshakeResponse {
        status_code,
        reason,
        version,
        headers,
        body,
    })
}

/// Reads exactly `Content-Length` body bytes if the header is present and
/// parses as a positive integer. Per `spec.md` §4.4, a premature EOF while
/// reading the body surfaces the partial body rather than an error.
async fn read_optional_body<S: AsyncRead + Unpin>(
    stream: &mut S,
    headers: &HeaderMap,
) -> Result<Option<Vec<u8>>, Error> {
    let Some(raw_len) = headers.get("Content-Length") else {
        return Ok(None);
    };
    let len: usize = raw_len.trim().parse().map_err(|_| Error::InvalidContentLength)?;
    if len == 0 {
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = stream.read(&mut body[filled..]).await?;
        if n == 0 {
            body.truncate(filled);
            return Ok(Some(body));
        }
        filled += n;
    }
    Ok(Some(body))
}

/// Serializes a request line, its headers, and a terminating blank line.
pub async fn write_request<S: AsyncWrite + Unpin>(stream: &mut S, request: &HandshakeRequest) -> Result<(), Error> {
    let mut out = format!("{} {} HTTP/1.{}\r\n", request.method, request.path, request.version);
    write_headers(&mut out, &request.headers, false);
    stream.write_all(out.as_bytes()).await?;
    if let Some(body) = &request.body {
        stream.write_all(body).await?;
    }
    Ok(())
}

/// Serializes a status line, its headers, and a terminating blank line. If
/// no `Date` header is present, injects the current RFC 1123-ish (RFC
/// 2822, HTTP-date compatible) timestamp — never overwriting one the
/// caller already set.
pub async fn write_response<S: AsyncWrite + Unpin>(stream: &mut S, response: &HandshakeResponse) -> Result<(), Error> {
    let mut out = format!(
        "HTTP/1.{} {} {}\r\n",
        response.version, response.status_code, response.reason
    );
    write_headers(&mut out, &response.headers, !response.headers.contains("Date"));
    stream.write_all(out.as_bytes()).await?;
    if let Some(body) = &response.body {
        stream.write_all(body).await?;
    }
    Ok(())
}

fn write_headers(out: &mut String, headers: &HeaderMap, inject_date: bool) {
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    if inject_date {
        if let Ok(now) = OffsetDateTime::now_utc().format(&Rfc2822) {
            out.push_str("Date: ");
            out.push_str(&now);
            out.push_str("\r\n");
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_a_minimal_get_request() {
        let raw = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\r\n";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor, None).await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/chat");
        assert_eq!(req.headers.get("host"), Some("example.com"));
        assert!(req.headers.contains_token("upgrade", "websocket"));
    }

    #[tokio::test]
    async fn duplicate_headers_collapse_preserving_order() {
        let raw = b"GET / HTTP/1.1\r\nX-Trace: a\r\nX-Trace: b\r\n\r\n";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor, None).await.unwrap();
        assert_eq!(req.headers.get_all("X-Trace"), &["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn header_block_over_cap_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEADER_SIZE + 10));
        let mut cursor = Cursor::new(raw);
        let err = read_request(&mut cursor, None).await.unwrap_err();
        assert!(matches!(err, Error::HeaderTooLarge { .. }));
    }

    #[tokio::test]
    async fn reads_body_when_content_length_present() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor, None).await.unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn partial_body_on_premature_eof_is_not_an_error() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nhi";
        let mut cursor = Cursor::new(raw.to_vec());
        let req = read_request(&mut cursor, None).await.unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"hi"[..]));
    }

    #[tokio::test]
    async fn write_response_injects_date_when_absent() {
        let mut headers = HeaderMap::new();
        headers.set("Upgrade", "websocket");
        let response = HandshakeResponse {
            status_code: 101,
            reason: "Switching Protocols".to_string(),
            version: 1,
            headers,
            body: None,
        };
        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Date: "));
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    }

    #[tokio::test]
    async fn write_response_never_overwrites_existing_date() {
        let mut headers = HeaderMap::new();
        headers.set("Date", "Tue, 15 Nov 1994 08:12:31 GMT");
        let response = HandshakeResponse {
            status_code: 200,
            reason: "OK".to_string(),
            version: 1,
            headers,
            body: None,
        };
        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Date:").count(), 1);
        assert!(text.contains("Tue, 15 Nov 1994 08:12:31 GMT"));
    }
}
