//! Parsing, negotiation and re-serialization of `Sec-WebSocket-Extensions:
//! permessage-deflate` (RFC 7692), per §4.8.

use crate::error::Error;
use crate::http::HeaderMap;

const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

/// How this endpoint answers a peer's no-context-takeover request for one
/// direction of the stream (client->server or server->client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextTakeoverPolicy {
    /// Accept the peer's request if offered; otherwise keep context.
    #[default]
    Allow,
    /// Reject the handshake outright if the peer asks for no-context-takeover.
    DontAllow,
    /// Always answer with no-context-takeover, regardless of the offer.
    ForceDisabled,
}

/// One direction's resolved no-context-takeover outcome, per §4.8's table.
pub(crate) fn negotiate_direction(
    offered: bool,
    policy: ContextTakeoverPolicy,
) -> Result<bool, Error> {
    match (offered, policy) {
        (_, ContextTakeoverPolicy::ForceDisabled) => Ok(true),
        (true, ContextTakeoverPolicy::DontAllow) => Err(Error::InvalidOperation(
            "peer requires no-context-takeover but this endpoint disallows it".into(),
        )),
        (offered, _) => Ok(offered),
    }
}

/// A parsed or to-be-sent `permessage-deflate` offer/answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    pub permessage_deflate: bool,
    pub client_no_context_takeover: bool,
    pub server_no_context_takeover: bool,
    pub client_max_window_bits: Option<u8>,
    pub server_max_window_bits: Option<u8>,
}

/// Parses a single `Sec-WebSocket-Extensions` header value. Returns `None`
/// if the value doesn't include `permessage-deflate` at all; errors if a
/// `max_window_bits` parameter carries an explicit value outside RFC
/// 7692 §7.1.2.2's 8-15 range.
pub fn parse_extensions(value: &str) -> Result<Option<Extensions>, Error> {
    let mut extensions = Extensions::default();

    for param in value.split(';') {
        let param = param.trim();
        if param == PERMESSAGE_DEFLATE {
            extensions.permessage_deflate = true;
        } else if param.starts_with(CLIENT_NO_CONTEXT_TAKEOVER) {
            extensions.client_no_context_takeover = true;
        } else if param.starts_with(SERVER_NO_CONTEXT_TAKEOVER) {
            extensions.server_no_context_takeover = true;
        } else if let Some(bits) = param.strip_prefix(CLIENT_MAX_WINDOW_BITS) {
            extensions.client_max_window_bits = parse_window_bits(bits)?;
        } else if let Some(bits) = param.strip_prefix(SERVER_MAX_WINDOW_BITS) {
            extensions.server_max_window_bits = parse_window_bits(bits)?;
        }
    }

    Ok(extensions.permessage_deflate.then_some(extensions))
}

/// `rest` is whatever follows `client_max_window_bits`/`server_max_window_bits`
/// in a parameter list: either empty (bare parameter, no explicit bits) or
/// `=N`. A bare parameter resolves to the default of 15; an explicit value
/// must parse as an integer in 8..=15.
fn parse_window_bits(rest: &str) -> Result<Option<u8>, Error> {
    let rest = rest.trim();
    let Some(value) = rest.strip_prefix('=') else {
        return Ok(Some(15));
    };
    let bits: u8 = value
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| Error::InvalidMaxWindowBits)?;
    if (8..=15).contains(&bits) {
        Ok(Some(bits))
    } else {
        Err(Error::InvalidMaxWindowBits)
    }
}

/// Scans every `Sec-WebSocket-Extensions` header value (there may be
/// several, or one comma-free-per-header per RFC 7230 folding rules) for
/// the first `permessage-deflate` offer.
pub fn extensions_from_headers(headers: &HeaderMap) -> Result<Option<Extensions>, Error> {
    for value in headers.get_all("Sec-WebSocket-Extensions") {
        if let Some(extensions) = parse_extensions(value)? {
            return Ok(Some(extensions));
        }
    }
    Ok(None)
}

/// Given the client's offer and this server's configured policy, computes
/// the answer this server sends back, or `None` if deflate isn't enabled
/// locally or wasn't offered.
pub fn answer_extensions(
    offer: Option<&Extensions>,
    enabled: bool,
    client_policy: ContextTakeoverPolicy,
    server_policy: ContextTakeoverPolicy,
) -> Result<Option<Extensions>, Error> {
    let Some(offer) = offer else {
        return Ok(None);
    };
    if !enabled || !offer.permessage_deflate {
        return Ok(None);
    }

    Ok(Some(Extensions {
        permessage_deflate: true,
        client_no_context_takeover: negotiate_direction(
            offer.client_no_context_takeover,
            client_policy,
        )?,
        server_no_context_takeover: negotiate_direction(
            offer.server_no_context_takeover,
            server_policy,
        )?,
        client_max_window_bits: offer.client_max_window_bits,
        server_max_window_bits: offer.server_max_window_bits,
    }))
}

/// Appends a `Sec-WebSocket-Extensions` header to `headers` describing
/// `extensions`; a no-op if `extensions` is `None`.
pub fn add_extension_headers(headers: &mut HeaderMap, extensions: Option<&Extensions>) {
    let Some(extensions) = extensions else {
        return;
    };
    if !extensions.permessage_deflate {
        return;
    }

    let mut value = PERMESSAGE_DEFLATE.to_string();
    if extensions.client_no_context_takeover {
        value.push_str("; ");
        value.push_str(CLIENT_NO_CONTEXT_TAKEOVER);
    }
    if extensions.server_no_context_takeover {
        value.push_str("; ");
        value.push_str(SERVER_NO_CONTEXT_TAKEOVER);
    }
    if let Some(bits) = extensions.client_max_window_bits {
        value.push_str(&format!("; {}={}", CLIENT_MAX_WINDOW_BITS, bits));
    }
    if let Some(bits) = extensions.server_max_window_bits {
        value.push_str(&format!("; {}={}", SERVER_MAX_WINDOW_BITS, bits));
    }
    headers.append("Sec-WebSocket-Extensions", value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_permessage_deflate() {
        let extensions = parse_extensions("permessage-deflate").unwrap().unwrap();
        assert!(extensions.permessage_deflate);
        assert!(!extensions.client_no_context_takeover);
    }

    #[test]
    fn parses_context_takeover_params() {
        let extensions = parse_extensions(
            "permessage-deflate; client_no_context_takeover; server_no_context_takeover",
        )
        .unwrap()
        .unwrap();
        assert!(extensions.client_no_context_takeover);
        assert!(extensions.server_no_context_takeover);
    }

    #[test]
    fn parses_window_bits_with_and_without_value() {
        let extensions =
            parse_extensions("permessage-deflate; client_max_window_bits=10; server_max_window_bits")
                .unwrap()
                .unwrap();
        assert_eq!(extensions.client_max_window_bits, Some(10));
        assert_eq!(extensions.server_max_window_bits, Some(15));
    }

    #[test]
    fn rejects_window_bits_outside_valid_range() {
        assert!(parse_extensions("permessage-deflate; client_max_window_bits=7").is_err());
        assert!(parse_extensions("permessage-deflate; client_max_window_bits=16").is_err());
        assert!(parse_extensions("permessage-deflate; client_max_window_bits=not-a-number").is_err());
    }

    #[test]
    fn non_deflate_extension_yields_none() {
        assert!(parse_extensions("some-other-extension").unwrap().is_none());
    }

    #[test]
    fn allow_accepts_offered_no_context_takeover() {
        assert_eq!(
            negotiate_direction(true, ContextTakeoverPolicy::Allow).unwrap(),
            true
        );
    }

    #[test]
    fn allow_leaves_context_when_not_offered() {
        assert_eq!(
            negotiate_direction(false, ContextTakeoverPolicy::Allow).unwrap(),
            false
        );
    }

    #[test]
    fn dont_allow_rejects_offered_no_context_takeover() {
        assert!(negotiate_direction(true, ContextTakeoverPolicy::DontAllow).is_err());
    }

    #[test]
    fn dont_allow_accepts_when_not_offered() {
        assert_eq!(
            negotiate_direction(false, ContextTakeoverPolicy::DontAllow).unwrap(),
            false
        );
    }

    #[test]
    fn force_disabled_always_sets_no_context_takeover() {
        assert_eq!(
            negotiate_direction(false, ContextTakeoverPolicy::ForceDisabled).unwrap(),
            true
        );
        assert_eq!(
            negotiate_direction(true, ContextTakeoverPolicy::ForceDisabled).unwrap(),
            true
        );
    }

    #[test]
    fn answer_extensions_merges_both_directions() {
        let offer = Extensions {
            permessage_deflate: true,
            client_no_context_takeover: true,
            server_no_context_takeover: false,
            client_max_window_bits: Some(12),
            server_max_window_bits: None,
        };
        let answer = answer_extensions(
            Some(&offer),
            true,
            ContextTakeoverPolicy::Allow,
            ContextTakeoverPolicy::ForceDisabled,
        )
        .unwrap()
        .unwrap();
        assert!(answer.client_no_context_takeover);
        assert!(answer.server_no_context_takeover);
        assert_eq!(answer.client_max_window_bits, Some(12));
    }

    #[test]
    fn answer_extensions_none_when_disabled_locally() {
        let offer = Extensions {
            permessage_deflate: true,
            ..Default::default()
        };
        let answer = answer_extensions(
            Some(&offer),
            false,
            ContextTakeoverPolicy::Allow,
            ContextTakeoverPolicy::Allow,
        )
        .unwrap();
        assert!(answer.is_none());
    }

    #[test]
    fn add_extension_headers_round_trips_through_parse() {
        let extensions = Extensions {
            permessage_deflate: true,
            client_no_context_takeover: true,
            server_no_context_takeover: false,
            client_max_window_bits: Some(10),
            server_max_window_bits: None,
        };
        let mut headers = HeaderMap::new();
        add_extension_headers(&mut headers, Some(&extensions));
        let parsed = extensions_from_headers(&headers).unwrap().unwrap();
        assert_eq!(parsed, extensions);
    }

    #[test]
    fn add_extension_headers_is_noop_for_none() {
        let mut headers = HeaderMap::new();
        add_extension_headers(&mut headers, None);
        assert!(headers.get("Sec-WebSocket-Extensions").is_none());
    }
}
