//! Proxy header policy: hop-by-hop stripping and forwarded-chain accumulation

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// X-Forwarded-For header - chain of client addresses seen by each proxy.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// X-Forwarded-Host header - original `Host` requested by the client.
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers meaningful only for a single transport connection.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop (should not be forwarded)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Remove every hop-by-hop header, returning how many values were dropped
pub fn strip_hop_by_hop(headers: &mut HeaderMap) -> usize {
    let mut removed = 0;
    for name in HOP_BY_HOP_HEADERS {
        if let hyper::header::Entry::Occupied(entry) = headers.entry(*name) {
            removed += entry.remove_entry_mult().1.count();
        }
    }
    removed
}

/// Split a `host:port` or `[host]:port` network address.
///
/// Returns `None` for addresses with no port separator or an ambiguous
/// unbracketed IPv6 literal.
pub fn split_host_port(address: &str) -> Option<(&str, &str)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        if port.contains(':') {
            return None;
        }
        return Some((host, port));
    }

    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some((host, port))
}

/// Compute the outbound `X-Forwarded-For` value.
///
/// Existing values are kept byte for byte as a comma separated prefix and the
/// caller's host is appended. Returns `None` when the remote address cannot be
/// split.
pub fn forwarded_for(headers: &HeaderMap, remote_addr: &str) -> Option<HeaderValue> {
    let (client_host, _) = split_host_port(remote_addr)?;

    let mut chain: Vec<u8> = Vec::new();
    for value in headers.get_all(&X_FORWARDED_FOR) {
        chain.extend_from_slice(value.as_bytes());
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(client_host.as_bytes());

    HeaderValue::from_bytes(&chain).ok()
}
