//! Client identity derivation.

/// Derive the rate limit key from a connection's remote address.
///
/// Strips the port from a `host:port` or `[host]:port` address and returns the
/// host. An address that does not parse yields the empty key; every such
/// request then shares one bucket.
pub fn client_key(remote_addr: &str) -> String {
    split_host(remote_addr).unwrap_or_default().to_string()
}

fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        tail.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = addr.rsplit_once(':')?;
    // unbracketed IPv6 is ambiguous
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some(host)
}
