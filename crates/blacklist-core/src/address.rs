//! Parsing and screening of submitted addresses.

use ipnet::IpNet;
use once_cell::sync::Lazy;
use std::net::IpAddr;

use crate::error::{BlacklistError, Result};

/// Ranges that can never be blacklisted: private, loopback, link-local and
/// other special-purpose blocks. Documentation blocks are deliberately absent.
static RESERVED: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/29",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "240.0.0.0/4",
        "255.255.255.255/32",
        "::/128",
        "::1/128",
        "::ffff:0:0/96",
        "100::/64",
        "2001::/23",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

pub fn is_reserved(addr: IpAddr) -> bool {
    RESERVED.iter().any(|net| net.contains(&addr))
}

/// Parse `raw` and return its canonical text form.
///
/// Surrounding whitespace is ignored. IPv6 is compressed and lowercased by
/// the standard formatter, so `2001:DB8::0:1` and `2001:db8::1` share a row.
pub fn canonicalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let addr: IpAddr = trimmed
        .parse()
        .map_err(|_| BlacklistError::InvalidAddress(trimmed.to_string()))?;
    if is_reserved(addr) {
        return Err(BlacklistError::PrivateAddress(addr.to_string()));
    }
    Ok(addr.to_string())
}
