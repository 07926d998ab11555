// src/core/warden/address.rs

//! A resolved `(hostname, ip, port)` triple, with the equality and
//! announce-formatting rules Warden needs when deciding whether two
//! addresses refer to the same instance.

use crate::core::errors::SentinelError;
use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// One monitored instance's network address.
///
/// `ip` is empty when the hostname could not be resolved and unresolved
/// addresses are permitted (see the Open Question in SPEC_FULL.md §C):
/// reconnection attempts opportunistically retry resolution.
#[derive(Debug, Clone)]
pub struct Address {
    pub hostname: String,
    pub ip: String,
    pub port: u16,
}

impl Address {
    /// Resolves `hostname` and builds an `Address`. If resolution fails and
    /// `accept_unresolved` is false, returns `AddressInvalid`. If it fails and
    /// `accept_unresolved` is true, the address is created with an empty IP.
    pub fn create(
        hostname: &str,
        port: u16,
        accept_unresolved: bool,
    ) -> Result<Self, SentinelError> {
        match resolve(hostname, port) {
            Ok(ip) => Ok(Self {
                hostname: hostname.to_string(),
                ip,
                port,
            }),
            Err(e) if accept_unresolved => {
                tracing::debug!(
                    "could not resolve '{hostname}': {e}; keeping unresolved address"
                );
                Ok(Self {
                    hostname: hostname.to_string(),
                    ip: String::new(),
                    port,
                })
            }
            Err(e) => Err(SentinelError::AddressInvalid(format!(
                "cannot resolve '{hostname}': {e}"
            ))),
        }
    }

    /// Re-attempts resolution in place; called opportunistically on reconnect.
    /// No-op if the hostname already carries a resolved IP.
    pub fn reresolve_if_needed(&mut self) {
        if !self.ip.is_empty() {
            return;
        }
        if let Ok(ip) = resolve(&self.hostname, self.port) {
            self.ip = ip;
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, SentinelError> {
        if self.ip.is_empty() {
            return Err(SentinelError::AddressInvalid(format!(
                "address for '{}' is still unresolved",
                self.hostname
            )));
        }
        format!("{}:{}", self.ip, self.port)
            .parse()
            .map_err(|e| SentinelError::AddressInvalid(format!("invalid socket address: {e}")))
    }

    /// Two addresses are equal if ports match and either the IPs match or,
    /// when one/both are unresolved, the hostnames match case-insensitively.
    pub fn equal(a: &Address, b: &Address) -> bool {
        if a.port != b.port {
            return false;
        }
        if !a.ip.is_empty() && !b.ip.is_empty() {
            return a.ip == b.ip;
        }
        a.hostname.eq_ignore_ascii_case(&b.hostname)
    }

    /// Resolves `hostname` and compares it against `self.ip`, falling back to
    /// a case-insensitive hostname comparison if resolution of `hostname`
    /// fails.
    pub fn equals_hostname(&self, hostname: &str) -> bool {
        match resolve(hostname, self.port) {
            Ok(ip) if !self.ip.is_empty() => ip == self.ip,
            _ => self.hostname.eq_ignore_ascii_case(hostname),
        }
    }

    /// Returns the hostname or the IP, according to `announce_hostnames`.
    pub fn announce<'a>(&'a self, announce_hostnames: bool) -> &'a str {
        if announce_hostnames || self.ip.is_empty() {
            &self.hostname
        } else {
            &self.ip
        }
    }

    /// Formats `host:port`, bracketing the host in `[]` if it looks like an
    /// IPv6 literal (contains a `:`).
    pub fn announce_and_port(&self, announce_hostnames: bool) -> String {
        let host = self.announce(announce_hostnames);
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.is_empty() {
            write!(f, "{}:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

fn resolve(hostname: &str, port: u16) -> std::io::Result<String> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    // `ToSocketAddrs` performs blocking DNS resolution (as the teacher's
    // cluster name-resolution path also does via the stdlib); Warden only
    // calls this from within `spawn_blocking`-free contexts on reconnect,
    // which is acceptable since it is rate-limited by `min_link_reconnect_period`.
    (hostname, port)
        .to_socket_addrs()?
        .next()
        .map(|sa| sa.ip().to_string())
        .ok_or_else(|| std::io::Error::other("no addresses found"))
}
