// src/core/warden/gossip.rs

//! The peer-sentinel discovery gossip protocol (§4.4): a `hello` message is
//! published on each monitored primary's `__warden__:hello` pub/sub channel
//! every `publish_period`, and every other Warden watching the same primary
//! picks it up over its own pub/sub link to that primary — the primary
//! itself is just the relay, Wardens never talk to each other through it
//! directly for this part.

use super::address::Address;
use super::instance::PeerSentinelRecord;
use super::link::InstanceLink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const HELLO_CHANNEL: &str = "__warden__:hello";

/// The 8 comma-separated fields of a hello message, matching the original
/// wire format byte-for-byte:
/// `sentinel_ip,sentinel_port,sentinel_runid,current_epoch,master_name,master_ip,master_port,master_config_epoch`
pub struct HelloPayload {
    pub sentinel_ip: String,
    pub sentinel_port: u16,
    pub sentinel_run_id: String,
    pub current_epoch: u64,
    pub master_name: String,
    pub master_ip: String,
    pub master_port: u16,
    pub master_config_epoch: u64,
}

impl HelloPayload {
    pub fn format(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.sentinel_ip,
            self.sentinel_port,
            self.sentinel_run_id,
            self.current_epoch,
            self.master_name,
            self.master_ip,
            self.master_port,
            self.master_config_epoch,
        )
    }

    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.split(',');
        let sentinel_ip = parts.next()?.to_string();
        let sentinel_port = parts.next()?.parse().ok()?;
        let sentinel_run_id = parts.next()?.to_string();
        let current_epoch = parts.next()?.parse().ok()?;
        let master_name = parts.next()?.to_string();
        let master_ip = parts.next()?.to_string();
        let master_port = parts.next()?.parse().ok()?;
        let master_config_epoch = parts.next()?.parse().ok()?;
        Some(Self {
            sentinel_ip,
            sentinel_port,
            sentinel_run_id,
            current_epoch,
            master_name,
            master_ip,
            master_port,
            master_config_epoch,
        })
    }
}

/// Outcome of processing one incoming hello message against a primary's
/// known peer-sentinel set, returned so the caller (monitor.rs) can decide
/// whether to open a new direct link and whether the primary's own
/// believed address/epoch needs to move (§4.4, §4.5).
pub enum HelloOutcome {
    /// No action needed (self-originated, or nothing new).
    Ignored,
    /// A new peer sentinel was recorded; caller should open a direct link.
    NewPeer { run_id: String, addr: Address },
    /// The peer's reported config epoch for this primary is newer than ours
    /// and it reports a different master address — a completed failover we
    /// missed (§4.5.1 final step, followed elsewhere).
    PrimaryMoved {
        new_addr: Address,
        new_config_epoch: u64,
    },
}

/// Processes one hello payload against an already-identified primary's peer
/// map. Does not mutate `config_epoch`/`addr` on the primary itself — the
/// caller applies `HelloOutcome::PrimaryMoved` after also checking quorum
/// rules.
pub fn process_hello(
    my_run_id: &str,
    hello: &HelloPayload,
    known_peers: &mut indexmap::IndexMap<String, PeerSentinelRecord>,
    current_config_epoch: u64,
    current_addr: &Address,
    now: Instant,
) -> HelloOutcome {
    if hello.sentinel_run_id == my_run_id {
        return HelloOutcome::Ignored;
    }

    let addr_changed = hello.master_ip != current_addr.ip && !current_addr.ip.is_empty();
    if hello.master_config_epoch > current_config_epoch && addr_changed {
        let new_addr = Address {
            hostname: hello.master_ip.clone(),
            ip: hello.master_ip.clone(),
            port: hello.master_port,
        };
        return HelloOutcome::PrimaryMoved {
            new_addr,
            new_config_epoch: hello.master_config_epoch,
        };
    }

    if let Some(peer) = known_peers.get_mut(&hello.sentinel_run_id) {
        peer.last_hello_time = Some(now);
        debug!("refreshed peer sentinel {}", hello.sentinel_run_id);
        HelloOutcome::Ignored
    } else {
        let addr = Address {
            hostname: hello.sentinel_ip.clone(),
            ip: hello.sentinel_ip.clone(),
            port: hello.sentinel_port,
        };
        HelloOutcome::NewPeer {
            run_id: hello.sentinel_run_id.clone(),
            addr,
        }
    }
}

/// Inserts a newly-discovered peer sentinel, wiring up a fresh link.
pub fn register_new_peer(
    known_peers: &mut indexmap::IndexMap<String, PeerSentinelRecord>,
    run_id: String,
    addr: Address,
    now: Instant,
) {
    let mut record = PeerSentinelRecord::new(addr, run_id.clone(), Arc::new(Mutex::new(InstanceLink::new())));
    record.last_hello_time = Some(now);
    known_peers.insert(run_id, record);
}

/// Drops peer sentinels that have not sent a hello in `hello_timeout`
/// (§4.4: five hello periods, matching the original).
pub fn expire_stale_peers(
    known_peers: &mut indexmap::IndexMap<String, PeerSentinelRecord>,
    now: Instant,
    hello_timeout: std::time::Duration,
) {
    known_peers.retain(|_, peer| {
        peer.last_hello_time
            .is_none_or(|t| now.duration_since(t) < hello_timeout)
    });
}
