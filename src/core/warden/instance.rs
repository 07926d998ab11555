// src/core/warden/instance.rs

//! The per-instance bookkeeping records Warden keeps for a monitored primary,
//! its replicas, and the peer sentinels that watch the same primary (§3,
//! §4.3–§4.7). Replicas and peer sentinels are owned directly inside their
//! primary's maps rather than living in a shared arena: Rust's ownership
//! already guarantees a replica record cannot outlive the primary record that
//! holds it, which is the property the original's manual refcounted
//! `sentinelRedisInstance` arena exists to provide.

use super::link::InstanceLink;
use super::address::Address;
use bitflags::bitflags;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;

bitflags! {
    /// Per-instance status flags (§3), mirroring the original's
    /// `SRI_*` flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        const S_DOWN                 = 1 << 0;
        const O_DOWN                 = 1 << 1;
        const PROMOTED               = 1 << 2;
        const RECONF_SENT            = 1 << 3;
        const RECONF_INPROG          = 1 << 4;
        const RECONF_DONE            = 1 << 5;
        const FAILOVER_IN_PROGRESS   = 1 << 6;
        const FORCE_FAILOVER         = 1 << 7;
        const SCRIPT_KILL_SENT       = 1 << 8;
        const PRIMARY_REBOOTING      = 1 << 9;
        const PRIMARY_DOWN_FROM_PEER = 1 << 10;
        /// `SENTINEL SIMULATE-FAILURE crash-after-election` (§B): asserts
        /// property 9 (persist-before-act) by logging instead of crashing.
        const SIMULATE_CRASH_AFTER_ELECTION = 1 << 11;
        /// `SENTINEL SIMULATE-FAILURE crash-after-promotion` (§B).
        const SIMULATE_CRASH_AFTER_PROMOTION = 1 << 12;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Primary,
    Replica,
}

/// The failover state machine (§4.5.1), in the exact state names the
/// specification uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    None,
    WaitStart,
    SelectReplica,
    SendReplicaofNoOne,
    WaitPromotion,
    ReconfReplicas,
    UpdateConfig,
}

impl Default for FailoverState {
    fn default() -> Self {
        FailoverState::None
    }
}

/// Fields parsed out of a replica/primary's last `INFO` reply (§4.3.3).
#[derive(Debug, Clone, Default)]
pub struct InfoSnapshot {
    pub role: Option<Role>,
    pub run_id: Option<String>,
    pub replication_offset: u64,
    pub primary_host: Option<String>,
    pub primary_port: Option<u16>,
    pub primary_link_status_ok: bool,
    /// `master_link_down_since_seconds`: how long (per the replica's own
    /// clock) it has reported its link to its primary as down. Feeds the
    /// §4.5.1 candidacy bound on stale replicas.
    pub primary_link_down_since_seconds: Option<u64>,
    pub replica_priority: u32,
    pub replica_repl_offset: u64,
    pub connected_replicas: Vec<ReplicaInfoLine>,
}

/// One `slaveN:ip=...,port=...,state=...,offset=...` line from a primary's
/// `INFO` reply.
#[derive(Debug, Clone)]
pub struct ReplicaInfoLine {
    pub ip: String,
    pub port: u16,
    pub offset: u64,
}

/// A replica of a monitored primary.
pub struct ReplicaRecord {
    pub addr: Address,
    pub run_id: Option<String>,
    pub link: InstanceLink,
    pub flags: StatusFlags,
    pub info: InfoSnapshot,
    pub priority: u32,
    pub down_since: Option<Instant>,
    pub last_info_time: Option<Instant>,
    /// What the primary's own `slaveN:` line in its INFO reply claims this
    /// replica's announced address is; used to detect a replica that has
    /// moved without Warden's knowledge (§4.3.3).
    pub announced_by_primary_as: Option<Address>,
}

impl ReplicaRecord {
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            run_id: None,
            link: InstanceLink::new(),
            flags: StatusFlags::empty(),
            info: InfoSnapshot::default(),
            priority: 100,
            down_since: None,
            last_info_time: None,
            announced_by_primary_as: None,
        }
    }
}

/// A peer sentinel watching the same primary. When the same physical
/// sentinel process also watches other primaries Warden monitors, its
/// `InstanceLink` is shared (not its `ReplicaRecord`-equivalent bookkeeping,
/// which stays per-primary since SDOWN/vote state is itself per-primary).
pub struct PeerSentinelRecord {
    pub addr: Address,
    pub run_id: String,
    pub link: Arc<Mutex<InstanceLink>>,
    pub flags: StatusFlags,
    pub last_hello_time: Option<Instant>,
    pub leader_vote: Option<(String, u64)>,
    /// Last time this peer answered an `IS-MASTER-DOWN-BY-ADDR` query we
    /// sent it; a reply older than `5 * ask_period` is stale and its
    /// PRIMARY-DOWN view/vote are cleared (§4.4).
    pub last_is_master_down_reply_time: Option<Instant>,
}

impl PeerSentinelRecord {
    pub fn new(addr: Address, run_id: String, link: Arc<Mutex<InstanceLink>>) -> Self {
        Self {
            addr,
            run_id,
            link,
            flags: StatusFlags::empty(),
            last_hello_time: None,
            leader_vote: None,
            last_is_master_down_reply_time: None,
        }
    }
}

/// Per-primary configuration, overridable from the defaults in
/// SPEC_FULL.md §B.
#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    pub quorum: u32,
    pub down_after_period: std::time::Duration,
    pub failover_timeout: std::time::Duration,
    pub parallel_syncs: u32,
    pub auth_pass: Option<String>,
    pub auth_user: Option<String>,
    pub notification_script: Option<String>,
    pub client_reconfig_script: Option<String>,
    /// §9: how long to wait after a primary reports itself freshly rebooted
    /// before counting it towards `down_after_period`, distinct from the
    /// ordinary link-timeout window. Defaults to `down_after_period` itself.
    pub master_reboot_down_after_period: std::time::Duration,
    /// Command renames (`rename-command`, §6/§9) applied to the frames
    /// Warden sends to this primary's own instances, keyed by the
    /// canonical upper-case command name.
    pub rename_commands: HashMap<String, String>,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            quorum: 2,
            down_after_period: std::time::Duration::from_millis(30_000),
            failover_timeout: std::time::Duration::from_millis(180_000),
            parallel_syncs: 1,
            auth_pass: None,
            auth_user: None,
            notification_script: None,
            client_reconfig_script: None,
            master_reboot_down_after_period: std::time::Duration::from_millis(30_000),
            rename_commands: HashMap::new(),
        }
    }
}

/// Everything Warden tracks about one monitored primary and its entourage.
pub struct PrimaryRecord {
    pub name: String,
    pub addr: Address,
    pub run_id: Option<String>,
    pub link: InstanceLink,
    pub flags: StatusFlags,
    pub info: InfoSnapshot,
    pub config: PrimaryConfig,
    pub config_epoch: u64,
    pub down_since: Option<Instant>,
    pub last_info_time: Option<Instant>,
    pub last_publish_time: Option<Instant>,
    /// §3 "reported role + timestamp of role report": when `info.role` last
    /// *changed* (not merely re-reported). §4.4's second SDOWN clause keys
    /// off how long the primary has been stuck reporting `role:slave`.
    pub role_since: Option<Instant>,
    /// When `PRIMARY_REBOOTING` was last set: the moment an INFO reply
    /// revealed a changed `run_id` while the link was otherwise healthy
    /// (§4.4 third SDOWN clause, §9 `master-reboot-down-after-period`).
    pub reboot_seen_at: Option<Instant>,

    pub replicas: IndexMap<String, ReplicaRecord>,
    pub sentinels: IndexMap<String, PeerSentinelRecord>,

    pub failover_state: FailoverState,
    pub failover_state_change_time: Option<Instant>,
    pub failover_start_time: Option<Instant>,
    /// The epoch of the in-flight failover attempt (§4.5), bumped off the
    /// global `current_epoch` when `try_start` fires.
    pub failover_epoch: u64,
    /// Our own recorded vote for this primary: `(leader_run_id, leader_epoch)`
    /// from §4.5's voting rule — at most one vote per epoch, persisted
    /// before being acted on (§7).
    pub leader_run_id: Option<String>,
    pub leader_epoch: Option<u64>,
    pub promoted_replica: Option<String>,
    /// Votes this sentinel has *collected* from peers, keyed by the voting
    /// sentinel's run id (our own vote is recorded under our own run id
    /// too), mapping to `(candidate_run_id, voted_epoch)` — fed into
    /// `quorum::tally_votes_for` (§4.5 "computing the leader").
    pub votes_received: HashMap<String, (String, u64)>,
    pub last_failover_end_time: Option<Instant>,
    /// Rate-limits `SENTINEL IS-MASTER-DOWN-BY-ADDR` queries to peers to at
    /// most once every `ask_period` (§4.4).
    pub last_ask_time: Option<Instant>,

    /// Replicas still pending the `REPLICAOF` bundle during `ReconfReplicas`
    /// (§4.5.1 step 5), keyed by run id.
    pub replicas_reconfiguring: HashSet<String>,
}

impl PrimaryRecord {
    pub fn new(name: String, addr: Address, config: PrimaryConfig) -> Self {
        Self {
            name,
            addr,
            run_id: None,
            link: InstanceLink::new(),
            flags: StatusFlags::empty(),
            info: InfoSnapshot::default(),
            config,
            config_epoch: 0,
            down_since: None,
            last_info_time: None,
            last_publish_time: None,
            role_since: None,
            reboot_seen_at: None,
            replicas: IndexMap::new(),
            sentinels: IndexMap::new(),
            failover_state: FailoverState::None,
            failover_state_change_time: None,
            failover_start_time: None,
            failover_epoch: 0,
            leader_run_id: None,
            leader_epoch: None,
            promoted_replica: None,
            votes_received: HashMap::new(),
            last_failover_end_time: None,
            last_ask_time: None,
            replicas_reconfiguring: HashSet::new(),
        }
    }

    /// Current externally-visible status, used by `INFO` / `SENTINEL
    /// MASTERS` (§6).
    pub fn status_str(&self) -> &'static str {
        if self.flags.contains(StatusFlags::O_DOWN) {
            "odown"
        } else if self.flags.contains(StatusFlags::S_DOWN) {
            "sdown"
        } else {
            "ok"
        }
    }

    pub fn quorum_reached(&self) -> bool {
        let voters = self.sentinels.len() as u32 + 1;
        let agreeing = self
            .sentinels
            .values()
            .filter(|s| s.flags.contains(StatusFlags::S_DOWN) || s.flags.contains(StatusFlags::PRIMARY_DOWN_FROM_PEER))
            .count() as u32
            + if self.flags.contains(StatusFlags::S_DOWN) { 1 } else { 0 };
        let _ = voters;
        agreeing >= self.config.quorum
    }

    pub fn reset_failover_state(&mut self) {
        self.failover_state = FailoverState::None;
        self.failover_state_change_time = None;
        self.failover_start_time = None;
        self.promoted_replica = None;
        self.votes_received.clear();
        self.replicas_reconfiguring.clear();
        self.flags.remove(
            StatusFlags::FAILOVER_IN_PROGRESS
                | StatusFlags::FORCE_FAILOVER
                | StatusFlags::RECONF_SENT
                | StatusFlags::RECONF_INPROG
                | StatusFlags::RECONF_DONE,
        );
    }

    /// The full §4.5.1 candidacy gate plus selection ordering: not SDOWN,
    /// not ODOWN, not link-disconnected; seen alive within `5 * ping_period`;
    /// INFO refreshed within `5 * ping_period` (while we consider ourselves
    /// SDOWN) or `3 * info_period` otherwise; the replica's self-reported
    /// primary-link-down time bounded by how long *we've* considered our
    /// primary down plus `10 * down_after_period`; priority > 0. Candidates
    /// are ordered by `(priority asc, offset desc, runid asc)` with a NULL
    /// runid sorting after every non-null one (property 8, scenario S5) —
    /// it is still a *candidate*, just the tiebreak loser.
    pub fn select_promotion_candidate(&self, now: Instant, ping_period: Duration, info_period: Duration) -> Option<String> {
        let we_think_primary_is_sdown = self.flags.contains(StatusFlags::S_DOWN);
        let info_recency_bound = if we_think_primary_is_sdown {
            ping_period * 5
        } else {
            info_period * 3
        };
        let our_primary_down_elapsed = self
            .down_since
            .map(|t| now.duration_since(t))
            .unwrap_or(Duration::ZERO);
        let link_down_bound = our_primary_down_elapsed + self.config.down_after_period * 10;

        self.replicas
            .iter()
            .filter(|(_, r)| {
                !r.flags.intersects(StatusFlags::S_DOWN | StatusFlags::O_DOWN)
                    && !r.link.disconnected
                    && r.priority != 0
                    && r.link
                        .last_pong_time
                        .is_some_and(|t| now.duration_since(t) <= ping_period * 5)
                    && r.last_info_time
                        .is_some_and(|t| now.duration_since(t) <= info_recency_bound)
                    && r.info
                        .primary_link_down_since_seconds
                        .map(Duration::from_secs)
                        .is_none_or(|d| d <= link_down_bound)
            })
            .min_by(|(id_a, a), (id_b, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.info.replica_repl_offset.cmp(&a.info.replica_repl_offset))
                    .then_with(|| match (&a.run_id, &b.run_id) {
                        (Some(x), Some(y)) => x.cmp(y),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => id_a.cmp(id_b),
                    })
            })
            .map(|(id, _)| id.clone())
    }
}
