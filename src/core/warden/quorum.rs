// src/core/warden/quorum.rs

//! SDOWN/ODOWN down-detection and the leader-election vote count (§4.4,
//! §4.5). The actual `SENTINEL IS-MASTER-DOWN-BY-ADDR` exchange with peers
//! lives in `monitor.rs` (it needs the link I/O); this module is the pure
//! decision logic so it can be unit tested without any sockets.

use super::instance::{PrimaryRecord, Role, StatusFlags};
use std::time::{Duration, Instant};

/// §4.4 first SDOWN clause: "`now − pending_ping_time > down_after_period`"
/// — a primary is SDOWN once a dispatched ping has gone unanswered for
/// longer than `down_after_period`. `pending_ping_time` is `None` whenever
/// the link is up to date (no ping outstanding), matching the spec's "zero
/// when up-to-date" — including before the very first ping has ever been
/// answered, which is why this must key off the pending ping rather than
/// `last_pong_time` (a primary that never answers its first ping would
/// otherwise never be marked down).
pub fn primary_should_be_sdown(pending_ping_time: Option<Instant>, now: Instant, down_after: Duration) -> bool {
    match pending_ping_time {
        Some(t) => now.duration_since(t) > down_after,
        None => false,
    }
}

/// §4.4 second SDOWN clause: a primary whose reported role has been REPLICA
/// for more than `down_after_period + 2 * info_period` is forced SDOWN even
/// while still answering pings — it has likely been reconfigured (or
/// manually demoted) behind Warden's back.
pub fn primary_role_stuck_as_replica_should_be_sdown(
    role: Option<Role>,
    role_since: Option<Instant>,
    now: Instant,
    down_after: Duration,
    info_period: Duration,
) -> bool {
    matches!(role, Some(Role::Replica))
        && role_since.is_some_and(|t| now.duration_since(t) > down_after + info_period * 2)
}

/// §4.4 third SDOWN clause: a primary that reported a changed `run_id`
/// (detected a reboot) is forced SDOWN once the reboot has outlasted
/// `master_reboot_down_after_period`, even if PINGs are still landing —
/// the window exists to give replicas time to reconnect and resync before
/// Warden trusts the primary's liveness again.
pub fn primary_reboot_should_be_sdown(
    primary_rebooting: bool,
    reboot_seen_at: Option<Instant>,
    now: Instant,
    master_reboot_down_after: Duration,
) -> bool {
    primary_rebooting
        && reboot_seen_at.is_some_and(|t| now.duration_since(t) > master_reboot_down_after)
}

/// §4.3.2: a replica uses double the primary's down-after period before
/// Warden gives up on it, matching the original's more lenient replica
/// timeout.
pub fn replica_down_after(primary_down_after: Duration) -> Duration {
    primary_down_after * 2
}

/// §4.4: ODOWN is reached once the number of sentinels (self included) that
/// consider the primary down meets or exceeds quorum.
pub fn odown_reached(primary: &PrimaryRecord) -> bool {
    if !primary.flags.contains(StatusFlags::S_DOWN) {
        return false;
    }
    let agreeing = primary
        .sentinels
        .values()
        .filter(|s| s.flags.contains(StatusFlags::PRIMARY_DOWN_FROM_PEER))
        .count() as u32
        + 1; // self
    agreeing >= primary.config.quorum
}

/// §4.5 step 1: a leader election may begin once ODOWN holds and enough
/// distinct sentinels are known to ever reach quorum (can't wait forever for
/// peers nobody has discovered).
pub fn can_start_election(primary: &PrimaryRecord) -> bool {
    odown_reached(primary) && (primary.sentinels.len() as u32 + 1) >= primary.config.quorum
}

/// Tally of `IS-MASTER-DOWN-BY-ADDR` vote replies for a specific
/// `(candidate_run_id, epoch)` pair (§4.5 step 1). Each peer votes for at
/// most one candidate per epoch; the first candidate to reach quorum
/// (including our own self-vote) wins.
pub fn tally_votes_for<'a>(
    votes: impl Iterator<Item = &'a (String, u64)>,
    epoch: u64,
) -> std::collections::HashMap<String, u32> {
    let mut tally = std::collections::HashMap::new();
    for (candidate, voted_epoch) in votes {
        if *voted_epoch == epoch {
            *tally.entry(candidate.clone()).or_insert(0u32) += 1;
        }
    }
    tally
}

pub fn election_won(tally: &std::collections::HashMap<String, u32>, quorum: u32, candidate: &str) -> bool {
    tally.get(candidate).copied().unwrap_or(0) >= quorum
}
