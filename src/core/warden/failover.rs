// src/core/warden/failover.rs

//! The failover state machine (§4.5.1): `WaitStart -> SelectReplica ->
//! SendReplicaofNoOne -> WaitPromotion -> ReconfReplicas -> UpdateConfig ->
//! None`. Each step is advanced from `monitor.rs`'s tick handler, which owns
//! the actual socket I/O; this module decides *when* to advance and *what*
//! command to send next, returning an `Action` the caller executes.

use super::events::Event;
use super::instance::{FailoverState, PrimaryConfig, PrimaryRecord, StatusFlags};
use super::quorum;
use crate::core::protocol::RespFrame;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// §4.5 "to avoid split votes": a freshly-started or just-deferred election
/// is randomly smeared across this window.
pub const MAX_DESYNC: Duration = Duration::from_millis(1000);

/// Something the monitor tick must do as a result of advancing the FSM.
/// Kept side-effect-free here so the state machine itself stays unit
/// testable without any connections.
pub enum Action {
    None,
    ElectedLeader,
    AbortNotElected,
    SendReplicaofNoOneTo { run_id: String },
    PollPromotedReplicaInfo { run_id: String },
    SendReplicaofBundleToReplica { run_id: String, new_primary_addr: (String, u16) },
    AbortNoGoodReplica,
}

/// §4.5 step 1: begins the FSM for a primary that has just reached ODOWN.
/// No-op if a failover is already running or the previous one ended too
/// recently (`failover_timeout`, §4.5 guard). Bumps `current_epoch` into
/// `failover_epoch` and casts our own leader vote for ourselves — the
/// caller persists this before the bump is observable (§7).
pub fn try_start(primary: &mut PrimaryRecord, my_run_id: &str, new_epoch: u64, now: Instant) -> bool {
    if primary.failover_state != FailoverState::None {
        return false;
    }
    if let Some(last_end) = primary.last_failover_end_time
        && now.duration_since(last_end) < primary.config.failover_timeout
        && !primary.flags.contains(StatusFlags::FORCE_FAILOVER)
    {
        return false;
    }
    primary.failover_state = FailoverState::WaitStart;
    primary.failover_state_change_time = Some(now);
    primary.failover_start_time = Some(now + jitter());
    primary.flags.insert(StatusFlags::FAILOVER_IN_PROGRESS);
    primary.failover_epoch = new_epoch;
    primary.leader_run_id = Some(my_run_id.to_string());
    primary.leader_epoch = Some(new_epoch);
    primary
        .votes_received
        .insert(my_run_id.to_string(), (my_run_id.to_string(), new_epoch));
    if primary.flags.contains(StatusFlags::SIMULATE_CRASH_AFTER_ELECTION) {
        debug!(
            "simulate-failure crash-after-election: would have crashed here for primary '{}'",
            primary.name
        );
    }
    true
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_DESYNC.as_millis() as u64))
}

/// §4.5 self-vote recorded for someone else (§7 "self-vote recorded"):
/// delays our own next failover attempt so the sentinel we voted for gets a
/// chance to lead first.
pub fn defer_own_attempt(primary: &mut PrimaryRecord, now: Instant) {
    primary.failover_start_time = Some(now + jitter());
}

/// Advances the FSM by (at most) one transition per call and returns the
/// action the caller should perform. Call once per tick while a failover is
/// in progress.
pub fn advance(
    primary: &mut PrimaryRecord,
    my_run_id: &str,
    election_timeout: Duration,
    ping_period: Duration,
    info_period: Duration,
    now: Instant,
) -> Action {
    match primary.failover_state {
        FailoverState::None => Action::None,

        FailoverState::WaitStart => {
            let tally = quorum::tally_votes_for(primary.votes_received.values(), primary.failover_epoch);
            let voters = primary.sentinels.len() as u32 + 1;
            let majority = voters / 2 + 1;
            let required = majority.max(primary.config.quorum);
            let winner = tally
                .iter()
                .max_by_key(|(_, &count)| count)
                .filter(|(_, &count)| count >= required)
                .map(|(candidate, _)| candidate.clone());
            let is_leader = winner.as_deref() == Some(my_run_id);
            let forced = primary.flags.contains(StatusFlags::FORCE_FAILOVER);

            if is_leader || forced {
                info!("elected leader for failover of primary '{}'", primary.name);
                primary.failover_state = FailoverState::SelectReplica;
                primary.failover_state_change_time = Some(now);
                return Action::ElectedLeader;
            }

            let deadline = election_timeout.min(primary.config.failover_timeout);
            if let Some(start) = primary.failover_start_time
                && now.duration_since(start) > deadline
            {
                warn!(
                    "failover of primary '{}' aborted: not elected leader",
                    primary.name
                );
                abort(primary, now);
                return Action::AbortNotElected;
            }
            Action::None
        }

        FailoverState::SelectReplica => match primary.select_promotion_candidate(now, ping_period, info_period) {
            Some(run_id) => {
                info!("selected {} for promotion on primary '{}'", run_id, primary.name);
                primary.promoted_replica = Some(run_id.clone());
                primary.failover_state = FailoverState::SendReplicaofNoOne;
                primary.failover_state_change_time = Some(now);
                Action::SendReplicaofNoOneTo { run_id }
            }
            None => {
                warn!("no suitable replica to promote for primary '{}'", primary.name);
                abort(primary, now);
                Action::AbortNoGoodReplica
            }
        },

        FailoverState::SendReplicaofNoOne => {
            if let Some(run_id) = primary.promoted_replica.clone() {
                primary.failover_state = FailoverState::WaitPromotion;
                primary.failover_state_change_time = Some(now);
                Action::PollPromotedReplicaInfo { run_id }
            } else {
                abort(primary, now);
                Action::AbortNoGoodReplica
            }
        }

        FailoverState::WaitPromotion => {
            let Some(run_id) = primary.promoted_replica.clone() else {
                abort(primary, now);
                return Action::AbortNoGoodReplica;
            };
            let promoted = primary
                .replicas
                .get(&run_id)
                .map(|r| r.flags.contains(StatusFlags::PROMOTED))
                .unwrap_or(false);
            if promoted {
                primary.failover_state = FailoverState::ReconfReplicas;
                primary.failover_state_change_time = Some(now);
                primary
                    .replicas_reconfiguring
                    .extend(primary.replicas.keys().filter(|k| **k != run_id).cloned());
                Action::PollPromotedReplicaInfo { run_id }
            } else if let Some(change) = primary.failover_state_change_time
                && now.duration_since(change) > elapsed_wait_promotion_timeout(&primary.config)
            {
                warn!(
                    "timed out waiting for promotion of {} on primary '{}'",
                    run_id, primary.name
                );
                abort(primary, now);
                Action::AbortNoGoodReplica
            } else {
                Action::PollPromotedReplicaInfo { run_id }
            }
        }

        FailoverState::ReconfReplicas => {
            let Some(run_id) = primary.promoted_replica.clone() else {
                abort(primary, now);
                return Action::AbortNoGoodReplica;
            };
            let new_addr = primary
                .replicas
                .get(&run_id)
                .map(|r| (r.addr.ip.clone(), r.addr.port));
            match primary.replicas_reconfiguring.iter().next().cloned() {
                Some(target) if new_addr.is_some() => {
                    primary.replicas_reconfiguring.remove(&target);
                    Action::SendReplicaofBundleToReplica {
                        run_id: target,
                        new_primary_addr: new_addr.unwrap(),
                    }
                }
                _ => {
                    primary.failover_state = FailoverState::UpdateConfig;
                    primary.failover_state_change_time = Some(now);
                    Action::None
                }
            }
        }

        FailoverState::UpdateConfig => {
            finish(primary, now);
            Action::None
        }
    }
}

fn elapsed_wait_promotion_timeout(config: &PrimaryConfig) -> Duration {
    config.failover_timeout / 2
}

fn abort(primary: &mut PrimaryRecord, now: Instant) {
    primary.reset_failover_state();
    primary.last_failover_end_time = Some(now);
}

/// §4.5.1 final step: promotes the candidate to be the tracked primary
/// address/run id and clears the FSM. The old primary record itself is
/// demoted to a replica by the caller once it rejoins (§4.3.3 re-detection).
fn finish(primary: &mut PrimaryRecord, now: Instant) {
    if let Some(run_id) = primary.promoted_replica.clone()
        && let Some(replica) = primary.replicas.get(&run_id)
    {
        let old_addr = primary.addr.to_string();
        let new_addr_str = replica.addr.to_string();
        primary.addr = replica.addr.clone();
        primary.run_id = Some(run_id.clone());
        primary.config_epoch = primary.failover_epoch.max(primary.config_epoch);
        primary.replicas.shift_remove(&run_id);
        info!(
            "failover for '{}' complete: {} -> {}",
            primary.name, old_addr, new_addr_str
        );
        if primary.flags.contains(StatusFlags::SIMULATE_CRASH_AFTER_PROMOTION) {
            debug!(
                "simulate-failure crash-after-promotion: would have crashed here for primary '{}'",
                primary.name
            );
        }
    }
    primary.last_failover_end_time = Some(now);
    primary.reset_failover_state();
}

pub fn switch_master_event(primary: &PrimaryRecord, old_addr: String) -> Event {
    Event::SwitchMaster {
        master: primary.name.clone(),
        old: old_addr,
        new: primary.addr.to_string(),
    }
}

pub fn replicaof_no_one_frame() -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("REPLICAOF".into()),
        RespFrame::BulkString("NO".into()),
        RespFrame::BulkString("ONE".into()),
    ])
}

pub fn replicaof_frame(ip: &str, port: u16) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString("REPLICAOF".into()),
        RespFrame::BulkString(ip.to_string().into()),
        RespFrame::BulkString(port.to_string().into()),
    ])
}
