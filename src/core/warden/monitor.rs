// src/core/warden/monitor.rs

//! The per-primary monitor tick (§4.3): reconnects stale links, drains
//! replies/pub-sub traffic, runs down-detection, drives the gossip and
//! failover state machines, and emits events. One call to `tick()` per
//! primary per `ping_period` is the entire monitoring loop — there are no
//! detached reader tasks (see `link.rs`).

use super::address::Address;
use super::events::Event;
use super::failover::{self, Action as FailoverAction};
use super::gossip::{self, HelloOutcome, HelloPayload};
use super::info_parser::parse_info;
use super::instance::{FailoverState, InfoSnapshot, PrimaryRecord, ReplicaRecord, Role, StatusFlags};
use super::link::{self, PendingReply};
use super::persistence;
use super::quorum;
use super::state::GlobalWardenState;
use crate::core::protocol::RespFrame;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const PING_PERIOD: Duration = Duration::from_millis(1000);
pub const INFO_PERIOD: Duration = Duration::from_millis(10_000);
pub const PUBLISH_PERIOD: Duration = Duration::from_millis(2000);
pub const MIN_LINK_RECONNECT_PERIOD: Duration = Duration::from_millis(15_000);
pub const ASK_PERIOD: Duration = Duration::from_millis(1000);
pub const ELECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Runs one tick of monitoring for a single primary. Called in a loop by
/// the owning task at roughly `PING_PERIOD` resolution.
///
/// `tilt_active` gates the acting half only (§4.6): while TILT holds, the
/// monitoring half below still reconnects links and parses INFO/hello
/// traffic as usual, but down-detection and the failover FSM are skipped
/// entirely for this tick.
pub async fn tick(global: &GlobalWardenState, primary_name: &str, now: Instant, tilt_active: bool) {
    let Some(primary_arc) = global.get_master(primary_name) else {
        return;
    };

    let (addr, min_reconnect) = {
        let p = primary_arc.lock();
        (p.addr.clone(), MIN_LINK_RECONNECT_PERIOD)
    };

    reconnect_primary_link(&primary_arc, &addr, now, min_reconnect, &global.my_run_id).await;

    drain_primary_command_replies(&primary_arc, now);
    drain_primary_pubsub(global, &primary_arc, now);

    send_periodic_commands(global, &primary_arc, now).await;

    reconnect_and_poll_replicas(&primary_arc, now, min_reconnect, &global.my_run_id).await;
    reconnect_and_poll_peers(global, &primary_arc, now, min_reconnect).await;

    if tilt_active {
        return;
    }

    run_down_detection(global, &primary_arc, now).await;
    run_failover_driver(global, &primary_arc, now).await;
}

async fn reconnect_primary_link(
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    addr: &Address,
    now: Instant,
    min_reconnect: Duration,
    my_run_id: &str,
) {
    let mut addr = addr.clone();
    addr.reresolve_if_needed();
    let auth = {
        let p = primary_arc.lock();
        p.config
            .auth_pass
            .clone()
            .map(|pass| (p.config.auth_user.clone().unwrap_or_default(), pass))
    };
    connect_locked(primary_arc, &addr, now, min_reconnect, auth, my_run_id).await;
}

// `parking_lot::Mutex` is not async-aware, so a reconnect attempt swaps the
// link out of the record, drives it unlocked, then swaps it back — no lock
// is ever held across an `.await`.
async fn connect_locked(
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    addr: &Address,
    now: Instant,
    min_reconnect: Duration,
    auth: Option<(String, String)>,
    my_run_id: &str,
) {
    let disconnected = { primary_arc.lock().link.disconnected };
    if !disconnected {
        return;
    }
    let mut tmp_link = super::link::InstanceLink::new();
    std::mem::swap(&mut tmp_link, &mut primary_arc.lock().link);
    tmp_link
        .reconnect_if_needed(
            addr,
            true,
            now,
            min_reconnect,
            auth.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
            my_run_id,
            gossip::HELLO_CHANNEL,
        )
        .await;
    std::mem::swap(&mut tmp_link, &mut primary_arc.lock().link);
}

fn drain_primary_command_replies(
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
) {
    let mut p = primary_arc.lock();
    let replies = p.link.drain_command_replies();
    for (kind, frame) in replies {
        match kind {
            PendingReply::Ping => {
                if matches!(frame, RespFrame::SimpleString(_)) {
                    handle_primary_pong(&mut p, now);
                }
            }
            PendingReply::Info => {
                if let RespFrame::BulkString(bs) = frame {
                    let snapshot = parse_info(&String::from_utf8_lossy(&bs));
                    apply_primary_info(&mut p, snapshot, now);
                }
            }
            _ => {}
        }
    }
}

/// A PING reply landed: the primary is alive. Clears the reboot-detection
/// window too, since a stable PONG is exactly the "P stays up" half of the
/// reboot clause in §4.4 — the forced-SDOWN half only ever fires if no PONG
/// arrives before `master_reboot_down_after_period` elapses.
fn handle_primary_pong(p: &mut PrimaryRecord, now: Instant) {
    p.link.last_pong_time = Some(now);
    if p.down_since.is_some() {
        info!("primary '{}' is back up", p.name);
    }
    p.down_since = None;
    if p.flags.contains(StatusFlags::PRIMARY_REBOOTING) {
        info!("primary '{}' confirmed up after reboot, clearing reboot flag", p.name);
        p.flags.remove(StatusFlags::PRIMARY_REBOOTING);
        p.reboot_seen_at = None;
    }
}

fn apply_primary_info(p: &mut PrimaryRecord, snap: InfoSnapshot, now: Instant) {
    if let Some(run_id) = &snap.run_id {
        if let Some(old_id) = &p.run_id
            && old_id != run_id
        {
            warn!("primary '{}' reports a new run id, assuming a reboot", p.name);
            p.flags.insert(StatusFlags::PRIMARY_REBOOTING);
            p.reboot_seen_at = Some(now);
        }
        p.run_id = Some(run_id.clone());
    }
    if snap.role != p.info.role {
        p.role_since = Some(now);
    }
    for line in &snap.connected_replicas {
        let addr = Address {
            hostname: line.ip.clone(),
            ip: line.ip.clone(),
            port: line.port,
        };
        let existing = p
            .replicas
            .values_mut()
            .find(|r| Address::equal(&r.addr, &addr));
        if let Some(r) = existing {
            r.info.replica_repl_offset = line.offset;
            r.announced_by_primary_as = Some(addr);
        } else {
            let key = format!("{}:{}", line.ip, line.port);
            let mut r = ReplicaRecord::new(addr.clone());
            r.announced_by_primary_as = Some(addr);
            r.info.replica_repl_offset = line.offset;
            p.replicas.insert(key, r);
        }
    }
    p.info = snap;
    p.last_info_time = Some(Instant::now());
}

fn drain_primary_pubsub(
    global: &GlobalWardenState,
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
) {
    let mut p = primary_arc.lock();
    let messages = p.link.drain_pubsub_messages(now);
    for (channel, payload) in messages {
        if channel != gossip::HELLO_CHANNEL {
            continue;
        }
        let Some(hello) = HelloPayload::parse(&payload) else {
            continue;
        };
        let outcome = gossip::process_hello(
            &global.my_run_id,
            &hello,
            &mut p.sentinels,
            p.config_epoch,
            &p.addr,
            now,
        );
        match outcome {
            HelloOutcome::NewPeer { run_id, addr } => {
                info!("discovered peer sentinel {} at {}", run_id, addr);
                gossip::register_new_peer(&mut p.sentinels, run_id, addr, now);
            }
            HelloOutcome::PrimaryMoved { new_addr, new_config_epoch } => {
                let old = p.addr.to_string();
                let (old_ip, old_port) = (p.addr.ip.clone(), p.addr.port);
                p.addr = new_addr;
                p.config_epoch = new_config_epoch;
                p.reset_failover_state();
                let new = p.addr.to_string();
                if let Some(script) = &p.config.client_reconfig_script {
                    global.scripts.lock().enqueue_client_reconfig(
                        script,
                        &p.name,
                        "observer",
                        &old_ip,
                        old_port,
                        &p.addr.ip,
                        p.addr.port,
                    );
                }
                publish(global, &p, Event::SwitchMaster { master: p.name.clone(), old, new });
            }
            HelloOutcome::Ignored => {}
        }
    }
}

async fn send_periodic_commands(
    global: &GlobalWardenState,
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
) {
    let (need_ping, need_info, need_publish, announce_addr, config_epoch, name, addr) = {
        let p = primary_arc.lock();
        let need_ping = p
            .link
            .last_command_sent_time
            .is_none_or(|t| now.duration_since(t) >= PING_PERIOD);
        let need_info = p
            .last_info_time
            .is_none_or(|t| now.duration_since(t) >= INFO_PERIOD);
        let need_publish = p
            .last_publish_time
            .is_none_or(|t| now.duration_since(t) >= PUBLISH_PERIOD);
        (
            need_ping,
            need_info,
            need_publish,
            global.settings.announce_addr,
            p.config_epoch,
            p.name.clone(),
            p.addr.clone(),
        )
    };

    if need_info {
        let mut p = primary_arc.lock();
        let frame = link::apply_rename(link::info_frame(), &p.config.rename_commands);
        p.link.send_command(frame, PendingReply::Info, now).await;
    } else if need_ping {
        let mut p = primary_arc.lock();
        let frame = link::apply_rename(link::ping_frame(), &p.config.rename_commands);
        p.link.send_command(frame, PendingReply::Ping, now).await;
    }

    if need_publish && let Some(announce) = announce_addr {
        let hello = HelloPayload {
            sentinel_ip: announce.ip().to_string(),
            sentinel_port: announce.port(),
            sentinel_run_id: global.my_run_id.clone(),
            current_epoch: global.current_epoch(),
            master_name: name,
            master_ip: addr.ip.clone(),
            master_port: addr.port,
            master_config_epoch: config_epoch,
        };
        let mut p = primary_arc.lock();
        p.link
            .send_command(
                link::publish_frame(gossip::HELLO_CHANNEL, &hello.format()),
                PendingReply::Generic,
                now,
            )
            .await;
        p.last_publish_time = Some(now);
    }
}

async fn reconnect_and_poll_replicas(
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
    min_reconnect: Duration,
    my_run_id: &str,
) {
    let replica_keys: Vec<String> = primary_arc.lock().replicas.keys().cloned().collect();
    for key in replica_keys {
        let (addr, disconnected, auth) = {
            let p = primary_arc.lock();
            let Some(r) = p.replicas.get(&key) else { continue };
            (
                r.addr.clone(),
                r.link.disconnected,
                p.config.auth_pass.clone().map(|pass| (p.config.auth_user.clone().unwrap_or_default(), pass)),
            )
        };
        if disconnected {
            let mut tmp = super::link::InstanceLink::new();
            {
                let mut p = primary_arc.lock();
                if let Some(r) = p.replicas.get_mut(&key) {
                    std::mem::swap(&mut tmp, &mut r.link);
                }
            }
            tmp.reconnect_if_needed(
                &addr,
                false,
                now,
                min_reconnect,
                auth.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
                my_run_id,
                gossip::HELLO_CHANNEL,
            )
            .await;
            let mut p = primary_arc.lock();
            if let Some(r) = p.replicas.get_mut(&key) {
                std::mem::swap(&mut tmp, &mut r.link);
            }
        }

        let mut p = primary_arc.lock();
        let Some(r) = p.replicas.get_mut(&key) else { continue };
        let replies = r.link.drain_command_replies();
        for (kind, frame) in replies {
            match kind {
                PendingReply::Ping => {
                    if matches!(frame, RespFrame::SimpleString(_)) {
                        r.link.last_pong_time = Some(now);
                        r.down_since = None;
                    }
                }
                PendingReply::Info => {
                    if let RespFrame::BulkString(bs) = frame {
                        let snap = parse_info(&String::from_utf8_lossy(&bs));
                        if snap.role == Some(Role::Primary) {
                            r.flags.insert(StatusFlags::PROMOTED);
                        }
                        r.run_id = snap.run_id.clone().or(r.run_id.clone());
                        r.priority = if snap.replica_priority > 0 { snap.replica_priority } else { r.priority };
                        r.info = snap;
                    }
                }
                _ => {}
            }
        }

        let need_ping = r.link.last_command_sent_time.is_none_or(|t| now.duration_since(t) >= PING_PERIOD);
        let need_info = r.last_info_time.is_none_or(|t| now.duration_since(t) >= INFO_PERIOD);
        if need_info {
            r.link.send_command(link::info_frame(), PendingReply::Info, now).await;
            r.last_info_time = Some(now);
        } else if need_ping {
            r.link.send_command(link::ping_frame(), PendingReply::Ping, now).await;
        }
    }
}

async fn reconnect_and_poll_peers(
    global: &GlobalWardenState,
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
    min_reconnect: Duration,
) {
    let my_run_id = &global.my_run_id;
    let hello_timeout = PUBLISH_PERIOD * 5;
    let stale_reply_timeout = ASK_PERIOD * 5;
    {
        let mut p = primary_arc.lock();
        gossip::expire_stale_peers(&mut p.sentinels, now, hello_timeout);
        for peer in p.sentinels.values_mut() {
            if peer
                .last_is_master_down_reply_time
                .is_none_or(|t| now.duration_since(t) > stale_reply_timeout)
            {
                peer.flags.remove(StatusFlags::PRIMARY_DOWN_FROM_PEER);
            }
        }
    }

    let peer_keys: Vec<String> = primary_arc.lock().sentinels.keys().cloned().collect();
    for key in peer_keys {
        let (addr, link_arc) = {
            let p = primary_arc.lock();
            let Some(peer) = p.sentinels.get(&key) else { continue };
            (peer.addr.clone(), peer.link.clone())
        };
        let disconnected = link_arc.lock().disconnected;
        if disconnected {
            let mut tmp = super::link::InstanceLink::new();
            std::mem::swap(&mut tmp, &mut link_arc.lock());
            tmp.reconnect_if_needed(&addr, false, now, min_reconnect, None, my_run_id, gossip::HELLO_CHANNEL)
                .await;
            std::mem::swap(&mut tmp, &mut link_arc.lock());
        }
        let replies = link_arc.lock().drain_command_replies();

        let mut new_epoch_seen = None;
        {
            let mut p = primary_arc.lock();
            if let Some(peer) = p.sentinels.get_mut(&key) {
                for (kind, frame) in replies {
                    if kind != PendingReply::IsMasterDownByAddr {
                        continue;
                    }
                    let RespFrame::Array(parts) = frame else { continue };
                    if parts.len() != 3 {
                        continue;
                    }
                    let (Some(down), Some(leader), Some(leader_epoch)) = (
                        as_integer(&parts[0]),
                        as_bulk_string(&parts[1]),
                        as_integer(&parts[2]),
                    ) else {
                        continue;
                    };
                    peer.last_is_master_down_reply_time = Some(now);
                    if down == 1 {
                        peer.flags.insert(StatusFlags::PRIMARY_DOWN_FROM_PEER);
                    } else {
                        peer.flags.remove(StatusFlags::PRIMARY_DOWN_FROM_PEER);
                    }
                    let leader_epoch = leader_epoch.max(0) as u64;
                    if leader != "*" {
                        peer.leader_vote = Some((leader.clone(), leader_epoch));
                        p.votes_received.insert(key.clone(), (leader, leader_epoch));
                    }
                    if leader_epoch > new_epoch_seen.unwrap_or(0) {
                        new_epoch_seen = Some(leader_epoch);
                    }
                }
            }
        }

        if let Some(epoch) = new_epoch_seen
            && global.raise_epoch(epoch)
        {
            if let Err(e) = persistence::rewrite(global).await {
                warn!("failed to persist config after epoch raise: {e}");
            }
            global.events.publish(Event::NewEpoch { epoch });
        }
    }

    ask_peers_about_primary(global, primary_arc, now).await;
}

fn as_integer(frame: &RespFrame) -> Option<i64> {
    match frame {
        RespFrame::Integer(n) => Some(*n),
        _ => None,
    }
}

fn as_bulk_string(frame: &RespFrame) -> Option<String> {
    match frame {
        RespFrame::BulkString(bs) => Some(String::from_utf8_lossy(bs).to_string()),
        _ => None,
    }
}

/// §4.5 "ask the network": rate-limited via `last_ask_time` to at most once
/// every `ASK_PERIOD`. Solicits our own candidacy once we are in
/// `WAIT_START` for this primary's current `failover_epoch`, otherwise just
/// asks for a down opinion (candidate `"*"`).
async fn ask_peers_about_primary(
    global: &GlobalWardenState,
    primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>,
    now: Instant,
) {
    let should_ask = {
        let p = primary_arc.lock();
        p.last_ask_time.is_none_or(|t| now.duration_since(t) >= ASK_PERIOD)
    };
    if !should_ask {
        return;
    }

    let (ip, port, epoch, candidate, peer_links) = {
        let mut p = primary_arc.lock();
        p.last_ask_time = Some(now);
        let candidate = if p.failover_state == FailoverState::WaitStart {
            global.my_run_id.clone()
        } else {
            "*".to_string()
        };
        let peer_links: Vec<(String, std::sync::Arc<parking_lot::Mutex<super::link::InstanceLink>>)> = p
            .sentinels
            .iter()
            .map(|(k, v)| (k.clone(), v.link.clone()))
            .collect();
        (p.addr.ip.clone(), p.addr.port, p.failover_epoch, candidate, peer_links)
    };

    let frame = link::is_master_down_frame(&ip, port, epoch, &candidate);
    for (_key, link_arc) in peer_links {
        let disconnected = link_arc.lock().disconnected;
        if disconnected {
            continue;
        }
        let mut tmp = super::link::InstanceLink::new();
        std::mem::swap(&mut tmp, &mut link_arc.lock());
        tmp.send_command(frame.clone(), PendingReply::IsMasterDownByAddr, now).await;
        std::mem::swap(&mut tmp, &mut link_arc.lock());
    }
}

/// Enqueues the primary's configured `notification-script` for any event
/// concerning it (§6, §7 script scheduling), a no-op if none is configured.
fn notify_scripts(global: &GlobalWardenState, primary: &PrimaryRecord, event: &Event) {
    if let Some(script) = &primary.config.notification_script {
        global.scripts.lock().enqueue_notification(script, event);
    }
}

fn publish(global: &GlobalWardenState, primary: &PrimaryRecord, event: Event) {
    notify_scripts(global, primary, &event);
    global.events.publish(event);
}

/// The acting half's down-detection step (§4.4), exposed `pub` so
/// integration tests can drive SDOWN/ODOWN transitions against in-memory
/// fixtures without opening any socket — `tick()` calls this the same way
/// once the monitoring half (link I/O) is done for the cycle.
pub async fn run_down_detection(global: &GlobalWardenState, primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>, now: Instant) {
    let mut p = primary_arc.lock();
    let down_after = p.config.down_after_period;

    let should_sdown = quorum::primary_should_be_sdown(p.link.pending_ping_time, now, down_after)
        || quorum::primary_reboot_should_be_sdown(
            p.flags.contains(StatusFlags::PRIMARY_REBOOTING),
            p.reboot_seen_at,
            now,
            p.config.master_reboot_down_after_period,
        )
        || quorum::primary_role_stuck_as_replica_should_be_sdown(
            p.info.role,
            p.role_since,
            now,
            down_after,
            INFO_PERIOD,
        );
    let was_sdown = p.flags.contains(StatusFlags::S_DOWN);
    if should_sdown && !was_sdown {
        p.flags.insert(StatusFlags::S_DOWN);
        if p.down_since.is_none() {
            p.down_since = Some(now);
        }
        publish(global, &p, Event::SdownEnter { kind: "master", id: p.name.clone() });
    } else if !should_sdown && was_sdown {
        p.flags.remove(StatusFlags::S_DOWN | StatusFlags::O_DOWN);
        p.down_since = None;
        publish(global, &p, Event::SdownExit { kind: "master", id: p.name.clone() });
    }

    let replica_down_after = quorum::replica_down_after(down_after);
    for (run_id, r) in p.replicas.iter_mut() {
        let replica_sdown = quorum::primary_should_be_sdown(r.link.pending_ping_time, now, replica_down_after);
        let was = r.flags.contains(StatusFlags::S_DOWN);
        if replica_sdown && !was {
            r.flags.insert(StatusFlags::S_DOWN);
            r.down_since = Some(now);
            global.events.publish(Event::SdownEnter { kind: "slave", id: run_id.clone() });
        } else if !replica_sdown && was {
            r.flags.remove(StatusFlags::S_DOWN);
            r.down_since = None;
            global.events.publish(Event::SdownExit { kind: "slave", id: run_id.clone() });
        }
    }

    let was_odown = p.flags.contains(StatusFlags::O_DOWN);
    let now_odown = quorum::odown_reached(&p);
    if now_odown && !was_odown {
        p.flags.insert(StatusFlags::O_DOWN);
        publish(global, &p, Event::OdownEnter { master: p.name.clone() });
    } else if !now_odown && was_odown {
        p.flags.remove(StatusFlags::O_DOWN);
        publish(global, &p, Event::OdownExit { master: p.name.clone() });
    }

    let started = now_odown
        && p.failover_state == FailoverState::None
        && quorum::can_start_election(&p)
        && failover::try_start(&mut p, &global.my_run_id, global.next_epoch(), now);

    if started {
        let master = p.name.clone();
        drop(p);
        if let Err(e) = persistence::rewrite(global).await {
            warn!("failed to persist config after starting failover: {e}");
        }
        let p = primary_arc.lock();
        publish(global, &p, Event::FailoverStart { master });
    }
}

/// The acting half's failover-FSM-driving step (§4.5), exposed `pub` for the
/// same reason as [`run_down_detection`].
pub async fn run_failover_driver(global: &GlobalWardenState, primary_arc: &std::sync::Arc<parking_lot::Mutex<PrimaryRecord>>, now: Instant) {
    let in_progress = { primary_arc.lock().failover_state != FailoverState::None };
    if !in_progress {
        return;
    }

    let (addr_before, addr_before_ip, addr_before_port) = {
        let p = primary_arc.lock();
        (p.addr.to_string(), p.addr.ip.clone(), p.addr.port)
    };
    let action = {
        let mut p = primary_arc.lock();
        failover::advance(&mut p, &global.my_run_id, ELECTION_TIMEOUT, PING_PERIOD, INFO_PERIOD, now)
    };

    match action {
        FailoverAction::ElectedLeader => {
            let p = primary_arc.lock();
            info!("sentinel elected leader for failover of primary '{}'", p.name);
            publish(global, &p, Event::ElectedLeader { master: p.name.clone(), epoch: p.failover_epoch });
        }
        FailoverAction::AbortNotElected => {
            let p = primary_arc.lock();
            publish(global, &p, Event::FailoverAbortNotElected { master: p.name.clone() });
        }
        FailoverAction::SendReplicaofNoOneTo { run_id } => {
            let mut p = primary_arc.lock();
            let renames = p.config.rename_commands.clone();
            if let Some(r) = p.replicas.get_mut(&run_id) {
                let frame = link::apply_rename(failover::replicaof_no_one_frame(), &renames);
                r.link.send_command(frame, PendingReply::Generic, now).await;
            }
        }
        FailoverAction::PollPromotedReplicaInfo { run_id } => {
            let mut p = primary_arc.lock();
            let renames = p.config.rename_commands.clone();
            if let Some(r) = p.replicas.get_mut(&run_id) {
                let frame = link::apply_rename(link::info_frame(), &renames);
                r.link.send_command(frame, PendingReply::Info, now).await;
            }
        }
        FailoverAction::SendReplicaofBundleToReplica { run_id, new_primary_addr } => {
            let mut p = primary_arc.lock();
            let renames = p.config.rename_commands.clone();
            if let Some(r) = p.replicas.get_mut(&run_id) {
                let bundle = link::reconfig_bundle(failover::replicaof_frame(&new_primary_addr.0, new_primary_addr.1));
                for frame in bundle {
                    let frame = link::apply_rename(frame, &renames);
                    r.link.send_command(frame, PendingReply::Generic, now).await;
                }
                r.flags.insert(StatusFlags::RECONF_SENT);
            }
            let ev = Event::ReplicaReconf {
                master: p.name.clone(),
                addr: format!("{}:{}", new_primary_addr.0, new_primary_addr.1),
            };
            publish(global, &p, ev);
        }
        FailoverAction::AbortNoGoodReplica => {
            let p = primary_arc.lock();
            publish(global, &p, Event::FailoverNoGoodReplica { master: p.name.clone() });
        }
        FailoverAction::None => {
            let finished = { primary_arc.lock().failover_state == FailoverState::None };
            if finished {
                let p = primary_arc.lock();
                let new_addr = p.addr.to_string();
                if addr_before != new_addr
                    && let Some(script) = &p.config.client_reconfig_script
                {
                    global.scripts.lock().enqueue_client_reconfig(
                        script,
                        &p.name,
                        "leader",
                        &addr_before_ip,
                        addr_before_port,
                        &p.addr.ip,
                        p.addr.port,
                    );
                }
                if addr_before != new_addr {
                    publish(global, &p, failover::switch_master_event(&p, addr_before.clone()));
                }
                publish(global, &p, Event::FailoverEnd { master: p.name.clone() });
            }
        }
    }
}
