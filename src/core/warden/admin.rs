// src/core/warden/admin.rs

//! The administrative command surface (§4.8, §6): a TCP listener speaking
//! the existing RESP wire codec, answering `PING`, `SENTINEL *`, and the
//! `IS-MASTER-DOWN-BY-ADDR` exchange peers use during leader election.

use super::events::Event;
use super::instance::StatusFlags;
use super::persistence;
use super::state::GlobalWardenState;
use crate::core::protocol::{RespFrame, RespFrameCodec, RespValue};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{info, warn};

pub async fn run(global: Arc<GlobalWardenState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(global.settings.bind_addr).await?;
    info!("Warden admin listener bound on {}", global.settings.bind_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        let global = global.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, global).await {
                warn!("admin connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_connection(socket: TcpStream, global: Arc<GlobalWardenState>) -> anyhow::Result<()> {
    let mut framed = Framed::new(socket, RespFrameCodec::new(2));
    let mut event_rx = global.events.subscribe();

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let frame = frame?;
                let response = match frame {
                    RespFrame::Array(args) => dispatch(&args, &global).await,
                    _ => RespFrame::Error("ERR invalid command format".into()),
                };
                framed.send(response).await?;
            }
            Ok(event) = event_rx.recv() => {
                // Pub/sub-style push for clients that SUBSCRIBEd to an event
                // channel; best-effort, dropped if the client never subscribed.
                let push = RespFrame::Array(vec![
                    RespFrame::BulkString("message".into()),
                    RespFrame::BulkString(event.channel().to_string().into()),
                    RespFrame::BulkString(event.payload().into()),
                ]);
                let _ = framed.send(push).await;
            }
        }
    }
    Ok(())
}

async fn dispatch(args: &[RespFrame], global: &Arc<GlobalWardenState>) -> RespFrame {
    let Some(RespFrame::BulkString(cmd)) = args.first() else {
        return RespFrame::Error("ERR invalid command format".into());
    };

    if cmd.eq_ignore_ascii_case(b"ping") {
        return RespValue::SimpleString("PONG".into()).into();
    }

    if cmd.eq_ignore_ascii_case(b"subscribe") {
        return RespValue::SimpleString("OK".into()).into();
    }

    if cmd.eq_ignore_ascii_case(b"role") {
        return RespValue::Array(vec![
            RespValue::BulkString("sentinel".into()),
            RespValue::Array(
                global
                    .master_names()
                    .into_iter()
                    .map(|n| RespValue::BulkString(n.into()))
                    .collect(),
            ),
        ])
        .into();
    }

    if cmd.eq_ignore_ascii_case(b"info") {
        return RespValue::BulkString(info_report(global).into()).into();
    }

    if !cmd.eq_ignore_ascii_case(b"sentinel") {
        return RespFrame::Error(format!("ERR unknown command '{}'", String::from_utf8_lossy(cmd)));
    }

    let Some(RespFrame::BulkString(subcmd)) = args.get(1) else {
        return RespFrame::Error("ERR wrong number of arguments for 'sentinel' command".into());
    };
    let arg2 = |i: usize| -> Option<String> {
        match args.get(i) {
            Some(RespFrame::BulkString(bs)) => Some(String::from_utf8_lossy(bs).to_string()),
            _ => None,
        }
    };

    if subcmd.eq_ignore_ascii_case(b"get-master-addr-by-name") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let p = p.lock();
                RespValue::Array(vec![
                    RespValue::BulkString(p.addr.ip.clone().into()),
                    RespValue::BulkString(p.addr.port.to_string().into()),
                ])
                .into()
            }
            None => RespFrame::Null,
        };
    }

    if subcmd.eq_ignore_ascii_case(b"masters") {
        let entries: Vec<RespValue> = global
            .master_names()
            .iter()
            .filter_map(|n| global.get_master(n))
            .map(|p| master_to_resp(&p.lock()))
            .collect();
        return RespValue::Array(entries).into();
    }

    if subcmd.eq_ignore_ascii_case(b"master") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => master_to_resp(&p.lock()).into(),
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"slaves") || subcmd.eq_ignore_ascii_case(b"replicas") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let p = p.lock();
                let entries: Vec<RespValue> = p.replicas.values().map(replica_to_resp).collect();
                RespValue::Array(entries).into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"sentinels") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let p = p.lock();
                let entries: Vec<RespValue> = p
                    .sentinels
                    .values()
                    .map(|s| {
                        RespValue::Array(vec![
                            RespValue::BulkString("name".into()),
                            RespValue::BulkString(s.run_id.clone().into()),
                            RespValue::BulkString("ip".into()),
                            RespValue::BulkString(s.addr.ip.clone().into()),
                            RespValue::BulkString("port".into()),
                            RespValue::BulkString(s.addr.port.to_string().into()),
                        ])
                    })
                    .collect();
                RespValue::Array(entries).into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"is-master-down-by-addr") {
        let (Some(ip), Some(port), Some(epoch), Some(candidate)) = (arg2(2), arg2(3), arg2(4), arg2(5)) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        let Ok(port) = port.parse::<u16>() else {
            return RespFrame::Error("ERR invalid port".into());
        };
        let Ok(epoch) = epoch.parse::<u64>() else {
            return RespFrame::Error("ERR invalid epoch".into());
        };
        return is_master_down_by_addr(global, &ip, port, epoch, &candidate).await;
    }

    if subcmd.eq_ignore_ascii_case(b"reset") {
        let Some(pattern) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        // §4.8: drops learned replicas and peer sentinels for every primary
        // whose name matches `pattern`, not just an exact name.
        let mut matched = 0i64;
        for name in global.master_names() {
            if !glob_match(&pattern, &name) {
                continue;
            }
            if let Some(p) = global.get_master(&name) {
                let mut p = p.lock();
                p.replicas.clear();
                p.sentinels.clear();
                p.reset_failover_state();
                matched += 1;
            }
        }
        return RespValue::Integer(matched).into();
    }

    if subcmd.eq_ignore_ascii_case(b"monitor") {
        let (Some(name), Some(ip), Some(port), Some(quorum)) = (arg2(2), arg2(3), arg2(4), arg2(5)) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        let Ok(port) = port.parse::<u16>() else {
            return RespFrame::Error("ERR invalid port".into());
        };
        let Ok(quorum) = quorum.parse::<u32>() else {
            return RespFrame::Error("ERR invalid quorum".into());
        };
        if global.get_master(&name).is_some() {
            return RespFrame::Error(format!("ERR Duplicate master name '{name}'"));
        }
        let addr = match super::address::Address::create(&ip, port, true) {
            Ok(a) => a,
            Err(e) => return RespFrame::Error(format!("ERR {e}")),
        };
        let config = super::instance::PrimaryConfig { quorum, ..Default::default() };
        let record = super::instance::PrimaryRecord::new(name.clone(), addr, config);
        global.masters.insert(name, std::sync::Arc::new(parking_lot::Mutex::new(record)));
        return RespValue::SimpleString("OK".into()).into();
    }

    if subcmd.eq_ignore_ascii_case(b"remove") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.masters.remove(&name) {
            Some(_) => RespValue::SimpleString("OK".into()).into(),
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"set") {
        let (Some(name), Some(option), Some(value)) = (arg2(2), arg2(3), arg2(4)) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let mut p = p.lock();
                if !apply_set_option(&mut p.config, &option, &value) {
                    return RespFrame::Error(format!("ERR Unknown option '{option}'"));
                }
                RespValue::SimpleString("OK".into()).into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"failover") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let (in_progress, no_good_replica) = {
                    let primary = p.lock();
                    (
                        primary.failover_state != super::instance::FailoverState::None,
                        primary
                            .select_promotion_candidate(
                                std::time::Instant::now(),
                                super::monitor::PING_PERIOD,
                                super::monitor::INFO_PERIOD,
                            )
                            .is_none(),
                    )
                };
                if in_progress {
                    return RespFrame::Error("INPROG Failover already in progress".into());
                }
                if no_good_replica {
                    return RespFrame::Error("NOGOODSLAVE No suitable replica to promote".into());
                }
                let started = {
                    let mut primary = p.lock();
                    primary.flags.insert(StatusFlags::FORCE_FAILOVER);
                    super::failover::try_start(
                        &mut primary,
                        &global.my_run_id,
                        global.next_epoch(),
                        std::time::Instant::now(),
                    )
                };
                if started {
                    info!("Executing user requested FAILOVER of '{name}'");
                    if let Err(e) = persistence::rewrite(global).await {
                        warn!("failed to persist config after user-requested failover: {e}");
                    }
                    let primary = p.lock();
                    let ev = Event::FailoverStart { master: primary.name.clone() };
                    if let Some(script) = &primary.config.notification_script {
                        global.scripts.lock().enqueue_notification(script, &ev);
                    }
                    global.events.publish(ev);
                }
                RespValue::SimpleString("OK".into()).into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"ckquorum") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let p = p.lock();
                let known = p.sentinels.len() as u32 + 1;
                if known >= p.config.quorum {
                    RespValue::SimpleString(format!("OK {known} usable Sentinels. Quorum and failover authorization can be reached")).into()
                } else {
                    RespFrame::Error(format!(
                        "NOQUORUM {known} usable Sentinels. Not enough available Sentinels to reach the quorum of {}",
                        p.config.quorum
                    ))
                }
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"config") && arg2(2).as_deref().map(|s| s.eq_ignore_ascii_case("rewrite")).unwrap_or(false) {
        return match persistence::rewrite(global).await {
            Ok(()) => RespValue::SimpleString("OK".into()).into(),
            Err(e) => RespFrame::Error(format!("ERR {e}")),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"flushconfig") {
        return match persistence::rewrite(global).await {
            Ok(()) => RespValue::SimpleString("OK".into()).into(),
            Err(e) => RespFrame::Error(format!("ERR {e}")),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"pending-scripts") {
        let scripts = global.scripts.lock();
        return RespValue::Array(vec![
            RespValue::BulkString("pending".into()),
            RespValue::BulkString(scripts.pending_len().to_string().into()),
            RespValue::BulkString("running".into()),
            RespValue::BulkString(scripts.running_count().to_string().into()),
        ])
        .into();
    }

    if subcmd.eq_ignore_ascii_case(b"info-cache") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let p = p.lock();
                RespValue::Array(vec![RespValue::BulkString(
                    p.last_info_time.map(|_| "cached").unwrap_or("empty").into(),
                )])
                .into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"simulate-failure") {
        let Some(name) = arg2(2) else {
            return RespFrame::Error("ERR wrong number of arguments".into());
        };
        return match global.get_master(&name) {
            Some(p) => {
                let mut p = p.lock();
                for flag_arg in args.iter().skip(3) {
                    let RespFrame::BulkString(bs) = flag_arg else { continue };
                    if bs.eq_ignore_ascii_case(b"crash-after-election") {
                        p.flags.insert(StatusFlags::SIMULATE_CRASH_AFTER_ELECTION);
                    } else if bs.eq_ignore_ascii_case(b"crash-after-promotion") {
                        p.flags.insert(StatusFlags::SIMULATE_CRASH_AFTER_PROMOTION);
                    }
                }
                RespValue::SimpleString("OK".into()).into()
            }
            None => RespFrame::Error("ERR No such master with that name".into()),
        };
    }

    if subcmd.eq_ignore_ascii_case(b"myid") {
        return RespValue::BulkString(global.my_run_id.clone().into()).into();
    }

    RespFrame::Error(format!(
        "ERR Unknown sentinel subcommand '{}'",
        String::from_utf8_lossy(subcmd)
    ))
}

/// Serves a peer's `SENTINEL IS-MASTER-DOWN-BY-ADDR <ip> <port> <epoch>
/// <runid>` query (§4.5 "Voting"): raises our own `current_epoch` if the
/// peer's is higher, then — if the peer is soliciting a vote (`runid` is not
/// `"*"`) and we haven't already voted this epoch for this primary — records
/// our vote and defers our own election attempt when we voted for someone
/// else. Either way replies with our own down-opinion and current vote.
async fn is_master_down_by_addr(
    global: &Arc<GlobalWardenState>,
    ip: &str,
    port: u16,
    epoch: u64,
    candidate: &str,
) -> RespFrame {
    let Some(name) = global
        .master_names()
        .into_iter()
        .find(|n| global.get_master(n).is_some_and(|p| { let p = p.lock(); p.addr.ip == ip && p.addr.port == port }))
    else {
        return RespValue::Array(vec![
            RespValue::Integer(0),
            RespValue::BulkString("*".into()),
            RespValue::Integer(0),
        ])
        .into();
    };
    let Some(primary) = global.get_master(&name) else {
        return RespValue::Array(vec![
            RespValue::Integer(0),
            RespValue::BulkString("*".into()),
            RespValue::Integer(0),
        ])
        .into();
    };

    let raised = global.raise_epoch(epoch);
    let mut persist_needed = raised;

    let (down, leader_run_id, leader_epoch, voted_for_other) = {
        let mut p = primary.lock();
        let down = p.flags.contains(StatusFlags::S_DOWN) || p.flags.contains(StatusFlags::O_DOWN);

        let mut voted_for_other = false;
        if candidate != "*" && p.leader_epoch != Some(epoch) {
            p.leader_run_id = Some(candidate.to_string());
            p.leader_epoch = Some(epoch);
            persist_needed = true;
            voted_for_other = candidate != global.my_run_id;
            if voted_for_other {
                super::failover::defer_own_attempt(&mut p, std::time::Instant::now());
            }
        }

        (
            down,
            p.leader_run_id.clone().unwrap_or_else(|| "*".into()),
            p.leader_epoch.unwrap_or(0),
            voted_for_other,
        )
    };

    if persist_needed
        && let Err(e) = persistence::rewrite(global).await
    {
        warn!("failed to persist config after serving a vote: {e}");
    }
    if raised {
        global.events.publish(Event::NewEpoch { epoch });
    }
    if voted_for_other {
        global.events.publish(Event::VoteForLeader {
            master: name,
            candidate_run_id: leader_run_id.clone(),
            epoch: leader_epoch,
        });
    }

    RespValue::Array(vec![
        RespValue::Integer(if down { 1 } else { 0 }),
        RespValue::BulkString(leader_run_id.into()),
        RespValue::Integer(leader_epoch as i64),
    ])
    .into()
}

/// Applies one `SENTINEL SET <master> <option> <value>` pair (§4.8); returns
/// `false` for an option name Warden doesn't recognize.
fn apply_set_option(cfg: &mut super::instance::PrimaryConfig, option: &str, value: &str) -> bool {
    match option.to_ascii_lowercase().as_str() {
        "quorum" => cfg.quorum = value.parse().unwrap_or(cfg.quorum),
        "down-after-milliseconds" => {
            cfg.down_after_period = std::time::Duration::from_millis(value.parse().unwrap_or(30_000));
        }
        "failover-timeout" => {
            cfg.failover_timeout = std::time::Duration::from_millis(value.parse().unwrap_or(180_000));
        }
        "parallel-syncs" => cfg.parallel_syncs = value.parse().unwrap_or(cfg.parallel_syncs),
        "auth-pass" => cfg.auth_pass = Some(value.to_string()),
        "auth-user" => cfg.auth_user = Some(value.to_string()),
        "notification-script" => cfg.notification_script = Some(value.to_string()),
        "client-reconfig-script" => cfg.client_reconfig_script = Some(value.to_string()),
        "master-reboot-down-after-period" => {
            cfg.master_reboot_down_after_period = std::time::Duration::from_millis(value.parse().unwrap_or(30_000));
        }
        _ => return false,
    }
    true
}

/// A minimal `fnmatch`-style matcher supporting `*` and `?` (§4.8's
/// `SENTINEL RESET <pattern>`), enough for the glob patterns the original
/// accepts without pulling in a dedicated glob crate for one command.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            Some(b'?') => !t.is_empty() && inner(&p[1..], &t[1..]),
            Some(&c) => t.first().is_some_and(|&tc| tc == c) && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// Builds the `# Sentinel` INFO section (§A.5): Warden carries no metrics
/// endpoint of its own, so this text report is the entire observability
/// surface beyond the event bus.
fn info_report(global: &GlobalWardenState) -> String {
    let names = global.master_names();
    let mut out = String::new();
    out.push_str("# Sentinel\n");
    out.push_str("sentinel_masters:");
    out.push_str(&names.len().to_string());
    out.push('\n');
    out.push_str("sentinel_tilt:");
    out.push_str(if global.tilt.is_active() { "1" } else { "0" });
    out.push('\n');
    out.push_str("sentinel_running_scripts:");
    out.push_str(&global.scripts.lock().running_count().to_string());
    out.push('\n');
    for (i, name) in names.iter().enumerate() {
        let Some(p) = global.get_master(name) else { continue };
        let p = p.lock();
        out.push_str(&format!(
            "master{i}:name={},status={},address={},slaves={},sentinels={}\n",
            p.name,
            p.status_str(),
            p.addr,
            p.replicas.len(),
            p.sentinels.len() + 1,
        ));
    }
    out
}

fn master_to_resp(p: &super::instance::PrimaryRecord) -> RespValue {
    RespValue::Array(vec![
        RespValue::BulkString("name".into()),
        RespValue::BulkString(p.name.clone().into()),
        RespValue::BulkString("ip".into()),
        RespValue::BulkString(p.addr.ip.clone().into()),
        RespValue::BulkString("port".into()),
        RespValue::BulkString(p.addr.port.to_string().into()),
        RespValue::BulkString("runid".into()),
        RespValue::BulkString(p.run_id.clone().unwrap_or_default().into()),
        RespValue::BulkString("flags".into()),
        RespValue::BulkString(p.status_str().into()),
        RespValue::BulkString("num-slaves".into()),
        RespValue::BulkString(p.replicas.len().to_string().into()),
        RespValue::BulkString("num-other-sentinels".into()),
        RespValue::BulkString(p.sentinels.len().to_string().into()),
        RespValue::BulkString("quorum".into()),
        RespValue::BulkString(p.config.quorum.to_string().into()),
        RespValue::BulkString("config-epoch".into()),
        RespValue::BulkString(p.config_epoch.to_string().into()),
    ])
}

fn replica_to_resp(r: &super::instance::ReplicaRecord) -> RespValue {
    RespValue::Array(vec![
        RespValue::BulkString("name".into()),
        RespValue::BulkString(format!("{}", r.addr).into()),
        RespValue::BulkString("ip".into()),
        RespValue::BulkString(r.addr.ip.clone().into()),
        RespValue::BulkString("port".into()),
        RespValue::BulkString(r.addr.port.to_string().into()),
        RespValue::BulkString("runid".into()),
        RespValue::BulkString(r.run_id.clone().unwrap_or_default().into()),
        RespValue::BulkString("master-link-status".into()),
        RespValue::BulkString(if r.info.primary_link_status_ok { "ok" } else { "err" }.into()),
        RespValue::BulkString("slave-priority".into()),
        RespValue::BulkString(r.priority.to_string().into()),
        RespValue::BulkString("slave-repl-offset".into()),
        RespValue::BulkString(r.info.replica_repl_offset.to_string().into()),
    ])
}
