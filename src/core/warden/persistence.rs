// src/core/warden/persistence.rs

//! Config file parsing and the atomic on-disk rewrite (§6, A.3). The format
//! is the line-oriented directive set `sentinel.conf` itself uses, not the
//! TOML the rest of the workspace's `config` crate parses — this is its own
//! small recursive-descent reader in that spirit.

use super::address::Address;
use super::instance::{PrimaryConfig, PrimaryRecord};
use super::state::{GlobalSettings, GlobalWardenState};
use crate::core::errors::SentinelError;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub struct ParsedConfig {
    pub settings: GlobalSettings,
    pub masters: Vec<(String, Address, PrimaryConfig)>,
    pub config_epochs: HashMap<String, u64>,
    pub leader_epochs: HashMap<String, u64>,
    pub my_run_id: Option<String>,
    pub current_epoch: u64,
}

/// Reads and parses a Warden config file. Unknown directives are logged and
/// skipped rather than rejected, matching the original's tolerance for
/// forward-compatible config lines.
pub async fn load(path: &Path) -> Result<ParsedConfig, SentinelError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SentinelError::ConfigParse(format!("cannot read '{}': {e}", path.display())))?;

    let mut bind_addr: SocketAddr = "0.0.0.0:26379".parse().unwrap();
    let mut announce_addr: Option<SocketAddr> = None;
    let mut announce_hostnames = false;
    let mut resolve_hostnames = false;
    let mut deny_scripts_reconfig = true;
    let mut my_run_id = None;

    let mut masters: HashMap<String, (Address, PrimaryConfig)> = HashMap::new();
    let mut config_epochs: HashMap<String, u64> = HashMap::new();
    let mut leader_epochs: HashMap<String, u64> = HashMap::new();
    let mut current_epoch: u64 = 0;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = tokenize(line);
        let tokens: Vec<&str> = if tokens.first().map(|s| s.eq_ignore_ascii_case("sentinel")).unwrap_or(false) {
            tokens[1..].to_vec()
        } else {
            tokens
        };
        let Some((directive, args)) = tokens.split_first() else {
            continue;
        };

        match directive.to_ascii_lowercase().as_str() {
            "port" | "bind" => {
                if let Some(p) = args.first()
                    && let Ok(port) = p.parse::<u16>()
                {
                    bind_addr.set_port(port);
                }
            }
            "announce-ip" => {
                if let Some(ip) = args.first()
                    && let Ok(new_addr) = format!("{ip}:{}", announce_addr.map(|a| a.port()).unwrap_or(bind_addr.port())).parse()
                {
                    announce_addr = Some(new_addr);
                }
            }
            "announce-port" => {
                if let Some(p) = args.first()
                    && let Ok(port) = p.parse::<u16>()
                {
                    let ip = announce_addr.map(|a| a.ip().to_string()).unwrap_or(bind_addr.ip().to_string());
                    if let Ok(new_addr) = format!("{ip}:{port}").parse() {
                        announce_addr = Some(new_addr);
                    }
                }
            }
            "announce-hostnames" => announce_hostnames = parse_bool(args.first()),
            "resolve-hostnames" => resolve_hostnames = parse_bool(args.first()),
            "deny-scripts-reconfig" => deny_scripts_reconfig = parse_bool(args.first()),
            "myid" => my_run_id = args.first().map(|s| s.to_string()),
            "monitor" => {
                if args.len() < 4 {
                    warn!("malformed 'sentinel monitor' directive: {line}");
                    continue;
                }
                let name = args[0].to_string();
                let host = args[1];
                let port: u16 = args[2].parse().unwrap_or(0);
                let quorum: u32 = args[3].parse().unwrap_or(1);
                let addr = Address::create(host, port, true)?;
                masters.insert(
                    name,
                    (
                        addr,
                        PrimaryConfig {
                            quorum,
                            ..Default::default()
                        },
                    ),
                );
            }
            "down-after-milliseconds" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.down_after_period = Duration::from_millis(v.parse().unwrap_or(30_000));
                });
            }
            "failover-timeout" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.failover_timeout = Duration::from_millis(v.parse().unwrap_or(180_000));
                });
            }
            "parallel-syncs" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.parallel_syncs = v.parse().unwrap_or(1);
                });
            }
            "auth-pass" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.auth_pass = Some(v.to_string());
                });
            }
            "auth-user" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.auth_user = Some(v.to_string());
                });
            }
            "notification-script" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.notification_script = Some(v.to_string());
                });
            }
            "client-reconfig-script" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.client_reconfig_script = Some(v.to_string());
                });
            }
            "master-reboot-down-after-period" => {
                apply_master_field(&mut masters, args, |cfg, v| {
                    cfg.master_reboot_down_after_period = Duration::from_millis(v.parse().unwrap_or(30_000));
                });
            }
            "rename-command" => {
                if let [name, from, to] = args {
                    if let Some((_, cfg)) = masters.get_mut(*name) {
                        cfg.rename_commands.insert(from.to_ascii_uppercase(), to.to_string());
                    }
                } else {
                    warn!("malformed 'sentinel rename-command' directive: {line}");
                }
            }
            "config-epoch" => {
                if let [name, epoch] = args {
                    if let Ok(epoch) = epoch.parse::<u64>() {
                        config_epochs.insert(name.to_string(), epoch);
                    }
                }
            }
            "leader-epoch" => {
                if let [name, epoch] = args {
                    if let Ok(epoch) = epoch.parse::<u64>() {
                        leader_epochs.insert(name.to_string(), epoch);
                    }
                }
            }
            "current-epoch" => {
                if let Some(epoch) = args.first() {
                    current_epoch = epoch.parse().unwrap_or(0);
                }
            }
            "known-replica" | "known-slave" | "known-sentinel" => {
                // historical peer/replica hints from a prior rewrite; Warden
                // rediscovers both dynamically (§4.3, §4.4), so these are
                // accepted and ignored rather than rejected.
            }
            other => {
                warn!("ignoring unknown Warden config directive '{other}'");
            }
        }
    }

    Ok(ParsedConfig {
        settings: GlobalSettings {
            announce_hostnames,
            resolve_hostnames,
            deny_scripts_reconfig,
            bind_addr,
            announce_addr,
        },
        masters: masters
            .into_iter()
            .map(|(name, (addr, cfg))| (name, addr, cfg))
            .collect(),
        config_epochs,
        leader_epochs,
        my_run_id,
        current_epoch,
    })
}

fn apply_master_field(
    masters: &mut HashMap<String, (Address, PrimaryConfig)>,
    args: &[&str],
    apply: impl FnOnce(&mut PrimaryConfig, &str),
) {
    let Some((name, rest)) = args.split_first() else {
        return;
    };
    let Some(value) = rest.first() else { return };
    if let Some((_, cfg)) = masters.get_mut(*name) {
        apply(cfg, value);
    }
}

fn parse_bool(token: Option<&&str>) -> bool {
    matches!(token.map(|s| s.to_ascii_lowercase()).as_deref(), Some("yes" | "true" | "1"))
}

/// Splits a config line on whitespace, honoring double-quoted segments
/// (scripts/passwords with spaces), matching the original's tokenizer.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut in_quotes = false;
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_quotes {
            if c == '"' {
                tokens.push(&line[start.unwrap() + 1..i]);
                in_quotes = false;
                start = None;
            }
        } else if c == '"' && start.is_none() {
            in_quotes = true;
            start = Some(i);
        } else if c.is_whitespace() {
            if let Some(s) = start {
                tokens.push(&line[s..i]);
                start = None;
            }
        } else if start.is_none() {
            start = Some(i);
        }
        i += 1;
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }
    tokens
}

/// Serializes the current in-memory state back into `sentinel.conf`
/// directive format and atomically swaps it into place (§6): write to a
/// sibling temp file, `sync_all`, then `rename` over the original.
pub async fn rewrite(global: &GlobalWardenState) -> Result<(), SentinelError> {
    let mut body = String::new();
    body.push_str(&format!("port {}\n", global.settings.bind_addr.port()));
    if let Some(announce) = global.settings.announce_addr {
        body.push_str(&format!("announce-ip {}\n", announce.ip()));
        body.push_str(&format!("announce-port {}\n", announce.port()));
    }
    body.push_str(&format!("myid {}\n", global.my_run_id));
    body.push_str(&format!("current-epoch {}\n", global.current_epoch()));
    body.push_str(&format!(
        "announce-hostnames {}\n",
        if global.settings.announce_hostnames { "yes" } else { "no" }
    ));
    body.push_str(&format!(
        "resolve-hostnames {}\n",
        if global.settings.resolve_hostnames { "yes" } else { "no" }
    ));
    body.push_str(&format!(
        "deny-scripts-reconfig {}\n",
        if global.settings.deny_scripts_reconfig { "yes" } else { "no" }
    ));

    for entry in global.masters.iter() {
        let p = entry.value().lock();
        body.push_str(&format!(
            "sentinel monitor {} {} {} {}\n",
            p.name, p.addr.ip, p.addr.port, p.config.quorum
        ));
        body.push_str(&format!(
            "sentinel down-after-milliseconds {} {}\n",
            p.name,
            p.config.down_after_period.as_millis()
        ));
        body.push_str(&format!(
            "sentinel failover-timeout {} {}\n",
            p.name,
            p.config.failover_timeout.as_millis()
        ));
        body.push_str(&format!("sentinel parallel-syncs {} {}\n", p.name, p.config.parallel_syncs));
        body.push_str(&format!("sentinel config-epoch {} {}\n", p.name, p.config_epoch));
        if let Some(epoch) = p.leader_epoch {
            body.push_str(&format!("sentinel leader-epoch {} {}\n", p.name, epoch));
        }
        body.push_str(&format!(
            "sentinel master-reboot-down-after-period {} {}\n",
            p.name,
            p.config.master_reboot_down_after_period.as_millis()
        ));
        if let Some(pass) = &p.config.auth_pass {
            body.push_str(&format!("sentinel auth-pass {} {pass}\n", p.name));
        }
        if let Some(user) = &p.config.auth_user {
            body.push_str(&format!("sentinel auth-user {} {user}\n", p.name));
        }
        if let Some(script) = &p.config.notification_script {
            body.push_str(&format!("sentinel notification-script {} \"{script}\"\n", p.name));
        }
        if let Some(script) = &p.config.client_reconfig_script {
            body.push_str(&format!("sentinel client-reconfig-script {} \"{script}\"\n", p.name));
        }
        for (from, to) in &p.config.rename_commands {
            body.push_str(&format!("sentinel rename-command {} {from} {to}\n", p.name));
        }
        for peer in p.sentinels.values() {
            body.push_str(&format!(
                "sentinel known-sentinel {} {} {} {}\n",
                p.name, peer.addr.ip, peer.addr.port, peer.run_id
            ));
        }
        for replica in p.replicas.values() {
            body.push_str(&format!(
                "sentinel known-replica {} {} {}\n",
                p.name, replica.addr.ip, replica.addr.port
            ));
        }
    }

    let tmp_path = temp_path(&global.config_path);
    let body_for_write = body.clone();
    let tmp_path_for_write = tmp_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), SentinelError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path_for_write)?;
        file.write_all(body_for_write.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })
    .await
    .map_err(|e| SentinelError::ConfigRewrite(format!("rewrite task panicked: {e}")))??;

    tokio::fs::rename(&tmp_path, &global.config_path)
        .await
        .map_err(|e| SentinelError::ConfigRewrite(format!("atomic rename failed: {e}")))?;

    info!("rewrote configuration file '{}'", global.config_path.display());
    Ok(())
}

fn temp_path(config_path: &Path) -> PathBuf {
    let file_name = config_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "warden.conf".to_string());
    config_path.with_file_name(format!("temp-rewrite-{file_name}"))
}

/// Builds a fresh `PrimaryRecord` set from a parsed config, for initial
/// startup (§6).
pub fn build_primaries(parsed: &ParsedConfig) -> Vec<PrimaryRecord> {
    parsed
        .masters
        .iter()
        .map(|(name, addr, cfg)| {
            let mut p = PrimaryRecord::new(name.clone(), addr.clone(), cfg.clone());
            if let Some(epoch) = parsed.config_epochs.get(name) {
                p.config_epoch = *epoch;
            }
            if let Some(epoch) = parsed.leader_epochs.get(name) {
                p.leader_epoch = Some(*epoch);
            }
            p
        })
        .collect()
}
