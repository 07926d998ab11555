// src/core/warden/info_parser.rs

//! Parses the handful of `INFO` fields Warden actually needs (§4.3.3) out of
//! a full `INFO` reply, without building a generic INFO object model.

use super::instance::{InfoSnapshot, ReplicaInfoLine, Role};

/// Parses an `INFO` reply body into an `InfoSnapshot`. Unknown/unparseable
/// lines are silently skipped — a malformed or truncated INFO reply yields
/// a partially-filled snapshot rather than an error (§7: INFO parsing never
/// fails the tick).
pub fn parse_info(info: &str) -> InfoSnapshot {
    let mut snap = InfoSnapshot::default();

    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        let val = val.trim();

        match key {
            "role" => {
                snap.role = Some(match val {
                    "master" => Role::Primary,
                    "slave" | "replica" => Role::Replica,
                    _ => Role::Unknown,
                });
            }
            "run_id" | "master_replid" => {
                if snap.run_id.is_none() {
                    snap.run_id = Some(val.to_string());
                }
            }
            "master_repl_offset" => {
                snap.replication_offset = val.parse().unwrap_or(0);
            }
            "master_host" => {
                snap.primary_host = Some(val.to_string());
            }
            "master_port" => {
                snap.primary_port = val.parse().ok();
            }
            "master_link_status" => {
                snap.primary_link_status_ok = val == "up";
            }
            "master_link_down_since_seconds" => {
                snap.primary_link_down_since_seconds = val.parse().ok();
            }
            "slave_priority" => {
                snap.replica_priority = val.parse().unwrap_or(100);
            }
            "slave_repl_offset" => {
                snap.replica_repl_offset = val.parse().unwrap_or(0);
            }
            _ if key.starts_with("slave") && key[5..].chars().all(|c| c.is_ascii_digit()) => {
                if let Some(line) = parse_replica_line(val) {
                    snap.connected_replicas.push(line);
                }
            }
            _ => {}
        }
    }

    snap
}

/// Parses one `slaveN:` value of the form
/// `ip=10.0.0.2,port=6380,state=online,offset=1234,lag=0`.
fn parse_replica_line(val: &str) -> Option<ReplicaInfoLine> {
    let fields: std::collections::HashMap<&str, &str> =
        val.split(',').filter_map(|p| p.split_once('=')).collect();
    let ip = fields.get("ip")?.to_string();
    let port: u16 = fields.get("port")?.parse().ok()?;
    let offset: u64 = fields.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0);
    Some(ReplicaInfoLine { ip, port, offset })
}
