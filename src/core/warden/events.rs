// src/core/warden/events.rs

//! The `+event`/`-event` notification bus (§6 Events). Every event is
//! published on the primary's own pub/sub channel named after the event
//! (e.g. `+sdown`, `-odown`, `+switch-master`), written to the process log
//! at an appropriate level, and optionally handed to the configured
//! notification script.

use std::fmt;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum Event {
    SdownEnter { kind: &'static str, id: String },
    SdownExit { kind: &'static str, id: String },
    OdownEnter { master: String },
    OdownExit { master: String },
    FailoverStart { master: String },
    FailoverEnd { master: String },
    FailoverEndForTimeout { master: String },
    FailoverNoGoodReplica { master: String },
    TiltEnter,
    TiltExit,
    SwitchMaster { master: String, old: String, new: String },
    NewMaster { master: String, addr: String },
    NewReplica { master: String, addr: String },
    ReplicaReconf { master: String, addr: String },
    VoteForLeader { master: String, candidate_run_id: String, epoch: u64 },
    NewEpoch { epoch: u64 },
    ElectedLeader { master: String, epoch: u64 },
    FailoverAbortNotElected { master: String },
    ScriptError { script: String, message: String },
}

impl Event {
    /// The pub/sub channel name this event is published on, matching the
    /// original implementation's channel naming (`+`/`-` prefix).
    pub fn channel(&self) -> &'static str {
        match self {
            Event::SdownEnter { .. } => "+sdown",
            Event::SdownExit { .. } => "-sdown",
            Event::OdownEnter { .. } => "+odown",
            Event::OdownExit { .. } => "-odown",
            Event::FailoverStart { .. } => "+failover-triggered",
            Event::FailoverEnd { .. } => "+failover-end",
            Event::FailoverEndForTimeout { .. } => "+failover-end-for-timeout",
            Event::FailoverNoGoodReplica { .. } => "-failover-abort-no-good-slave",
            Event::TiltEnter => "+tilt",
            Event::TiltExit => "-tilt",
            Event::SwitchMaster { .. } => "+switch-master",
            Event::NewMaster { .. } => "+monitor",
            Event::NewReplica { .. } => "+slave",
            Event::ReplicaReconf { .. } => "+slave-reconf-sent",
            Event::VoteForLeader { .. } => "+vote-for-leader",
            Event::NewEpoch { .. } => "+new-epoch",
            Event::ElectedLeader { .. } => "+elected-leader",
            Event::FailoverAbortNotElected { .. } => "-failover-abort-not-elected",
            Event::ScriptError { .. } => "-script-error",
        }
    }

    /// The space-separated payload body published alongside the channel
    /// name, matching the original's `%s %s %s ...` event formatting.
    pub fn payload(&self) -> String {
        match self {
            Event::SdownEnter { kind, id } | Event::SdownExit { kind, id } => format!("{kind} {id}"),
            Event::OdownEnter { master } | Event::OdownExit { master } => master.clone(),
            Event::FailoverStart { master }
            | Event::FailoverEnd { master }
            | Event::FailoverEndForTimeout { master }
            | Event::FailoverNoGoodReplica { master } => master.clone(),
            Event::TiltEnter | Event::TiltExit => String::new(),
            Event::SwitchMaster { master, old, new } => format!("{master} {old} {new}"),
            Event::NewMaster { master, addr } | Event::NewReplica { master, addr } => {
                format!("{master} {addr}")
            }
            Event::ReplicaReconf { master, addr } => format!("{master} {addr}"),
            Event::VoteForLeader { master, candidate_run_id, epoch } => {
                format!("{master} {candidate_run_id} {epoch}")
            }
            Event::NewEpoch { epoch } => epoch.to_string(),
            Event::ElectedLeader { master, epoch } => format!("{master} {epoch}"),
            Event::FailoverAbortNotElected { master } => master.clone(),
            Event::ScriptError { script, message } => format!("{script}: {message}"),
        }
    }

    fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::OdownEnter { .. }
                | Event::FailoverNoGoodReplica { .. }
                | Event::FailoverAbortNotElected { .. }
                | Event::ScriptError { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.channel(), self.payload())
    }
}

/// Broadcasts events to the listener (for `SENTINEL` pub/sub-over-RESP
/// delivery, §4.8) and logs every one. The script queue (`scripts.rs`)
/// subscribes to the same bus to decide when to enqueue a notification run.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        if event.is_warning() {
            warn!(target: "warden::event", "{event}");
        } else {
            info!(target: "warden::event", "{event}");
        }
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
