// src/core/warden/scripts.rs

//! The notification / client-reconfig script queue (§6, limits from
//! SPEC_FULL.md §B). Scripts run as detached child processes; Warden never
//! blocks the monitor loop on them.

use super::events::Event;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::warn;

pub const MAX_QUEUE_LEN: usize = 256;
pub const MAX_RUNNING: usize = 16;
pub const MAX_RETRY: u32 = 10;
pub const RETRY_DELAY: Duration = Duration::from_millis(30_000);
pub const MAX_RUNTIME: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone)]
pub struct QueuedScript {
    pub path: String,
    pub args: Vec<String>,
    pub retries: u32,
    pub next_attempt: Instant,
}

/// A FIFO queue of pending script invocations plus a count of currently
/// running ones, so the monitor tick can decide whether to launch more.
pub struct ScriptQueue {
    pending: VecDeque<QueuedScript>,
    running: usize,
}

impl ScriptQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: 0,
        }
    }

    /// Enqueues `path` with `args`, dropping the oldest entry if the queue
    /// is already at capacity (matching the original's bounded queue).
    pub fn enqueue(&mut self, path: String, args: Vec<String>) {
        if self.pending.len() >= MAX_QUEUE_LEN {
            self.pending.pop_front();
        }
        self.pending.push_back(QueuedScript {
            path,
            args,
            retries: 0,
            next_attempt: Instant::now(),
        });
    }

    /// Builds the notification-script invocation for `event`, matching the
    /// original's `<script> <event-type> <event-description>` argument
    /// convention.
    pub fn enqueue_notification(&mut self, script: &str, event: &Event) {
        self.enqueue(
            script.to_string(),
            vec![event.channel().to_string(), event.payload()],
        );
    }

    /// Builds the client-reconfig-script invocation, matching the
    /// original's `<script> <master-name> <role> <state> <from-ip>
    /// <from-port> <to-ip> <to-port>` convention.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_client_reconfig(
        &mut self,
        script: &str,
        master: &str,
        role: &str,
        from_ip: &str,
        from_port: u16,
        to_ip: &str,
        to_port: u16,
    ) {
        self.enqueue(
            script.to_string(),
            vec![
                master.to_string(),
                role.to_string(),
                "start".to_string(),
                from_ip.to_string(),
                from_port.to_string(),
                to_ip.to_string(),
                to_port.to_string(),
            ],
        );
    }

    /// Launches as many due, retry-eligible scripts as capacity allows,
    /// spawning each as a detached tokio child process and bumping
    /// `running` for the duration of the spawned watcher task (which
    /// reports completion back through `done_tx`).
    pub fn drain_ready(&mut self, now: Instant, done_tx: &tokio::sync::mpsc::UnboundedSender<ScriptOutcome>) {
        let mut requeue = Vec::new();
        while self.running < MAX_RUNNING {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            if job.next_attempt > now {
                requeue.push(job);
                continue;
            }
            self.running += 1;
            let tx = done_tx.clone();
            let job_for_log = job.clone();
            tokio::spawn(async move {
                let outcome = run_one(&job_for_log).await;
                let _ = tx.send(outcome);
            });
        }
        for job in requeue {
            self.pending.push_back(job);
        }
    }

    /// Called when a spawned script's watcher task reports back; retries
    /// failures up to `MAX_RETRY` times with `RETRY_DELAY` backoff.
    pub fn record_outcome(&mut self, outcome: ScriptOutcome) {
        self.running = self.running.saturating_sub(1);
        if !outcome.success && outcome.job.retries < MAX_RETRY {
            let mut job = outcome.job;
            job.retries += 1;
            job.next_attempt = Instant::now() + RETRY_DELAY;
            self.pending.push_back(job);
        } else if !outcome.success {
            warn!(
                "script '{}' failed after {} retries, dropping",
                outcome.job.path, outcome.job.retries
            );
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.running
    }
}

impl Default for ScriptQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScriptOutcome {
    pub job: QueuedScript,
    pub success: bool,
}

async fn run_one(job: &QueuedScript) -> ScriptOutcome {
    let result = tokio::time::timeout(
        MAX_RUNTIME,
        Command::new(&job.path)
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await;

    let success = matches!(result, Ok(Ok(status)) if status.success());
    ScriptOutcome {
        job: job.clone(),
        success,
    }
}
