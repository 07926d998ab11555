// src/core/warden/mod.rs

//! The main module for SpinelDB's high-availability and monitoring system, "Warden".
//!
//! Warden runs as a separate process mode (`--warden`) and is responsible for:
//! - Monitoring the health of primary and replica SpinelDB instances.
//! - Detecting when a primary instance is down (Subjective Down and Objective Down).
//! - Coordinating with other Warden instances to reach a quorum.
//! - Triggering and managing an automated failover process to promote a replica to a new primary.
//! - Providing an API for clients to query the current address of a master.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

// Declare all sub-modules that make up the Warden functionality.
pub mod address;
pub mod admin;
pub mod events;
pub mod failover;
pub mod gossip;
pub mod info_parser;
pub mod instance;
pub mod link;
pub mod monitor;
pub mod persistence;
pub mod quorum;
pub mod scripts;
pub mod state;

use self::state::GlobalWardenState;

/// §4.6 tilt-detection window: scheduling delay beyond this between two
/// consecutive driver wakeups is treated as a clock jump or CPU starvation.
const TILT_TRIGGER: Duration = Duration::from_millis(2000);
/// §4.6: once triggered, TILT holds for this long without another trigger.
const TILT_PERIOD: Duration = Duration::from_millis(30_000);
/// How often the tilt driver samples the wall clock (finer than
/// `monitor::PING_PERIOD` so a stall is detected promptly).
const TILT_SAMPLE_PERIOD: Duration = Duration::from_millis(500);
const SCRIPT_DRAIN_PERIOD: Duration = Duration::from_millis(200);

/// The main entry point for running SpinelDB in Warden mode.
pub async fn run(config_path: &str) -> Result<()> {
    let config_path = PathBuf::from(config_path);
    let parsed = persistence::load(&config_path)
        .await
        .map_err(|e| anyhow!("failed to load Warden configuration: {e}"))?;

    // This sentinel's own run id is persisted via the `myid` directive once
    // chosen, so it survives restarts (§3); generate a fresh one only the
    // first time the config file is seen without it.
    let (my_run_id, first_run) = match parsed.my_run_id.clone() {
        Some(id) if id.len() == 40 => (id, false),
        _ => {
            let mut bytes = [0u8; 20];
            getrandom::fill(&mut bytes).map_err(|e| anyhow!("failed to generate run ID: {e}"))?;
            (hex::encode(bytes), true)
        }
    };
    info!("Warden run ID: {}", my_run_id);

    let current_epoch = parsed.current_epoch;
    let global = Arc::new(
        GlobalWardenState::new(my_run_id, parsed.settings, config_path).with_current_epoch(current_epoch),
    );

    let primary_names: Vec<String> = {
        let primaries = persistence::build_primaries(&parsed);
        let names = primaries.iter().map(|p| p.name.clone()).collect::<Vec<_>>();
        for p in primaries {
            info!("monitoring primary '{}' at {}", p.name, p.addr);
            global.masters.insert(p.name.clone(), Arc::new(Mutex::new(p)));
        }
        names
    };

    if first_run {
        // Stamps `myid` (and the rest of the startup state) into the config
        // file immediately so a crash right after boot doesn't regenerate a
        // new identity on the next restart.
        if let Err(e) = persistence::rewrite(&global).await {
            warn!("failed to persist initial Warden configuration: {e}");
        }
    }

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    for name in primary_names {
        let global = global.clone();
        tasks.spawn(async move { run_primary_loop(global, name).await });
    }

    {
        let global = global.clone();
        tasks.spawn(async move { run_tilt_driver(global).await });
    }

    {
        let global = global.clone();
        tasks.spawn(async move { run_script_drainer(global).await });
    }

    {
        let global = global.clone();
        tasks.spawn(async move {
            admin::run(global)
                .await
                .map_err(|e| anyhow!("Warden admin listener exited: {e}"))
        });
    }

    // Wait for any of the main tasks to complete. In normal operation, this loop
    // should not exit. If it does, it indicates a critical failure.
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {
                warn!("a Warden task completed unexpectedly without an error.");
            }
            Ok(Err(e)) => {
                error!("a Warden task failed: {e}");
            }
            Err(e) => {
                error!("a Warden task panicked: {e}");
            }
        }
    }

    Err(anyhow!("all Warden tasks have terminated, shutting down."))
}

/// One monitor-tick loop per configured primary (§4.3). Ticks are staggered
/// with a small random offset so that many primaries configured on the same
/// Warden don't all poll their links in the same instant.
async fn run_primary_loop(global: Arc<GlobalWardenState>, name: String) -> Result<()> {
    let startup_jitter = rand::thread_rng().gen_range(0..monitor::PING_PERIOD.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(startup_jitter)).await;

    let mut ticker = tokio::time::interval(monitor::PING_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let tilt_active = global.tilt.is_active();
        monitor::tick(&global, &name, now, tilt_active).await;
    }
}

/// Feeds the shared wall clock into `TiltState` once per `TILT_SAMPLE_PERIOD`
/// (§4.6). A stall here (the scheduler starving this task) is exactly the
/// condition TILT exists to detect, so the same clock reading is what every
/// primary's monitor loop consults via `global.tilt.is_active()`.
async fn run_tilt_driver(global: Arc<GlobalWardenState>) -> Result<()> {
    let mut ticker = tokio::time::interval(TILT_SAMPLE_PERIOD);
    loop {
        ticker.tick().await;
        let now = Instant::now();
        match global.tilt.observe_tick(now, TILT_TRIGGER, TILT_PERIOD) {
            Some(true) => warn!("entering TILT mode: scheduling delay exceeded trigger threshold"),
            Some(false) => info!("exiting TILT mode: no further scheduling delay observed"),
            None => {}
        }
    }
}

/// Drains the notification/client-reconfig script queue (§6). Kept as its
/// own task so a burst of script launches never competes with monitor ticks
/// for the same executor slot.
async fn run_script_drainer(global: Arc<GlobalWardenState>) -> Result<()> {
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut ticker = tokio::time::interval(SCRIPT_DRAIN_PERIOD);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                global.scripts.lock().drain_ready(now, &done_tx);
            }
            Some(outcome) = done_rx.recv() => {
                global.scripts.lock().record_outcome(outcome);
            }
        }
    }
}
