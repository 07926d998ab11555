// src/core/warden/state.rs

//! `GlobalWardenState`: the single piece of shared state every monitor tick,
//! the admin listener, and the persistence layer operate on (§3, §6).

use super::events::EventBus;
use super::instance::PrimaryRecord;
use super::scripts::ScriptQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// TILT mode bookkeeping (§4.6): entered when the event loop observes a
/// clock jump or long scheduling delay, exited once `tilt_period` has
/// elapsed without another trigger.
pub struct TiltState {
    active: AtomicBool,
    entered_at: Mutex<Option<Instant>>,
    last_tick_wall: Mutex<Option<Instant>>,
}

impl TiltState {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            entered_at: Mutex::new(None),
            last_tick_wall: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Feeds the wall-clock time observed at the start of a tick; returns
    /// `Some(true)` if this call caused TILT to be (re-)entered,
    /// `Some(false)` if it caused TILT to be exited, `None` otherwise.
    pub fn observe_tick(&self, now: Instant, trigger: Duration, period: Duration) -> Option<bool> {
        let mut last = self.last_tick_wall.lock();
        let drift = last.map(|l| now.saturating_duration_since(l));
        *last = Some(now);

        let was_active = self.active.load(Ordering::Relaxed);
        if let Some(d) = drift
            && d > trigger
        {
            *self.entered_at.lock() = Some(now);
            if !was_active {
                self.active.store(true, Ordering::Relaxed);
                return Some(true);
            }
            return None;
        }

        if was_active {
            let entered = *self.entered_at.lock();
            if let Some(e) = entered
                && now.duration_since(e) > period
            {
                self.active.store(false, Ordering::Relaxed);
                return Some(false);
            }
        }
        None
    }
}

impl Default for TiltState {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide settings loaded from the config file (§6/A.3) that are not
/// per-primary.
pub struct GlobalSettings {
    pub announce_hostnames: bool,
    pub resolve_hostnames: bool,
    pub deny_scripts_reconfig: bool,
    pub bind_addr: SocketAddr,
    pub announce_addr: Option<SocketAddr>,
}

pub struct GlobalWardenState {
    pub my_run_id: String,
    pub masters: DashMap<String, Arc<Mutex<PrimaryRecord>>>,
    pub settings: GlobalSettings,
    pub tilt: TiltState,
    pub events: EventBus,
    pub scripts: Mutex<ScriptQueue>,
    pub config_path: std::path::PathBuf,
    current_epoch: AtomicU64,
}

impl GlobalWardenState {
    pub fn new(my_run_id: String, settings: GlobalSettings, config_path: std::path::PathBuf) -> Self {
        Self {
            my_run_id,
            masters: DashMap::new(),
            settings,
            tilt: TiltState::new(),
            events: EventBus::new(),
            scripts: Mutex::new(ScriptQueue::new()),
            config_path,
            current_epoch: AtomicU64::new(0),
        }
    }

    pub fn with_current_epoch(self, epoch: u64) -> Self {
        self.current_epoch.store(epoch, Ordering::SeqCst);
        self
    }

    /// §4.5: this sentinel's own monotonically increasing epoch.
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::SeqCst)
    }

    /// Raises `current_epoch` to `new` if it is higher than what we already
    /// hold, returning whether a raise occurred. Callers must persist the
    /// configuration before the raise becomes externally observable (§5,
    /// §7 "persistence-before-act").
    pub fn raise_epoch(&self, new: u64) -> bool {
        let mut cur = self.current_epoch.load(Ordering::SeqCst);
        while new > cur {
            match self.current_epoch.compare_exchange_weak(
                cur,
                new,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
        false
    }

    /// §4.5 failover start: "bump current_epoch into failover_epoch" —
    /// allocates a fresh epoch strictly greater than the current one and
    /// adopts it as our own.
    pub fn next_epoch(&self) -> u64 {
        let mut cur = self.current_epoch.load(Ordering::SeqCst);
        loop {
            let candidate = cur + 1;
            match self.current_epoch.compare_exchange_weak(
                cur,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn get_master(&self, name: &str) -> Option<Arc<Mutex<PrimaryRecord>>> {
        self.masters.get(name).map(|e| e.clone())
    }

    pub fn master_names(&self) -> Vec<String> {
        self.masters.iter().map(|e| e.key().clone()).collect()
    }
}
