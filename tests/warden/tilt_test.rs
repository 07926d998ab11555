// tests/warden/tilt_test.rs
//
// §8 scenario S3 "tilt": a large wall-clock drift (the scheduler stalling,
// e.g. a `fork()` for `BGSAVE` on the host, or the test process itself being
// descheduled) must suppress SDOWN/ODOWN transitions and all failover
// advancement for `TILT_PERIOD` after the drift stops, exactly as
// `monitor::tick`'s `if tilt_active { return; }` gate does (§4.6). This test
// reproduces that gate directly around `run_down_detection`/
// `run_failover_driver` rather than calling `tick()`, since `tick()` also
// drives the real connect/reconnect half this suite avoids.

use spineldb::warden::instance::StatusFlags;
use spineldb::warden::monitor;
use spineldb::warden::state::TiltState;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fixtures::*;

/// Mirrors the private constants `run_tilt_driver` feeds into
/// `TiltState::observe_tick` (§4.6 defaults).
const TILT_TRIGGER: Duration = Duration::from_millis(2000);
const TILT_PERIOD: Duration = Duration::from_millis(30_000);

async fn acting_half(global: &spineldb::warden::state::GlobalWardenState, arc: &Arc<parking_lot::Mutex<spineldb::warden::instance::PrimaryRecord>>, now: Instant, tilt_active: bool) {
    if tilt_active {
        return;
    }
    monitor::run_down_detection(global, arc, now).await;
    monitor::run_failover_driver(global, arc, now).await;
}

#[tokio::test]
async fn tilt_suppresses_down_detection_until_period_elapses() {
    let my_id = run_id(0x50);
    let global = global_state(&my_id);

    let mut primary = bare_primary("mymaster", 2, Duration::from_millis(10));
    add_replica(&mut primary, "replica-1", 6380, 100, 1000, &run_id(0x51));
    let arc = Arc::new(parking_lot::Mutex::new(primary));
    global.masters.insert("mymaster".to_string(), arc.clone());

    let tilt = TiltState::default();
    assert!(!tilt.is_active());

    let t0 = Instant::now();
    // Prime the tilt driver's clock so the next sample has a baseline.
    assert_eq!(tilt.observe_tick(t0, TILT_TRIGGER, TILT_PERIOD), None);

    // A huge gap between samples (a stall) trips TILT.
    let stall_end = t0 + Duration::from_secs(5);
    assert_eq!(tilt.observe_tick(stall_end, TILT_TRIGGER, TILT_PERIOD), Some(true));
    assert!(tilt.is_active());

    // The primary's link has been silent for far longer than `down_after`,
    // but while tilt is active the acting half must not run at all.
    arc.lock().link.last_pong_time = Some(t0 - Duration::from_millis(500));
    acting_half(&global, &arc, stall_end, tilt.is_active()).await;
    {
        let p = arc.lock();
        assert!(!p.flags.contains(StatusFlags::S_DOWN), "tilt must suppress SDOWN");
        assert!(!p.flags.contains(StatusFlags::O_DOWN));
        assert_eq!(p.failover_state, spineldb::warden::instance::FailoverState::None);
    }

    // Tilt clears `TILT_PERIOD` after it stopped drifting, provided no
    // further stalls are observed in between. Advance in steps smaller than
    // `TILT_TRIGGER` so each sample looks like ordinary polling, not another
    // stall that would push `entered_at` forward.
    let step = Duration::from_millis(1000);
    let mut sample = stall_end;
    let mut cleared_at = None;
    while cleared_at.is_none() && sample < stall_end + TILT_PERIOD + step {
        sample += step;
        match tilt.observe_tick(sample, TILT_TRIGGER, TILT_PERIOD) {
            Some(false) => cleared_at = Some(sample),
            Some(true) => panic!("must not re-enter tilt from ordinary polling gaps"),
            None => assert!(tilt.is_active(), "must stay active until the period elapses"),
        }
    }
    let cleared_at = cleared_at.expect("tilt must clear once TILT_PERIOD has elapsed");
    assert!(!tilt.is_active());

    // Now that tilt is over, the acting half runs normally and the primary
    // is still (correctly) judged down given how long its link has been
    // silent.
    acting_half(&global, &arc, cleared_at, tilt.is_active()).await;
    {
        let p = arc.lock();
        assert!(p.flags.contains(StatusFlags::S_DOWN), "acting half must resume once tilt clears");
    }
}
