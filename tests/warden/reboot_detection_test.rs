// tests/warden/reboot_detection_test.rs
//
// §8 scenario S6 "reboot detection": once INFO reveals a primary's run id
// changed, `PRIMARY_REBOOTING` is set with `reboot_seen_at`. If the primary
// goes silent past `master_reboot_down_after_period`, `+sdown` fires even
// though the ordinary `down_after_period` is far longer and would not have
// fired yet on its own. (The other half of S6 — a stable PONG clearing the
// flag before that window elapses — is exercised by
// `monitor::tests::stable_pong_clears_reboot_flag`, since the PING
// round-trip that clears it needs a real command connection this suite
// otherwise avoids opening.)

use spineldb::warden::instance::StatusFlags;
use spineldb::warden::monitor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fixtures::*;

#[tokio::test]
async fn reboot_forces_sdown_before_ordinary_down_after_would_fire() {
    let my_id = run_id(0x60);
    let global = global_state(&my_id);

    // A generous ordinary timeout that would never fire within this test.
    let mut primary = bare_primary("mymaster", 2, Duration::from_secs(300));
    primary.config.master_reboot_down_after_period = Duration::from_millis(20);

    let t0 = Instant::now();
    // The link is otherwise perfectly healthy.
    primary.link.last_pong_time = Some(t0);
    // INFO just reported a changed run id: reboot detected.
    primary.flags.insert(StatusFlags::PRIMARY_REBOOTING);
    primary.reboot_seen_at = Some(t0);

    let arc = Arc::new(parking_lot::Mutex::new(primary));
    global.masters.insert("mymaster".to_string(), arc.clone());

    // Still within the reboot grace window: not yet down.
    monitor::run_down_detection(&global, &arc, t0 + Duration::from_millis(5)).await;
    assert!(!arc.lock().flags.contains(StatusFlags::S_DOWN), "must not be SDOWN inside the grace window");

    // Past `master_reboot_down_after_period`, still silent (no PONG ever
    // updated `last_pong_time`): forced SDOWN despite the 300s ordinary
    // timeout being nowhere close to elapsed.
    monitor::run_down_detection(&global, &arc, t0 + Duration::from_millis(25)).await;
    {
        let p = arc.lock();
        assert!(p.flags.contains(StatusFlags::S_DOWN), "reboot window elapsed without a PONG, must be SDOWN");
        assert!(p.down_since.is_some());
    }
}

#[tokio::test]
async fn no_reboot_flag_means_ordinary_timeout_still_applies() {
    let my_id = run_id(0x61);
    let global = global_state(&my_id);

    let mut primary = bare_primary("mymaster", 2, Duration::from_secs(300));
    primary.config.master_reboot_down_after_period = Duration::from_millis(20);
    let t0 = Instant::now();
    primary.link.last_pong_time = Some(t0);

    let arc = Arc::new(parking_lot::Mutex::new(primary));
    global.masters.insert("mymaster".to_string(), arc.clone());

    // No reboot ever observed: the short reboot window must have no effect.
    monitor::run_down_detection(&global, &arc, t0 + Duration::from_millis(100)).await;
    assert!(!arc.lock().flags.contains(StatusFlags::S_DOWN));
}
