// tests/warden/split_vote_test.rs
//
// §8 scenario S2 "split vote -> retry": with three known voters and quorum
// 2, nobody reaches the required tally within the election window, so the
// attempt aborts with `-failover-abort-not-elected`; once the cooldown
// (`2 * failover_timeout`) passes and the primary is still ODOWN, a fresh
// attempt begins at a strictly higher epoch (§8 property 2, 7).

use spineldb::warden::events::Event;
use spineldb::warden::instance::{FailoverState, StatusFlags};
use spineldb::warden::monitor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fixtures::*;

#[tokio::test]
async fn split_vote_aborts_then_retries_at_higher_epoch() {
    let my_id = run_id(0x10);
    let global = global_state(&my_id);
    let mut rx = global.events.subscribe();

    let failover_timeout = Duration::from_millis(40);
    let mut primary = bare_primary("mymaster", 2, Duration::from_millis(10));
    primary.config.failover_timeout = failover_timeout;
    add_replica(&mut primary, "replica-1", 6380, 100, 1000, &run_id(0x20));

    for (key, seed) in [("peer-b", 0x30u8), ("peer-c", 0x40u8)] {
        let link = Arc::new(parking_lot::Mutex::new(spineldb::warden::link::InstanceLink::new()));
        let mut peer = spineldb::warden::instance::PeerSentinelRecord::new(addr(26380), run_id(seed), link);
        peer.flags.insert(StatusFlags::PRIMARY_DOWN_FROM_PEER);
        primary.sentinels.insert(key.to_string(), peer);
    }

    let t0 = Instant::now();
    primary.link.last_pong_time = Some(t0 - Duration::from_millis(100));
    let arc = Arc::new(parking_lot::Mutex::new(primary));
    global.masters.insert("mymaster".to_string(), arc.clone());

    monitor::run_down_detection(&global, &arc, t0).await;
    let first_epoch = {
        let mut p = arc.lock();
        assert_eq!(p.failover_state, FailoverState::WaitStart);
        // Pin the desync jitter `try_start` applied so the election-timeout
        // deadline below is exact rather than racing a random 0-1000ms smear.
        p.failover_start_time = Some(t0);
        p.failover_epoch
    };
    assert!(first_epoch > 0);

    // Split vote: our own self-vote and one peer voting for itself, neither
    // reaching `required = max(majority, quorum) = 2`.
    arc.lock()
        .votes_received
        .insert("peer-b".to_string(), ("peer-b-candidate".to_string(), first_epoch));

    // Past both the election timeout and the (shorter) failover timeout.
    let past_election = t0 + Duration::from_millis(50);
    monitor::run_failover_driver(&global, &arc, past_election).await;
    {
        let p = arc.lock();
        assert_eq!(p.failover_state, FailoverState::None, "expected the attempt to abort");
        assert!(!p.flags.contains(StatusFlags::FAILOVER_IN_PROGRESS));
    }

    let mut saw_abort = false;
    while let Ok(event) = rx.try_recv() {
        if let Event::FailoverAbortNotElected { master } = event {
            assert_eq!(master, "mymaster");
            saw_abort = true;
        }
    }
    assert!(saw_abort, "expected a -failover-abort-not-elected event");

    // Too soon after the abort: still cooling down, no new attempt yet.
    let too_soon = past_election + failover_timeout / 2;
    monitor::run_down_detection(&global, &arc, too_soon).await;
    assert_eq!(arc.lock().failover_state, FailoverState::None);

    // Once `2 * failover_timeout` has elapsed since the last attempt ended
    // and the primary is still ODOWN, a new attempt starts at a higher
    // epoch than the first.
    let retry_time = past_election + failover_timeout * 2 + Duration::from_millis(5);
    monitor::run_down_detection(&global, &arc, retry_time).await;
    let second_epoch = {
        let p = arc.lock();
        assert_eq!(p.failover_state, FailoverState::WaitStart);
        p.failover_epoch
    };
    assert!(
        second_epoch > first_epoch,
        "retry must use a strictly higher epoch ({second_epoch} <= {first_epoch})"
    );
}
