// tests/warden/clean_failover_test.rs
//
// §8 scenario S1 "clean failover": a primary with quorum=2 and one healthy
// replica goes SDOWN, reaches ODOWN once two peers concur, one sentinel
// wins the election and drives the FSM through to completion, ending with
// `+switch-master` and the primary record now pointing at the replica.

use spineldb::warden::events::Event;
use spineldb::warden::instance::{FailoverState, StatusFlags};
use spineldb::warden::monitor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fixtures::*;

#[tokio::test]
async fn clean_failover_promotes_replica_and_emits_switch_master() {
    let my_id = run_id(1);
    let global = global_state(&my_id);
    let mut rx = global.events.subscribe();

    let down_after = Duration::from_millis(30);
    let mut primary = bare_primary("mymaster", 2, down_after);
    add_replica(&mut primary, "replica-1", 6380, 100, 1000, &run_id(2));

    // Two peer sentinels already report the primary down (the "isolated
    // from all sentinels" premise of S1 is observed here as their reported
    // view, since the actual gossip round-trip is covered by gossip_test).
    for (key, seed) in [("peer-b", 3u8), ("peer-c", 4u8)] {
        let link = Arc::new(parking_lot::Mutex::new(spineldb::warden::link::InstanceLink::new()));
        let mut peer =
            spineldb::warden::instance::PeerSentinelRecord::new(addr(26380), run_id(seed), link);
        peer.flags.insert(StatusFlags::PRIMARY_DOWN_FROM_PEER);
        primary.sentinels.insert(key.to_string(), peer);
    }

    let now = Instant::now();
    primary.link.last_pong_time = Some(now - Duration::from_millis(100));

    let arc = Arc::new(parking_lot::Mutex::new(primary));
    global.masters.insert("mymaster".to_string(), arc.clone());

    // Tick 1: down-detection drives SDOWN -> ODOWN -> failover start.
    monitor::run_down_detection(&global, &arc, now).await;
    {
        let p = arc.lock();
        assert!(p.flags.contains(StatusFlags::S_DOWN));
        assert!(p.flags.contains(StatusFlags::O_DOWN));
        assert_eq!(p.failover_state, FailoverState::WaitStart);
    }

    let epoch = arc.lock().failover_epoch;
    assert!(epoch > 0);
    // A peer also votes for us at the same epoch, putting our tally at
    // quorum (self-vote + one peer, required = max(majority, quorum) = 2).
    arc.lock()
        .votes_received
        .insert("peer-b".to_string(), (my_id.clone(), epoch));

    // WaitStart -> SelectReplica (elected leader).
    monitor::run_failover_driver(&global, &arc, now).await;
    assert_eq!(arc.lock().failover_state, FailoverState::SelectReplica);

    // SelectReplica -> SendReplicaofNoOne.
    monitor::run_failover_driver(&global, &arc, now).await;
    assert_eq!(arc.lock().failover_state, FailoverState::SendReplicaofNoOne);
    assert_eq!(arc.lock().promoted_replica.as_deref(), Some("replica-1"));

    // SendReplicaofNoOne -> WaitPromotion.
    monitor::run_failover_driver(&global, &arc, now).await;
    assert_eq!(arc.lock().failover_state, FailoverState::WaitPromotion);

    // The next INFO on the promoted replica reports role:master.
    arc.lock()
        .replicas
        .get_mut("replica-1")
        .unwrap()
        .flags
        .insert(StatusFlags::PROMOTED);

    // WaitPromotion -> ReconfReplicas (no other replicas to reconfigure).
    monitor::run_failover_driver(&global, &arc, now).await;
    assert_eq!(arc.lock().failover_state, FailoverState::ReconfReplicas);

    // ReconfReplicas -> UpdateConfig (nothing left in the reconfiguring set).
    monitor::run_failover_driver(&global, &arc, now).await;
    assert_eq!(arc.lock().failover_state, FailoverState::UpdateConfig);

    // UpdateConfig -> None, address switched, events published.
    monitor::run_failover_driver(&global, &arc, now).await;
    {
        let p = arc.lock();
        assert_eq!(p.failover_state, FailoverState::None);
        assert_eq!(p.addr.port, 6380);
        assert!(!p.replicas.contains_key("replica-1"));
        assert!(!p.flags.contains(StatusFlags::FAILOVER_IN_PROGRESS));
    }

    let mut saw_switch_master = false;
    let mut saw_failover_end = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::SwitchMaster { master, new, .. } => {
                assert_eq!(master, "mymaster");
                assert!(new.ends_with(":6380"));
                saw_switch_master = true;
            }
            Event::FailoverEnd { master } => {
                assert_eq!(master, "mymaster");
                saw_failover_end = true;
            }
            _ => {}
        }
    }
    assert!(saw_switch_master, "expected a +switch-master event");
    assert!(saw_failover_end, "expected a +failover-end event");
}
