// tests/warden/replica_selection_test.rs
//
// §8 scenario S5 "two replicas tie on priority and offset": selection order
// is priority ascending, then replication offset descending, then run id
// ascending, with a NULL run id sorting after every non-null one rather
// than excluding the replica (§4.5.1 step 2, property 8).

use spineldb::warden::instance::{PrimaryConfig, PrimaryRecord, ReplicaRecord};
use std::time::{Duration, Instant};

use super::fixtures::*;

const PING_PERIOD: Duration = Duration::from_millis(1000);
const INFO_PERIOD: Duration = Duration::from_millis(10_000);

fn primary_with_two_tied_replicas() -> PrimaryRecord {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, &run_id(0xaa), 6380, 100, 500, &run_id(0xaa));
    add_replica(&mut p, &run_id(0xbb), 6381, 100, 500, &run_id(0xbb));
    p
}

#[test]
fn lower_run_id_wins_a_full_tie() {
    let p = primary_with_two_tied_replicas();
    let now = Instant::now();
    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD).as_deref(),
        Some(run_id(0xaa).as_str())
    );
}

#[test]
fn higher_priority_number_loses_even_with_better_offset() {
    // Lower priority number wins (priority ascending): a replica configured
    // with priority 10 beats one at priority 100 even though the latter has
    // replicated further.
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "low-priority", 6380, 10, 100, &run_id(0x01));
    add_replica(&mut p, "high-priority-more-offset", 6381, 100, 900, &run_id(0x02));
    let now = Instant::now();
    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD),
        Some("low-priority".to_string())
    );
}

#[test]
fn priority_zero_is_never_eligible() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "never-promote", 6380, 0, 999_999, &run_id(0x01));
    add_replica(&mut p, "only-eligible", 6381, 50, 1, &run_id(0x02));
    let now = Instant::now();
    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD),
        Some("only-eligible".to_string())
    );
}

#[test]
fn higher_offset_wins_when_priority_ties() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "behind", 6380, 100, 10, &run_id(0x01));
    add_replica(&mut p, "ahead", 6381, 100, 5000, &run_id(0x02));
    let now = Instant::now();
    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD),
        Some("ahead".to_string())
    );
}

/// Property 8 / scenario S5: a replica with no known run id yet (INFO not
/// parsed even once) is still a candidate — it just loses every tie against
/// one that does have a run id, since NULL sorts after any non-null value.
#[test]
fn replica_with_unknown_run_id_loses_tie_but_is_not_excluded() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    let now = Instant::now();
    let mut unknown = ReplicaRecord::new(addr(6380));
    unknown.priority = 1;
    unknown.info.replica_repl_offset = 1_000_000;
    unknown.link.disconnected = false;
    unknown.link.last_pong_time = Some(now);
    unknown.last_info_time = Some(now);
    // run_id left None: INFO has never succeeded for this replica.
    p.replicas.insert("unknown".to_string(), unknown);
    add_replica(&mut p, "known", 6381, 100, 1, &run_id(0x02));

    // "unknown" has better priority and offset, so it wins outright: a NULL
    // run id only loses on a tiebreak, it doesn't disqualify the replica.
    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD),
        Some("unknown".to_string())
    );
}

#[test]
fn null_run_id_loses_tiebreak_against_a_known_run_id() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    let now = Instant::now();
    let mut unknown = ReplicaRecord::new(addr(6380));
    unknown.priority = 100;
    unknown.info.replica_repl_offset = 500;
    unknown.link.disconnected = false;
    unknown.link.last_pong_time = Some(now);
    unknown.last_info_time = Some(now);
    p.replicas.insert("unknown".to_string(), unknown);
    add_replica(&mut p, "known", 6381, 100, 500, &run_id(0x02));

    assert_eq!(
        p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD),
        Some("known".to_string())
    );
}

#[test]
fn sdown_replica_is_excluded() {
    use spineldb::warden::instance::StatusFlags;

    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "down", 6380, 10, 999, &run_id(0x01));
    p.replicas.get_mut("down").unwrap().flags.insert(StatusFlags::S_DOWN);
    add_replica(&mut p, "up", 6381, 100, 1, &run_id(0x02));

    let now = Instant::now();
    assert_eq!(p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD), Some("up".to_string()));
}

#[test]
fn disconnected_replica_link_is_excluded() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "disconnected", 6380, 10, 999, &run_id(0x01));
    p.replicas.get_mut("disconnected").unwrap().link.disconnected = true;
    add_replica(&mut p, "up", 6381, 100, 1, &run_id(0x02));

    let now = Instant::now();
    assert_eq!(p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD), Some("up".to_string()));
}

#[test]
fn stale_pong_excludes_a_replica() {
    let mut p = PrimaryRecord::new("mymaster".to_string(), addr(6379), PrimaryConfig::default());
    add_replica(&mut p, "stale", 6380, 10, 999, &run_id(0x01));
    let now = Instant::now();
    p.replicas.get_mut("stale").unwrap().link.last_pong_time = Some(now - PING_PERIOD * 6);
    add_replica(&mut p, "up", 6381, 100, 1, &run_id(0x02));

    assert_eq!(p.select_promotion_candidate(now, PING_PERIOD, INFO_PERIOD), Some("up".to_string()));
}
