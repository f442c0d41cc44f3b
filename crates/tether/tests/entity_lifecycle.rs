mod common;

use tether::{EntityKind, EntityResolver, HealthStatus, KindPayload, TetherConfig};

use common::*;

fn resolver() -> EntityResolver {
    EntityResolver::new(shared_offsets(), &TetherConfig::default())
}

fn addresses(resolver: &EntityResolver) -> Vec<u64> {
    let mut found: Vec<u64> = resolver
        .current_entities()
        .iter()
        .map(|e| e.address)
        .collect();
    found.sort();
    found
}

#[test]
fn registration_churn_over_three_cycles() {
    let mock = target();
    start_session(&mock);
    for actor in [0x1000, 0x2000, 0x3000] {
        spawn_actor(&mock, actor);
    }
    let ctx = context();
    let mut resolver = resolver();

    set_registration(&mock, &[0x1000, 0x2000]);
    let first = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(first.constructed, 2);
    assert_eq!(addresses(&resolver), [0x1000, 0x2000]);

    set_registration(&mock, &[0x2000, 0x3000]);
    let second = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(second.constructed, 1);
    assert_eq!(second.evicted, 0);
    assert_eq!(second.pending, 1);
    assert_eq!(addresses(&resolver), [0x1000, 0x2000, 0x3000]);

    let snapshot = resolver.current_entities();
    assert!(!snapshot.get(0x1000).unwrap().fresh);
    assert!(snapshot.get(0x2000).unwrap().fresh);

    set_registration(&mock, &[0x3000]);
    let third = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(third.evicted, 1);
    assert_eq!(third.pending, 1);
    assert_eq!(addresses(&resolver), [0x2000, 0x3000]);
    assert!(!resolver.current_entities().get(0x2000).unwrap().fresh);
}

#[test]
fn unchanged_registration_is_idempotent() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000]);
    let ctx = context();
    let mut resolver = resolver();

    assert!(resolver.refresh(&mock, &ctx).unwrap().membership_changed());
    for _ in 0..3 {
        let report = resolver.refresh(&mock, &ctx).unwrap();
        assert!(!report.membership_changed());
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.added, 0);
    }
    assert_eq!(resolver.len(), 1);
}

#[test]
fn constructed_entity_carries_kind_and_state() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    mock.set_i32(health_of(0x1000) + offsets().actor.health_status, 0x400 | 0x1000);
    set_registration(&mock, &[0x1000]);
    let mut resolver = resolver();

    resolver.refresh(&mock, &context()).unwrap();
    let snapshot = resolver.current_entities();
    let entity = snapshot.get(0x1000).unwrap();

    assert_eq!(entity.kind(), EntityKind::Simulated);
    assert_eq!(
        entity.payload,
        KindPayload::Simulated {
            role: Some("scav".into())
        }
    );
    assert_eq!(entity.health, HealthStatus::BadlyInjured);
    assert_eq!(entity.position.x, 0x1000 as f32);
    assert!(entity.alive);
    assert!(entity.fresh);
}

#[test]
fn reused_address_is_rejected_until_valid() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    recycle_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000]);
    let ctx = context();
    let mut resolver = resolver();

    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.rejected, 1);
    assert!(resolver.current_entities().is_empty());

    // Object finishes initialising: the next sweep retries construction
    spawn_actor(&mock, 0x1000);
    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.constructed, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn recycled_entity_is_evicted_on_refresh() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    spawn_actor(&mock, 0x2000);
    set_registration(&mock, &[0x1000, 0x2000]);
    let ctx = context();
    let mut resolver = resolver();
    resolver.refresh(&mock, &ctx).unwrap();

    recycle_actor(&mock, 0x2000);
    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn one_broken_actor_does_not_fail_the_cycle() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000, 0x7000]);
    let mut resolver = resolver();

    // 0x7000 was never written: every read of it fails
    let report = resolver.refresh(&mock, &context()).unwrap();
    assert_eq!(report.constructed, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn out_of_range_faction_is_rejected_alone() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    spawn_actor(&mock, 0x2000);
    mock.set_i32(0x2000 + offsets().actor.side, 3);
    set_registration(&mock, &[0x1000, 0x2000]);
    let mut resolver = resolver();

    let report = resolver.refresh(&mock, &context()).unwrap();
    assert_eq!(report.constructed, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
    assert!(resolver.current_entities().get(0x1000).unwrap().fresh);
}

#[test]
fn malformed_registration_entries_are_dropped() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000, 0xFFFF_FFFF_FFFF_FF00, 0x8000_0000_0000]);
    let mut resolver = resolver();

    let report = resolver.refresh(&mock, &context()).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.constructed, 1);
    assert_eq!(report.rejected, 0);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn non_canonical_movement_pointer_is_rejected() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    spawn_actor(&mock, 0x2000);
    mock.set_u64(0x2000 + offsets().actor.movement, 0xFFFF_FFFF_FFFF_FFF8);
    set_registration(&mock, &[0x1000, 0x2000]);
    let mut resolver = resolver();

    let report = resolver.refresh(&mock, &context()).unwrap();
    assert_eq!(report.constructed, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn rejected_address_is_retried_with_backoff() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000, 0x7000]);
    let ctx = context();
    let mut resolver = resolver();

    let rejected_in: Vec<u64> = (0..10)
        .map(|_| resolver.refresh(&mock, &ctx).unwrap())
        .filter(|report| report.rejected > 0)
        .map(|report| report.cycle)
        .collect();
    assert_eq!(rejected_in, [1, 2, 4, 8]);

    // Between retries nothing is rebuilt
    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert!(!report.membership_changed());
    assert_eq!(report.refreshed, 1);
    assert_eq!(addresses(&resolver), [0x1000]);
}

#[test]
fn local_kind_follows_the_world_pointer() {
    let mock = target();
    start_session(&mock);
    spawn_actor(&mock, 0x1000);
    set_registration(&mock, &[0x1000]);
    let ctx = context();
    let mut resolver = resolver();

    resolver.refresh(&mock, &ctx).unwrap();
    assert!(resolver.current_entities().local().is_none());

    // Local pointer is published after the actor registered
    set_local_actor(&mock, 0x1000);
    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.reclassified, 1);
    assert!(report.membership_changed());
    let snapshot = resolver.current_entities();
    let local = snapshot.local().unwrap();
    assert_eq!(local.address, 0x1000);
    assert_eq!(local.kind(), EntityKind::Local);
    assert!(local.fresh);

    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.reclassified, 0);
    assert!(!report.membership_changed());

    set_local_actor(&mock, 0);
    let report = resolver.refresh(&mock, &ctx).unwrap();
    assert_eq!(report.reclassified, 1);
    let snapshot = resolver.current_entities();
    assert!(snapshot.local().is_none());
    assert_eq!(snapshot.get(0x1000).unwrap().kind(), EntityKind::Simulated);
}

#[test]
fn lost_process_fails_the_cycle() {
    let mock = target();
    start_session(&mock);
    let mut resolver = resolver();
    mock.kill();

    let err = resolver.refresh(&mock, &context()).unwrap_err();
    assert!(err.is_process_lost());
}
