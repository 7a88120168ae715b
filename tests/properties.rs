//! Property tests for the synchronization invariants

use std::collections::BTreeMap;

use glam::Vec3;
use proptest::prelude::*;
use uuid::Uuid;

use arena_sync::config::Tuning;
use arena_sync::game::{apply_command, Command, EntityMode, EntityState, EntityTable, Snapshot};
use arena_sync::sync::{interpolate, RollbackEngine, SnapshotStore};

/// Commands with strictly increasing timestamps
fn arb_commands() -> impl Strategy<Value = Vec<Command>> {
    prop::collection::vec(
        (
            0.001f64..0.1,
            -1.0f32..=1.0,
            -1.0f32..=1.0,
            -5.0f32..5.0,
            -5.0f32..5.0,
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            0u8..10,
        ),
        1..40,
    )
    .prop_map(|steps| {
        let mut timestamp = 0.0;
        steps
            .into_iter()
            .map(|(dt, move_h, move_v, mouse_dx, mouse_dy, fire, fire_edge, block, equip)| {
                timestamp += dt;
                Command {
                    timestamp,
                    move_h,
                    move_v,
                    mouse_dx,
                    mouse_dy,
                    fire,
                    fire_edge,
                    block,
                    equip_primary: equip == 0,
                    equip_secondary: equip == 1,
                    ..Command::default()
                }
            })
            .collect()
    })
}

/// Distinct timestamps, ascending
fn arb_timestamps() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::btree_set(0u32..10_000, 1..30)
        .prop_map(|set| set.into_iter().map(|ms| f64::from(ms) / 100.0).collect())
}

fn spawn(tuning: &Tuning) -> EntityState {
    EntityState::spawn(EntityMode::Authoritative, Vec3::new(1.0, 0.0, 2.0), 30.0, 0.0, tuning)
}

proptest! {
    #[test]
    fn replay_is_deterministic(commands in arb_commands()) {
        let tuning = Tuning::default();
        let mut first = spawn(&tuning);
        for command in &commands {
            first.apply_command(command, &tuning);
        }
        let second = commands
            .iter()
            .fold(spawn(&tuning), |state, command| apply_command(&state, command, &tuning).0);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first.last_applied_command_time, commands.last().unwrap().timestamp);
    }

    #[test]
    fn bracket_straddles_query(times in arb_timestamps(), query in 0.0f64..110.0) {
        let mut store = SnapshotStore::new(f64::INFINITY);
        for t in &times {
            store.record(Snapshot::new(*t, BTreeMap::new(), Vec::new()), *t);
        }

        let bracket = store.find_bracket(query);
        let expected_before = times.iter().copied().filter(|t| *t < query).last();
        let expected_after = times.iter().copied().find(|t| *t >= query);

        prop_assert_eq!(bracket.before.map(Snapshot::timestamp), expected_before);
        prop_assert_eq!(bracket.after.map(Snapshot::timestamp), expected_after);
    }

    #[test]
    fn nothing_outlives_the_ttl(times in arb_timestamps(), ttl in 0.05f64..5.0) {
        let mut store = SnapshotStore::new(ttl);
        for t in &times {
            store.record(Snapshot::new(*t, BTreeMap::new(), Vec::new()), *t);
            prop_assert!(store.iter().all(|s| s.timestamp() >= *t - ttl));
            let stored: Vec<f64> = store.iter().map(Snapshot::timestamp).collect();
            prop_assert!(stored.windows(2).all(|w| w[0] > w[1]));
        }
    }

    #[test]
    fn interpolation_hits_endpoints_and_is_monotonic(
        from in -100.0f32..100.0,
        to in -100.0f32..100.0,
        t1 in 0.0f32..=1.0,
        t2 in 0.0f32..=1.0,
    ) {
        let tuning = Tuning::default();
        let a = EntityState::spawn(EntityMode::Authoritative, Vec3::new(from, 0.0, 0.0), 0.0, 0.0, &tuning).to_snapshot();
        let b = EntityState::spawn(EntityMode::Authoritative, Vec3::new(to, 0.0, 0.0), 90.0, 0.0, &tuning).to_snapshot();

        prop_assert_eq!(interpolate(&a, &b, 0.0), a);
        let end = interpolate(&a, &b, 1.0);
        prop_assert_eq!(end.position, b.position);
        prop_assert_eq!(end.rotation, b.rotation);

        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        let x_lo = interpolate(&a, &b, lo).position.x;
        let x_hi = interpolate(&a, &b, hi).position.x;
        if from <= to {
            prop_assert!(x_lo <= x_hi + 1e-3);
        } else {
            prop_assert!(x_lo + 1e-3 >= x_hi);
        }
    }

    #[test]
    fn rollback_restores_every_entity(
        xs in prop::collection::vec(-50.0f32..50.0, 2..6),
        time in 0.0f64..3.0,
        damage in 0i32..200,
    ) {
        let tuning = Tuning::default();
        let ids: Vec<Uuid> = xs.iter().map(|_| Uuid::new_v4()).collect();
        let mut world = EntityTable::new();
        let mut history = SnapshotStore::new(10.0);

        for step in 0..3 {
            let t = f64::from(step);
            for (id, x) in ids.iter().zip(&xs) {
                let position = Vec3::new(*x + t as f32, 0.0, *x);
                world.insert(*id, EntityState::spawn(EntityMode::Authoritative, position, 0.0, t, &tuning));
            }
            history.record(Snapshot::capture(t, &world, Vec::new()), t);
        }

        let before = world.clone();
        let mut engine = RollbackEngine::new();
        {
            let mut scope = engine.scope(&mut world, &history, time, 3.0, ids[0]).unwrap();
            for state in scope.values_mut() {
                state.hp -= damage;
                state.position += Vec3::ONE;
            }
        }

        prop_assert!(!engine.is_active());
        prop_assert_eq!(world, before);
    }
}
