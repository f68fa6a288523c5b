//! State machine behavior: the idle/chasing scenario, first-match
//! transitions, the lock gate, desired-state providers and save/restore.

use std::sync::{Arc, Mutex};

use ember_ecs::prelude::*;
use ember_engine::state_machine::{
    DataValue, DesiredStateProvider, HookBehavior, MachineState, StateMachine,
    StateMachineError, COOLDOWN_SUFFIX,
};
use ember_engine::systems::StateMachineSystem;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Position {
    x: f32,
    y: f32,
}
ember_ecs::serde_component!(Position, "Position");

/// Where the entity is heading; stands in for "the target" in guards.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Target {
    x: f32,
    y: f32,
}
ember_ecs::serde_component!(Target, "Target");

fn distance(entity: &Entity) -> f32 {
    match (entity.get::<Position>(), entity.get::<Target>()) {
        (Some(p), Some(t)) => ((p.x - t.x).powi(2) + (p.y - t.y).powi(2)).sqrt(),
        _ => f32::INFINITY,
    }
}

fn guard_at(x: f32) -> Entity {
    Entity::new()
        .with(Position { x, y: 0.0 })
        .with(Target { x: 0.0, y: 0.0 })
}

fn chase_machine() -> StateMachine {
    let mut machine = StateMachine::new("idle");
    machine.add_state("idle", ());
    machine.add_state("chasing", ());
    machine
        .add_transition("idle", "chasing", |_, e: &Entity, _| distance(e) < 50.0)
        .unwrap();
    machine
        .add_transition("chasing", "idle", |_, e: &Entity, _| distance(e) > 100.0)
        .unwrap();
    machine
}

// -- literal scenario ---------------------------------------------------------

#[test]
fn idle_chasing_scenario() {
    let mut machine = chase_machine();
    let mut guard = guard_at(40.0);

    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "chasing");

    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "chasing");

    guard.get_mut::<Position>().unwrap().x = 150.0;
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "idle");
    assert_eq!(machine.previous_state(), Some("chasing"));
}

#[test]
fn idle_chasing_scenario_through_the_world() {
    let mut world = World::new();
    world.add_system(StateMachineSystem);
    let id = world.add_entity(guard_at(40.0).with(chase_machine()));
    let mut frame = FrameContext::new(0).with_dt(0.1);

    let state = |world: &World| {
        world
            .get_component::<StateMachine>(id)
            .map(|m| m.current_state().to_owned())
    };

    world.update(&mut frame);
    assert_eq!(state(&world).as_deref(), Some("chasing"));
    world.update(&mut frame);
    assert_eq!(state(&world).as_deref(), Some("chasing"));

    world.get_component_mut::<Position>(id).unwrap().x = 150.0;
    world.update(&mut frame);
    assert_eq!(state(&world).as_deref(), Some("idle"));
}

// -- transition semantics -----------------------------------------------------

#[test]
fn first_registered_transition_wins() {
    for (first, second) in [("b", "c"), ("c", "b")] {
        let mut machine = StateMachine::<()>::new("a");
        for name in ["a", "b", "c"] {
            machine.add_state(name, ());
        }
        machine.add_transition("a", first, |_, _, _| true).unwrap();
        machine.add_transition("a", second, |_, _, _| true).unwrap();

        machine.update(0.016, &mut ()).unwrap();
        assert_eq!(machine.current_state(), first);
    }
}

#[test]
fn at_most_one_transition_per_update() {
    let mut machine = StateMachine::<()>::new("a");
    for name in ["a", "b", "c"] {
        machine.add_state(name, ());
    }
    machine.add_transition("a", "b", |_, _, _| true).unwrap();
    machine.add_transition("b", "c", |_, _, _| true).unwrap();

    machine.update(0.016, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "b");
    machine.update(0.016, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "c");
}

#[test]
fn lock_gate_blocks_transitions_but_not_updates() {
    let updates = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&updates);

    let mut machine = StateMachine::<()>::new("a");
    machine.add_state(
        "a",
        HookBehavior::new().on_update(move |_, _: &mut (), _| *counter.lock().unwrap() += 1),
    );
    machine.add_state("b", ());
    machine.add_transition("a", "b", |_, _, _| true).unwrap();
    machine.lock();

    for _ in 0..10 {
        machine.update(0.016, &mut ()).unwrap();
        assert_eq!(machine.current_state(), "a");
    }
    assert_eq!(*updates.lock().unwrap(), 10);
    assert!(machine.is_locked());

    machine.unlock();
    machine.update(0.016, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "b");
}

#[test]
fn unknown_state_errors_name_the_state() {
    let mut machine = StateMachine::<()>::new("idle");
    machine.add_state("idle", ());
    let err = machine
        .add_transition("idle", "fleeing", |_, _, _| true)
        .unwrap_err();
    assert_eq!(
        err,
        StateMachineError::UnknownState {
            state: "fleeing".into(),
            registered: "idle".into(),
        }
    );
    assert!(err.to_string().contains("fleeing"));
}

// -- scratch data and cooldowns -----------------------------------------------

#[test]
fn guards_can_read_cooldowns() {
    let mut machine = StateMachine::<()>::new("ready");
    machine.add_state(
        "ready",
        HookBehavior::new().on_exit(|m: &mut MachineState, _: &mut ()| {
            m.set_global_data(format!("attack{COOLDOWN_SUFFIX}"), 0.3);
        }),
    );
    machine.add_state("attacking", ());
    let key = format!("attack{COOLDOWN_SUFFIX}");
    let guard_key = key.clone();
    machine
        .add_transition("ready", "attacking", |_, _, _| true)
        .unwrap();
    machine
        .add_transition("attacking", "ready", move |m, _, _| {
            !m.global_data(&guard_key).is_some_and(DataValue::is_running)
        })
        .unwrap();

    machine.update(0.1, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "attacking");

    // 0.3s cooldown: decays to 0.2, then 0.1, then hits zero on the third
    // update, which is when the guard lets the machine go back.
    machine.update(0.1, &mut ()).unwrap();
    machine.update(0.1, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "attacking");
    machine.update(0.1, &mut ()).unwrap();
    assert_eq!(machine.current_state(), "ready");
    assert_eq!(machine.global_data(&key).and_then(DataValue::as_f64), Some(0.0));
}

// -- desired-state provider -----------------------------------------------------

struct Threat;

impl DesiredStateProvider<Entity> for Threat {
    fn desired_state(&self, _machine: &MachineState, subject: &Entity) -> Option<String> {
        let d = distance(subject);
        let wanted = if d < 30.0 {
            "attack"
        } else if d < 80.0 {
            "chase"
        } else {
            "patrol"
        };
        Some(wanted.to_owned())
    }
}

#[test]
fn provider_generates_transitions_between_all_states() {
    let mut machine = StateMachine::<Entity>::new("patrol").with_desired_state_provider(Threat);
    for name in ["patrol", "chase", "attack"] {
        machine.add_state(name, ());
    }
    assert_eq!(machine.transition_count("patrol"), 2);
    assert_eq!(machine.transition_count("attack"), 2);

    let mut guard = guard_at(60.0);
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "chase");

    guard.get_mut::<Position>().unwrap().x = 10.0;
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "attack");

    guard.get_mut::<Position>().unwrap().x = 500.0;
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "patrol");
}

#[test]
fn provider_installed_after_states() {
    let mut machine = StateMachine::<Entity>::new("patrol");
    machine.add_state("patrol", ());
    machine.add_state("chase", ());
    let mut machine = machine.with_desired_state_provider(Threat);
    assert_eq!(machine.transition_count("patrol"), 1);

    let mut guard = guard_at(50.0);
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "chase");
}

#[test]
fn readding_a_state_does_not_duplicate_provider_transitions() {
    let mut machine = StateMachine::<Entity>::new("patrol").with_desired_state_provider(Threat);
    for name in ["patrol", "chase", "attack"] {
        machine.add_state(name, ());
    }
    machine.add_transition("chase", "patrol", |_, _, _| false).unwrap();
    for _ in 0..5 {
        machine.add_state("patrol", ());
    }
    assert_eq!(machine.transition_count("patrol"), 2);
    assert_eq!(machine.transition_count("attack"), 2);
    // One hand-written and two generated.
    assert_eq!(machine.transition_count("chase"), 3);

    let mut guard = guard_at(500.0);
    machine.change_state("chase", &mut guard).unwrap();
    machine.update(0.1, &mut guard).unwrap();
    assert_eq!(machine.current_state(), "patrol");
}

// -- persistence --------------------------------------------------------------

#[test]
fn snapshot_round_trip_preserves_behavior() {
    let mut original = chase_machine();
    let mut guard = guard_at(40.0);
    original.set_global_data("alert_cooldown", DataValue::Cooldown(2.0));
    original.update(0.1, &mut guard).unwrap();
    original.set_state_data("laps", 3i64);

    let json = serde_json::to_string(&original.snapshot()).unwrap();
    let saved: MachineState = serde_json::from_str(&json).unwrap();

    let mut restored = chase_machine();
    restored.restore(saved).unwrap();
    assert_eq!(restored.current_state(), "chasing");
    assert_eq!(restored.state_data("laps"), Some(&DataValue::Int(3)));
    assert!(restored.machine_state().is_initialized());

    // Same inputs, same observable behavior from here on.
    for x in [40.0, 120.0, 20.0] {
        guard.get_mut::<Position>().unwrap().x = x;
        let mut twin = guard_at(x);
        original.update(0.1, &mut guard).unwrap();
        restored.update(0.1, &mut twin).unwrap();
        assert_eq!(original.current_state(), restored.current_state());
        assert_eq!(original.snapshot(), restored.snapshot());
    }
}

#[test]
fn restore_rejects_unknown_state() {
    let mut donor = StateMachine::<()>::new("elsewhere");
    donor.add_state("elsewhere", ());
    let mut machine = StateMachine::<()>::new("idle");
    machine.add_state("idle", ());
    assert!(machine.restore(donor.snapshot()).is_err());
    assert_eq!(machine.current_state(), "idle");
}
