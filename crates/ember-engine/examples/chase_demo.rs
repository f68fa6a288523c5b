//! Headless chase demo: a guard patrols, chases the player when it gets
//! close, and gets a temporary speed boost while chasing.
//!
//! Run with `RUST_LOG=ember_engine=debug cargo run --example chase_demo` to
//! see state changes and modifier activity.

use anyhow::Context;
use ember_engine::frame::{FrameConfig, FrameLoop};
use ember_engine::logging::init_tracing;
use ember_engine::prelude::*;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Position {
    x: f32,
    y: f32,
}
ember_ecs::serde_component!(Position, "Position");

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Movement {
    max_speed: f64,
}
ember_ecs::serde_component!(Movement, "Movement");

/// Last known player position, written by [`Sight`] each frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Quarry {
    x: f32,
    y: f32,
}
ember_ecs::serde_component!(Quarry, "Quarry");

fn distance(entity: &Entity) -> f32 {
    match (entity.get::<Position>(), entity.get::<Quarry>()) {
        (Some(p), Some(q)) => ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt(),
        _ => f32::INFINITY,
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Copies the player's position into every guard's [`Quarry`].
struct Sight;

impl System for Sight {
    fn name(&self) -> &str {
        "sight"
    }

    fn requires(&self) -> Vec<ComponentKind> {
        vec![ComponentKind::of::<Quarry>()]
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], _frame: &mut FrameContext) {
        let Some(player) = world.player() else {
            return;
        };
        let Some(&Position { x, y }) = world.get_component::<Position>(player) else {
            return;
        };
        for &id in entities {
            if let Some(quarry) = world.get_component_mut::<Quarry>(id) {
                *quarry = Quarry { x, y };
            }
        }
    }
}

/// The player drifts right at a constant pace.
struct Drift;

impl System for Drift {
    fn name(&self) -> &str {
        "drift"
    }

    fn update(&mut self, world: &mut World, _entities: &[EntityId], frame: &mut FrameContext) {
        if let Some(player) = world.player() {
            if let Some(pos) = world.get_component_mut::<Position>(player) {
                pos.x += 20.0 * frame.dt;
            }
        }
    }
}

/// Prints a line per second.
struct Report;

impl System for Report {
    fn name(&self) -> &str {
        "report"
    }

    fn requires(&self) -> Vec<ComponentKind> {
        vec![ComponentKind::of::<EntityStateMachine>()]
    }

    fn draw(&mut self, world: &World, entities: &[EntityId]) {
        for &id in entities {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            let (Some(machine), Some(pos), Some(movement)) = (
                entity.get::<EntityStateMachine>(),
                entity.get::<Position>(),
                entity.get::<Movement>(),
            ) else {
                continue;
            };
            if machine.time_in_state() < 1e-3 || (machine.time_in_state() % 1.0) < 0.05 {
                println!(
                    "{id}: {:<8} x={:>7.2} speed={:>5.1} distance={:>6.1}",
                    machine.current_state(),
                    pos.x,
                    movement.max_speed,
                    distance(entity),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Guard behavior
// ---------------------------------------------------------------------------

fn guard_machine() -> anyhow::Result<EntityStateMachine> {
    let mut machine = EntityStateMachine::new("patrol");
    machine.add_state(
        "patrol",
        HookBehavior::new().on_update(|m: &mut MachineState, e: &mut Entity, dt| {
            let speed = e.get::<Movement>().map_or(0.0, |mv| mv.max_speed as f32);
            let dir = if m.time_in_state() % 4.0 < 2.0 { 1.0 } else { -1.0 };
            if let Some(pos) = e.get_mut::<Position>() {
                pos.y += dir * speed * 0.5 * dt;
            }
        }),
    );
    machine.add_state(
        "chase",
        HookBehavior::new()
            .on_enter(|_, e: &mut Entity| {
                if let Err(err) =
                    apply_modifier(e, "Movement.max_speed", ModifierMode::Multiply, 1.5, "adrenaline")
                {
                    tracing::error!(error = %err, "failed to apply adrenaline");
                }
            })
            .on_update(|_, e: &mut Entity, dt| {
                let speed = e.get::<Movement>().map_or(0.0, |mv| mv.max_speed as f32);
                let Some(quarry) = e.get::<Quarry>().copied() else {
                    return;
                };
                if let Some(pos) = e.get_mut::<Position>() {
                    let (dx, dy) = (quarry.x - pos.x, quarry.y - pos.y);
                    let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
                    let step = (speed * dt).min(len);
                    pos.x += dx / len * step;
                    pos.y += dy / len * step;
                }
            })
            .on_exit(|_, e: &mut Entity| {
                if let Err(err) = remove_modifier(e, "adrenaline") {
                    tracing::error!(error = %err, "failed to remove adrenaline");
                }
            }),
    );
    machine
        .add_transition("patrol", "chase", |_, e: &Entity, _| distance(e) < 50.0)
        .context("wiring patrol -> chase")?;
    machine
        .add_transition("chase", "patrol", |_, e: &Entity, _| distance(e) > 100.0)
        .context("wiring chase -> patrol")?;
    Ok(machine)
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    init_tracing("warn");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading frame config {path}"))?;
            FrameConfig::from_json_str(&json)?
        }
        None => FrameConfig::default(),
    };

    let mut world = World::new();
    world.add_system(Sight);
    world.add_system(StateMachineSystem);
    world.add_system(Drift);
    world.add_system(Report);

    world.add_entity(
        Entity::new()
            .with(Position { x: -60.0, y: 0.0 })
            .with_tag(PLAYER_TAG),
    );
    world.add_entity(
        Entity::new()
            .with(Position { x: 0.0, y: 0.0 })
            .with(Movement { max_speed: 12.0 })
            .with(Quarry { x: 0.0, y: 0.0 })
            .with(guard_machine()?)
            .with_tag("Guard"),
    );

    let mut frames = FrameLoop::new(world, config);
    let total = (20.0 / frames.fixed_dt()).round() as u64;
    frames.run_frames(total);

    println!(
        "ran {} frames ({:.1}s simulated), final state hash {}",
        frames.frame_count(),
        frames.sim_time(),
        frames.state_hash()
    );
    Ok(())
}
