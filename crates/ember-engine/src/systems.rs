//! Built-in systems that drive the engine's components each frame.

use std::collections::BTreeMap;

use ember_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::modifier::Modifier;
use crate::state_machine::EntityStateMachine;

// ---------------------------------------------------------------------------
// StateMachineSystem
// ---------------------------------------------------------------------------

/// Updates every entity's [`EntityStateMachine`] against the entity itself.
///
/// The machine is detached for the duration of the update so its hooks can
/// take `&mut Entity`. A machine that errors is logged and disabled.
#[derive(Debug, Default)]
pub struct StateMachineSystem;

impl System for StateMachineSystem {
    fn name(&self) -> &str {
        "state_machine"
    }

    fn requires(&self) -> Vec<ComponentKind> {
        vec![ComponentKind::of::<EntityStateMachine>()]
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
        for &id in entities {
            let Some(entity) = world.entity_mut(id) else {
                continue;
            };
            let Some(mut machine) = entity.remove::<EntityStateMachine>() else {
                continue;
            };
            if let Err(err) = machine.update(frame.dt, entity) {
                error!(entity = %id, error = %err, "state machine failed; disabling");
                machine.disable();
            }
            entity.insert(machine);
        }
    }
}

// ---------------------------------------------------------------------------
// LifetimeSystem
// ---------------------------------------------------------------------------

/// Seconds left before the entity is removed from the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    pub remaining: f32,
}

ember_ecs::serde_component!(Lifetime, "Lifetime");

impl Lifetime {
    pub fn new(seconds: f32) -> Self {
        Self { remaining: seconds }
    }
}

/// Counts [`Lifetime`]s down and removes expired entities.
#[derive(Debug, Default)]
pub struct LifetimeSystem;

impl System for LifetimeSystem {
    fn name(&self) -> &str {
        "lifetime"
    }

    fn requires(&self) -> Vec<ComponentKind> {
        vec![ComponentKind::of::<Lifetime>()]
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
        for &id in entities {
            let Some(lifetime) = world.get_component_mut::<Lifetime>(id) else {
                continue;
            };
            lifetime.remaining -= frame.dt;
            if lifetime.remaining <= 0.0 {
                debug!(entity = %id, "lifetime expired");
                world.remove_entity(id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ModifierExpirySystem
// ---------------------------------------------------------------------------

/// Durations of temporary modifiers, keyed by modifier source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedModifiers {
    timers: BTreeMap<String, f32>,
}

ember_ecs::serde_component!(TimedModifiers, "TimedModifiers");

impl TimedModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `source` after `seconds`. Re-inserting restarts the timer.
    pub fn insert(&mut self, source: impl Into<String>, seconds: f32) {
        self.timers.insert(source.into(), seconds);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, source: impl Into<String>, seconds: f32) -> Self {
        self.insert(source, seconds);
        self
    }

    pub fn remaining(&self, source: &str) -> Option<f32> {
        self.timers.get(source).copied()
    }

    pub fn cancel(&mut self, source: &str) -> bool {
        self.timers.remove(source).is_some()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Subtract `dt` from every timer and return the sources that ran out,
    /// in source order.
    fn tick(&mut self, dt: f32) -> Vec<String> {
        let mut expired = Vec::new();
        self.timers.retain(|source, remaining| {
            *remaining -= dt;
            if *remaining <= 0.0 {
                expired.push(source.clone());
                false
            } else {
                true
            }
        });
        expired
    }
}

/// Revokes temporary modifiers when their [`TimedModifiers`] timer runs out.
#[derive(Debug, Default)]
pub struct ModifierExpirySystem;

impl System for ModifierExpirySystem {
    fn name(&self) -> &str {
        "modifier_expiry"
    }

    fn requires(&self) -> Vec<ComponentKind> {
        vec![
            ComponentKind::of::<Modifier>(),
            ComponentKind::of::<TimedModifiers>(),
        ]
    }

    fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
        for &id in entities {
            let Some(entity) = world.entity_mut(id) else {
                continue;
            };
            let expired = match entity.get_mut::<TimedModifiers>() {
                Some(timers) => timers.tick(frame.dt),
                None => continue,
            };
            if expired.is_empty() {
                continue;
            }
            let Some(mut modifier) = entity.remove::<Modifier>() else {
                continue;
            };
            for source in &expired {
                match modifier.remove(entity, source) {
                    Ok(_) => debug!(entity = %id, source = %source, "timed modifier expired"),
                    Err(err) => {
                        warn!(entity = %id, source = %source, error = %err, "failed to revoke expired modifier")
                    }
                }
            }
            entity.insert(modifier);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
