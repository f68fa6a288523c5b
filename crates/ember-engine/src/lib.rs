//! Ember engine -- gameplay components and the frame loop on top of
//! [`ember_ecs`].
//!
//! - [`state_machine`]: per-entity finite-state machines with guarded
//!   transitions, scratch data and cooldowns.
//! - [`modifier`]: stacking add/multiply effects on component fields
//!   addressed by dotted paths ([`path`]).
//! - [`systems`]: built-in systems driving the above, plus entity lifetimes.
//! - [`frame`]: the fixed-timestep frame loop and its configuration.
//! - [`logging`]: tracing subscriber setup.

#![deny(unsafe_code)]

pub mod frame;
pub mod logging;
pub mod modifier;
pub mod path;
pub mod state_machine;
pub mod systems;

pub use ember_ecs;

/// Convenience re-exports for common usage, including the ECS prelude.
pub mod prelude {
    pub use ember_ecs::prelude::*;

    pub use crate::frame::{FrameConfig, FrameDiagnostics, FrameLoop};
    pub use crate::modifier::{
        apply_modifier, remove_modifier, Modifier, ModifierError, ModifierMode,
    };
    pub use crate::state_machine::{
        DataValue, DesiredStateProvider, EntityStateMachine, HookBehavior, MachineState,
        StateBehavior, StateMachine, StateMachineError,
    };
    pub use crate::systems::{
        Lifetime, LifetimeSystem, ModifierExpirySystem, StateMachineSystem, TimedModifiers,
    };
}
