//! Ember ECS -- entities, components, systems and the world that drives them.
//!
//! Entities are bags of typed components and string tags. Systems declare the
//! component kinds they need and the [`World`](world::World) keeps a
//! subscription list for each of them, updated as entities are added,
//! removed or changed. The world also indexes tags (with an O(1) cached
//! lookup for the player) and answers component and tag queries.
//!
//! # Quick Start
//!
//! ```
//! use ember_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, y: f32 }
//! ember_ecs::serde_component!(Position, "Position");
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dy: f32 }
//! ember_ecs::serde_component!(Velocity, "Velocity");
//!
//! struct Movement;
//!
//! impl System for Movement {
//!     fn name(&self) -> &str { "movement" }
//!     fn requires(&self) -> Vec<ComponentKind> {
//!         vec![ComponentKind::of::<Position>(), ComponentKind::of::<Velocity>()]
//!     }
//!     fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
//!         for &id in entities {
//!             let Some(vel) = world.get_component::<Velocity>(id).cloned() else { continue };
//!             if let Some(pos) = world.get_component_mut::<Position>(id) {
//!                 pos.x += vel.dx * frame.dt;
//!                 pos.y += vel.dy * frame.dt;
//!             }
//!         }
//!     }
//! }
//!
//! let mut world = World::new();
//! world.add_system(Movement);
//! let ball = world.add_entity(
//!     Entity::new()
//!         .with(Position { x: 0.0, y: 0.0 })
//!         .with(Velocity { dx: 2.0, dy: 0.0 }),
//! );
//!
//! let mut frame = FrameContext::new(7).with_dt(0.5);
//! world.update(&mut frame);
//! assert_eq!(world.get_component::<Position>(ball), Some(&Position { x: 1.0, y: 0.0 }));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod context;
pub mod entity;
pub mod snapshot;
pub mod system;
mod tags;
pub mod world;

pub use tags::PLAYER_TAG;

#[doc(hidden)]
pub use serde_json;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity is not (or no longer) part of the world.
    #[error("entity {entity} does not exist in this world")]
    MissingEntity { entity: entity::EntityId },

    /// A component name was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// Deserialization of a component value failed.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserialization { component: String, details: String },

    /// The component does not support serde reflection.
    #[error("component '{component}' does not support reflection")]
    NotReflectable { component: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentKind, ComponentRegistry, DynComponent};
    pub use crate::context::FrameContext;
    pub use crate::entity::{Entity, EntityId};
    pub use crate::snapshot::{EntitySnapshot, WorldSnapshot};
    pub use crate::system::{System, SystemId};
    pub use crate::world::World;
    pub use crate::EcsError;
    pub use crate::PLAYER_TAG;
}
