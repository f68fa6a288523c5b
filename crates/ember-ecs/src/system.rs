//! The [`System`] trait.
//!
//! A system declares the component kinds it needs; the
//! [`World`](crate::world::World) keeps a subscription list of matching
//! entities for it and hands the system a snapshot of that list every frame.
//! Because the list is a copy, a system may remove entities (its own or
//! others) while iterating. Ids that are gone by the time they are visited
//! simply fail to resolve through [`World::entity`](crate::world::World::entity).

use std::fmt;

use crate::component::ComponentKind;
use crate::context::FrameContext;
use crate::entity::EntityId;
use crate::world::World;

/// Per-frame behavior over the entities that carry a set of components.
pub trait System {
    /// Human-readable name, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Component kinds an entity must hold to be subscribed. An empty set
    /// subscribes every active entity.
    fn requires(&self) -> Vec<ComponentKind> {
        Vec::new()
    }

    /// Lower values draw first when the world sorts its draw pass.
    fn draw_order(&self) -> i32 {
        0
    }

    /// Called once per frame, in system registration order.
    fn update(&mut self, _world: &mut World, _entities: &[EntityId], _frame: &mut FrameContext) {}

    /// Called once per frame after every system has updated.
    fn draw(&mut self, _world: &World, _entities: &[EntityId]) {}
}

/// Handle returned by [`World::add_system`](crate::world::World::add_system).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub(crate) usize);

impl SystemId {
    /// Registration index of the system.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}
