//! Entity identifiers and the entity container.
//!
//! An [`EntityId`] is a 64-bit handle drawn from a process-wide counter, so
//! ids are unique across every [`World`](crate::world::World) in the process
//! and never recycled. Systems, the tag index and components refer to other
//! entities only through these ids; the world owns the [`Entity`] values.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentKind, DynComponent};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Allocate a fresh id. Ids are handed out in increasing order.
    pub fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    ///
    /// The allocator is advanced past `raw` so that ids restored from a
    /// snapshot can never be handed out again by [`EntityId::next`].
    pub fn from_raw(raw: u64) -> Self {
        NEXT_ENTITY_ID.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A bag of components and tags with a stable identity.
///
/// Components are keyed by their Rust type, so an entity holds at most one
/// component of each type. Tags can only be changed through the
/// [`World`](crate::world::World) once the entity has been added to one, which
/// keeps the world's tag index consistent; a detached entity can be tagged
/// with [`Entity::with_tag`].
pub struct Entity {
    id: EntityId,
    active: bool,
    components: HashMap<TypeId, Box<dyn DynComponent>>,
    tags: BTreeSet<String>,
}

impl Entity {
    /// Create a detached, active entity with a fresh id and no components.
    pub fn new() -> Self {
        Self::with_id(EntityId::next())
    }

    pub(crate) fn with_id(id: EntityId) -> Self {
        Self {
            id,
            active: true,
            components: HashMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Inactive entities are invisible to every world query.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    // -- components ---------------------------------------------------------

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.insert(component);
        self
    }

    /// Attach `component`, returning the component of the same type it
    /// replaced, if any.
    ///
    /// When the entity already lives in a world, call
    /// [`World::notify_entity_changed`](crate::world::World::notify_entity_changed)
    /// afterwards (or use [`World::insert_component`](crate::world::World::insert_component)).
    pub fn insert<T: Component>(&mut self, component: T) -> Option<T> {
        self.components
            .insert(TypeId::of::<T>(), Box::new(component))
            .and_then(|old| old.into_any().downcast::<T>().ok())
            .map(|old| *old)
    }

    pub(crate) fn insert_boxed(&mut self, component: Box<dyn DynComponent>) {
        self.components.insert(component.kind().type_id(), component);
    }

    /// Detach and return the component of type `T`.
    pub fn remove<T: Component>(&mut self) -> Option<T> {
        self.components
            .remove(&TypeId::of::<T>())
            .and_then(|c| c.into_any().downcast::<T>().ok())
            .map(|c| *c)
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    pub fn has<T: Component>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<T>())
    }

    pub fn has_kind(&self, kind: &ComponentKind) -> bool {
        self.components.contains_key(&kind.type_id())
    }

    /// Whether the entity holds every kind in `kinds` (vacuously true for an
    /// empty slice).
    pub fn has_all(&self, kinds: &[ComponentKind]) -> bool {
        kinds.iter().all(|k| self.has_kind(k))
    }

    /// Look a component up by its [`Component::NAME`].
    pub fn component_by_name(&self, name: &str) -> Option<&(dyn DynComponent + 'static)> {
        self.components
            .values()
            .find(|c| c.name() == name)
            .map(|c| &**c)
    }

    /// Mutable counterpart of [`component_by_name`](Self::component_by_name).
    pub fn component_by_name_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut (dyn DynComponent + 'static)> {
        self.components
            .values_mut()
            .find(|c| c.name() == name)
            .map(|c| &mut **c)
    }

    /// All attached components, in no particular order.
    pub fn components(&self) -> impl Iterator<Item = &(dyn DynComponent + 'static)> {
        self.components.values().map(|c| &**c)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // -- tags ---------------------------------------------------------------

    /// Tag a detached entity. Tags are indexed when the entity is added to a
    /// world; after that, use [`World::add_tag`](crate::world::World::add_tag).
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Tags in lexical order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub(crate) fn insert_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_owned())
    }

    pub(crate) fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.components.values().map(|c| c.name()).collect();
        names.sort_unstable();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("components", &names)
            .field("tags", &self.tags)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
