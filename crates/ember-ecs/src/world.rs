//! The [`World`] is the top-level container for the ECS. It owns every
//! entity, the registered systems with their subscription lists, and the tag
//! index, and it drives the per-frame update and draw passes.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::component::{Component, ComponentKind};
use crate::context::FrameContext;
use crate::entity::{Entity, EntityId};
use crate::system::{System, SystemId};
use crate::tags::{TagIndex, PLAYER_TAG};
use crate::EcsError;

// ---------------------------------------------------------------------------
// SystemSlot
// ---------------------------------------------------------------------------

/// A registered system plus the entities subscribed to it.
///
/// The subscription list lives here rather than inside the system so that the
/// world can keep it in sync while the system itself is checked out for its
/// `update`/`draw` call.
struct SystemSlot {
    name: String,
    requires: Vec<ComponentKind>,
    subscribers: Vec<EntityId>,
    /// `None` only while the system is running.
    system: Option<Box<dyn System>>,
}

impl SystemSlot {
    fn subscribe(&mut self, id: EntityId) {
        if !self.subscribers.contains(&id) {
            self.subscribers.push(id);
        }
    }

    fn unsubscribe(&mut self, id: EntityId) {
        self.subscribers.retain(|e| *e != id);
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Entities are stored by id, with a separate list recording insertion order
/// so that queries are order-preserving. Systems run in registration order;
/// later systems observe mutations made by earlier ones within the same frame.
///
/// ```
/// use ember_ecs::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// struct Health(u32);
/// ember_ecs::serde_component!(Health, "Health");
///
/// let mut world = World::new();
/// let hero = world.add_entity(Entity::new().with(Health(10)));
/// world.add_tag(hero, PLAYER_TAG);
///
/// assert_eq!(world.player(), Some(hero));
/// assert_eq!(world.entities_with(&[ComponentKind::of::<Health>()]), vec![hero]);
/// ```
#[derive(Default)]
pub struct World {
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    systems: Vec<SystemSlot>,
    tags: TagIndex,
    sort_draw: bool,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entities.len())
            .field(
                "systems",
                &self.systems.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("sort_draw", &self.sort_draw)
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an empty, active entity and add it to the world.
    ///
    /// Only systems with an empty requirement set see it until components are
    /// attached.
    pub fn create_entity(&mut self) -> EntityId {
        self.add_entity(Entity::new())
    }

    /// Add a detached entity to the world.
    ///
    /// Indexes its tags and subscribes it to every system whose requirements
    /// it satisfies. Adding an id that is already present is a no-op.
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            debug!(entity = %id, "add_entity: already present, ignoring");
            return id;
        }

        for tag in entity.tags() {
            self.tags.register(tag, id);
        }
        if entity.is_active() {
            for slot in &mut self.systems {
                if entity.has_all(&slot.requires) {
                    slot.subscribe(id);
                }
            }
        }
        trace!(entity = %id, components = entity.component_count(), "entity added");

        self.order.push(id);
        self.entities.insert(id, entity);
        id
    }

    /// Remove an entity from the world and hand it back to the caller.
    ///
    /// The entity is marked inactive and dropped from every subscription
    /// list, every tag bucket and the player cache before it leaves the
    /// entity list. Removing an absent id is a no-op returning `None`.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let Some(mut entity) = self.entities.remove(&id) else {
            trace!(entity = %id, "remove_entity: not present, ignoring");
            return None;
        };
        entity.set_active(false);

        for slot in &mut self.systems {
            slot.unsubscribe(id);
        }
        for tag in entity.tags() {
            self.tags.unregister(tag, id);
        }
        self.tags.invalidate_player(id);
        self.order.retain(|e| *e != id);

        trace!(entity = %id, "entity removed");
        Some(entity)
    }

    /// Re-evaluate one entity against every system's requirements.
    ///
    /// Subscribes it where it now qualifies and unsubscribes it where it no
    /// longer does. Call this after attaching or detaching components through
    /// [`entity_mut`](Self::entity_mut); the world does not poll.
    pub fn notify_entity_changed(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        for slot in &mut self.systems {
            if entity.is_active() && entity.has_all(&slot.requires) {
                slot.subscribe(id);
            } else {
                slot.unsubscribe(id);
            }
        }
    }

    /// Activate or deactivate an entity. Inactive entities stay in the world
    /// but vanish from queries and system subscriptions.
    pub fn set_active(&mut self, id: EntityId, active: bool) -> Result<(), EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::MissingEntity { entity: id })?;
        if entity.is_active() == active {
            return Ok(());
        }
        entity.set_active(active);
        if !active {
            self.tags.invalidate_player(id);
        }
        self.notify_entity_changed(id);
        Ok(())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Direct mutable access. Component changes made through this handle
    /// require a [`notify_entity_changed`](Self::notify_entity_changed) call.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// All entities (active or not) in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Number of entities held, active or not.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -- typed component access ---------------------------------------------

    /// Attach a component and re-evaluate system subscriptions.
    pub fn insert_component<T: Component>(
        &mut self,
        id: EntityId,
        component: T,
    ) -> Result<Option<T>, EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::MissingEntity { entity: id })?;
        let replaced = entity.insert(component);
        self.notify_entity_changed(id);
        Ok(replaced)
    }

    /// Detach a component and re-evaluate system subscriptions.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<Option<T>, EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::MissingEntity { entity: id })?;
        let removed = entity.remove::<T>();
        self.notify_entity_changed(id);
        Ok(removed)
    }

    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id).and_then(Entity::get::<T>)
    }

    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id).and_then(Entity::get_mut::<T>)
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(Entity::has::<T>)
    }

    // -- tags ---------------------------------------------------------------

    /// Tag an entity and index it. Returns `false` if the entity is absent.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        if entity.insert_tag(tag) {
            self.tags.register(tag, id);
        }
        true
    }

    /// Untag an entity. Returns `false` if the entity is absent.
    pub fn remove_tag(&mut self, id: EntityId, tag: &str) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        if entity.remove_tag(tag) {
            self.tags.unregister(tag, id);
        }
        true
    }

    // -- queries ------------------------------------------------------------

    fn is_active(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(Entity::is_active)
    }

    /// Active entities holding every kind in `kinds`, in insertion order.
    pub fn entities_with(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        self.order
            .iter()
            .filter(|id| {
                self.entities
                    .get(*id)
                    .is_some_and(|e| e.is_active() && e.has_all(kinds))
            })
            .copied()
            .collect()
    }

    /// First active entity holding every kind in `kinds`.
    pub fn entity_with(&self, kinds: &[ComponentKind]) -> Option<EntityId> {
        self.order.iter().copied().find(|id| {
            self.entities
                .get(id)
                .is_some_and(|e| e.is_active() && e.has_all(kinds))
        })
    }

    /// Active entities carrying `tag`, ordered by id. Unknown tags yield an
    /// empty list.
    pub fn entities_with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.tags.bucket(tag).filter(|id| self.is_active(*id)).collect()
    }

    /// Active entities carrying every tag in `tags`, ordered by id.
    ///
    /// The first tag's bucket seeds the candidates; an empty `tags` slice
    /// yields an empty list.
    pub fn entities_with_all_tags(&self, tags: &[&str]) -> Vec<EntityId> {
        let Some((first, rest)) = tags.split_first() else {
            return Vec::new();
        };
        self.tags
            .bucket(first)
            .filter(|id| self.is_active(*id))
            .filter(|id| rest.iter().all(|tag| self.tags.contains(tag, *id)))
            .collect()
    }

    /// The entity tagged [`PLAYER_TAG`].
    ///
    /// Served from a single-entity cache; a stale or empty cache is
    /// re-resolved from the tag index.
    pub fn player(&self) -> Option<EntityId> {
        if let Some(id) = self.tags.cached_player() {
            if self.is_active(id) && self.tags.contains(PLAYER_TAG, id) {
                return Some(id);
            }
        }
        let resolved = self
            .tags
            .bucket(PLAYER_TAG)
            .find(|id| self.is_active(*id));
        self.tags.cache_player(resolved);
        resolved
    }

    // -- systems ------------------------------------------------------------

    /// Register a system and seed its subscription list with every existing
    /// active entity that qualifies.
    pub fn add_system(&mut self, system: impl System + 'static) -> SystemId {
        let requires = system.requires();
        let subscribers = self.entities_with(&requires);
        let id = SystemId(self.systems.len());
        debug!(
            system = system.name(),
            requires = ?requires,
            subscribers = subscribers.len(),
            "system registered"
        );
        self.systems.push(SystemSlot {
            name: system.name().to_owned(),
            requires,
            subscribers,
            system: Some(Box::new(system)),
        });
        id
    }

    /// Entities currently subscribed to `system`, in subscription order.
    pub fn subscribers(&self, system: SystemId) -> &[EntityId] {
        self.systems
            .get(system.0)
            .map(|s| s.subscribers.as_slice())
            .unwrap_or(&[])
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Sort the draw pass by [`System::draw_order`]. Registration order is
    /// left untouched for updates.
    pub fn set_draw_sorting(&mut self, enabled: bool) {
        self.sort_draw = enabled;
    }

    // -- frame driver -------------------------------------------------------

    /// Run every system's `update` in registration order.
    ///
    /// Each system receives a snapshot of its subscription list, so removals
    /// performed during the call never skip or repeat other entities.
    pub fn update(&mut self, frame: &mut FrameContext) {
        let mut index = 0;
        while index < self.systems.len() {
            if let Some(mut system) = self.systems[index].system.take() {
                let entities = self.systems[index].subscribers.clone();
                system.update(self, &entities, frame);
                self.systems[index].system = Some(system);
            }
            index += 1;
        }
    }

    /// Run every system's `draw`, optionally stably sorted by draw order.
    pub fn draw(&mut self) {
        let mut indices: Vec<usize> = (0..self.systems.len()).collect();
        if self.sort_draw {
            indices.sort_by_key(|&i| {
                self.systems[i]
                    .system
                    .as_ref()
                    .map_or(0, |s| s.draw_order())
            });
        }
        for index in indices {
            if let Some(mut system) = self.systems[index].system.take() {
                let entities = self.systems[index].subscribers.clone();
                system.draw(self, &entities);
                self.systems[index].system = Some(system);
            }
        }
    }

    /// Remove every entity, keeping systems registered.
    pub(crate) fn clear_entities(&mut self) {
        self.entities.clear();
        self.order.clear();
        self.tags.clear();
        for slot in &mut self.systems {
            slot.subscribers.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos(f32, f32);
    crate::serde_component!(Pos, "Pos");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Vel(f32, f32);
    crate::serde_component!(Vel, "Vel");

    struct Movement;
    impl System for Movement {
        fn name(&self) -> &str {
            "movement"
        }
        fn requires(&self) -> Vec<ComponentKind> {
            vec![ComponentKind::of::<Pos>(), ComponentKind::of::<Vel>()]
        }
        fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
            for &id in entities {
                let Some(vel) = world.get_component::<Vel>(id).cloned() else {
                    continue;
                };
                if let Some(pos) = world.get_component_mut::<Pos>(id) {
                    pos.0 += vel.0 * frame.dt;
                    pos.1 += vel.1 * frame.dt;
                }
            }
        }
    }

    struct Recorder {
        label: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl System for Recorder {
        fn name(&self) -> &str {
            self.label
        }
        fn draw_order(&self) -> i32 {
            self.order
        }
        fn update(&mut self, _: &mut World, _: &[EntityId], _: &mut FrameContext) {
            self.log.lock().unwrap().push(self.label);
        }
        fn draw(&mut self, _: &World, _: &[EntityId]) {
            self.log.lock().unwrap().push(self.label);
        }
    }

    #[test]
    fn create_entity_is_active_and_empty() {
        let mut world = World::new();
        let id = world.create_entity();
        let e = world.entity(id).unwrap();
        assert!(e.is_active());
        assert_eq!(e.component_count(), 0);
        assert_eq!(e.tags().count(), 0);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut world = World::new();
        let entity = Entity::new().with(Pos(0.0, 0.0));
        let id = entity.id();
        world.add_entity(entity);
        let twin = Entity::with_id(id);
        world.add_entity(twin);
        assert_eq!(world.entity_count(), 1);
        assert!(world.has_component::<Pos>(id));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut world = World::new();
        assert!(world.remove_entity(EntityId::next()).is_none());
    }

    #[test]
    fn systems_seeded_and_kept_in_sync() {
        let mut world = World::new();
        let a = world.add_entity(Entity::new().with(Pos(0.0, 0.0)).with(Vel(1.0, 0.0)));
        let b = world.add_entity(Entity::new().with(Pos(0.0, 0.0)));
        let sys = world.add_system(Movement);
        assert_eq!(world.subscribers(sys), &[a]);

        world.insert_component(b, Vel(0.0, 2.0)).unwrap();
        assert_eq!(world.subscribers(sys), &[a, b]);

        world.remove_component::<Vel>(a).unwrap();
        assert_eq!(world.subscribers(sys), &[b]);

        world.remove_entity(b);
        assert!(world.subscribers(sys).is_empty());
    }

    #[test]
    fn direct_mutation_needs_notification() {
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Pos(0.0, 0.0)));
        let sys = world.add_system(Movement);

        world.entity_mut(id).unwrap().insert(Vel(1.0, 1.0));
        assert!(world.subscribers(sys).is_empty());

        world.notify_entity_changed(id);
        assert_eq!(world.subscribers(sys), &[id]);
    }

    #[test]
    fn update_moves_entities() {
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Pos(0.0, 0.0)).with(Vel(2.0, -1.0)));
        world.add_system(Movement);
        let mut frame = FrameContext::new(0).with_dt(0.5);
        world.update(&mut frame);
        assert_eq!(world.get_component::<Pos>(id), Some(&Pos(1.0, -0.5)));
    }

    #[test]
    fn deactivation_hides_entity() {
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Pos(0.0, 0.0)).with(Vel(0.0, 0.0)));
        let sys = world.add_system(Movement);
        world.add_tag(id, "Enemy");

        world.set_active(id, false).unwrap();
        assert!(world.subscribers(sys).is_empty());
        assert!(world.entities_with(&[ComponentKind::of::<Pos>()]).is_empty());
        assert!(world.entities_with_tag("Enemy").is_empty());

        world.set_active(id, true).unwrap();
        assert_eq!(world.subscribers(sys), &[id]);
        assert_eq!(world.entities_with_tag("Enemy"), vec![id]);
    }

    #[test]
    fn draw_sorting_uses_copy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut world = World::new();
        for (label, order) in [("hud", 10), ("sprites", 0), ("background", -5)] {
            world.add_system(Recorder {
                label,
                order,
                log: Arc::clone(&log),
            });
        }

        world.draw();
        assert_eq!(*log.lock().unwrap(), vec!["hud", "sprites", "background"]);
        log.lock().unwrap().clear();

        world.set_draw_sorting(true);
        world.draw();
        assert_eq!(*log.lock().unwrap(), vec!["background", "sprites", "hud"]);
        log.lock().unwrap().clear();

        world.update(&mut FrameContext::default());
        assert_eq!(*log.lock().unwrap(), vec!["hud", "sprites", "background"]);
    }

    #[test]
    fn all_tags_intersection() {
        let mut world = World::new();
        let a = world.create_entity();
        let b = world.create_entity();
        world.add_tag(a, "Enemy");
        world.add_tag(a, "Flying");
        world.add_tag(b, "Enemy");
        assert_eq!(world.entities_with_all_tags(&["Enemy", "Flying"]), vec![a]);
        assert_eq!(world.entities_with_all_tags(&["Flying", "Enemy"]), vec![a]);
        assert!(world.entities_with_all_tags(&[]).is_empty());
        assert!(world.entities_with_all_tags(&["Ghost", "Enemy"]).is_empty());
    }
}
