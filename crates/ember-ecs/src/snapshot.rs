//! World snapshot and restore support.
//!
//! Provides [`WorldSnapshot`] -- a serializable record of every entity's id,
//! active flag, tags and reflectable component data. Snapshots hash with
//! BLAKE3 for determinism checks and can rebuild a world through a
//! [`ComponentRegistry`]. Components that do not support reflection (such as
//! closure-driven state machines) are skipped; their owners persist whatever
//! runtime state they expose through their own snapshot types.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::component::ComponentRegistry;
use crate::entity::EntityId;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Serializable snapshot of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub active: bool,
    pub tags: BTreeSet<String>,
    /// Map from component name to serialized JSON value.
    /// Uses `BTreeMap` for deterministic serialization order.
    pub components: BTreeMap<String, serde_json::Value>,
}

/// Every entity of a world, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// BLAKE3 hex digest of the snapshot's JSON encoding.
    pub fn hash(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
            // Values came out of serde_json already, so re-encoding cannot fail.
            Err(_) => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// World snapshot/restore impl
// ---------------------------------------------------------------------------

impl World {
    /// Capture every entity (active or not) with its reflectable components.
    pub fn capture_snapshot(&self) -> WorldSnapshot {
        let entities = self
            .entities()
            .map(|entity| {
                let mut components = BTreeMap::new();
                for component in entity.components() {
                    match component.reflect() {
                        Some(value) => {
                            components.insert(component.name().to_owned(), value);
                        }
                        None => tracing::trace!(
                            entity = %entity.id(),
                            component = component.name(),
                            "component is not reflectable -- skipping in snapshot"
                        ),
                    }
                }
                EntitySnapshot {
                    entity_id: entity.id(),
                    active: entity.is_active(),
                    tags: entity.tags().map(str::to_owned).collect(),
                    components,
                }
            })
            .collect();
        WorldSnapshot { entities }
    }

    /// Replace every entity with the ones recorded in `snapshot`.
    ///
    /// Systems stay registered and are re-subscribed as entities are added
    /// back. All component names are validated before the world is touched,
    /// so an unknown name leaves the world unchanged.
    pub fn restore_from_snapshot(
        &mut self,
        snapshot: &WorldSnapshot,
        registry: &ComponentRegistry,
    ) -> Result<(), EcsError> {
        for entity in &snapshot.entities {
            for name in entity.components.keys() {
                if !registry.contains(name) {
                    return Err(EcsError::UnknownComponent {
                        name: name.clone(),
                        registered: registry.registered_names().join(", "),
                    });
                }
            }
        }

        let rebuilt = snapshot
            .entities
            .iter()
            .map(|e| registry.assemble(e))
            .collect::<Result<Vec<_>, _>>()?;

        self.clear_entities();
        for entity in rebuilt {
            self.add_entity(entity);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
