//! Stacking, path-targeted numeric modifiers.
//!
//! A [`Modifier`] component records effects keyed by a caller-chosen source
//! id ("sword_upgrade", "haste_potion#3"). Each effect targets a numeric field
//! through a dotted [`TargetPath`] and either adds to or multiplies it. The
//! targeted field always holds
//!
//! ```text
//! (base + sum(add values)) * product(multiply values)
//! ```
//!
//! where `base` is the field's value captured the first time any modifier
//! touched that path. There is no separate "effective value" API: the field
//! *is* the effective value.
//!
//! The component being modified lives on the same entity as the `Modifier`.
//! Use [`apply_modifier`] / [`remove_modifier`] to go through the entity's own
//! `Modifier`, or hold the component outside the entity and call
//! [`Modifier::apply`] directly.
//!
//! Writes go through the component's reflection, which reloads it from its
//! serialized form. Fields a component skips in serde (handles into physics
//! or audio, caches) must be listed in the `keep = [...]` arm of
//! [`serde_component!`](ember_ecs::serde_component) to survive a write.

use std::collections::BTreeMap;

use ember_ecs::entity::Entity;
use ember_ecs::EcsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::path::TargetPath;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration errors raised by modifier operations.
///
/// Data-availability gaps (missing component, missing field) are not
/// errors; they are logged and the call returns `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum ModifierError {
    #[error("malformed target path '{path}': expected '<Component>.<field>[.<field>...]'")]
    MalformedPath { path: String },

    #[error("cannot index into '{segment}' while resolving '{path}': not a nested structure")]
    PathNotIndexable { path: String, segment: String },

    #[error("value at '{path}' is not numeric")]
    NotNumeric { path: String },

    #[error("modifier on '{path}' produced a non-finite value ({value})")]
    NonFinite { path: String, value: f64 },

    #[error(transparent)]
    Reflection(#[from] EcsError),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// How a modifier combines with the base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierMode {
    Add,
    Multiply,
}

/// One active effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRecord {
    pub path: String,
    pub mode: ModifierMode,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Modifier
// ---------------------------------------------------------------------------

/// Active modifiers of one entity, plus the pre-modifier base value of every
/// path they have touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    active: BTreeMap<String, ModifierRecord>,
    base_values: BTreeMap<String, f64>,
}

ember_ecs::serde_component!(Modifier, "Modifier");

impl Modifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the effect `source` and rewrite the targeted
    /// field.
    ///
    /// Returns `Ok(false)` without recording anything when the component or
    /// field named by `path` does not exist on `target`. If `source` was
    /// previously aimed at a different path, that path is recomputed too.
    pub fn apply(
        &mut self,
        target: &mut Entity,
        path: &str,
        mode: ModifierMode,
        value: f64,
        source: impl Into<String>,
    ) -> Result<bool, ModifierError> {
        let parsed = TargetPath::parse(path)?;
        let source = source.into();
        if !value.is_finite() {
            return Err(ModifierError::NonFinite {
                path: path.to_owned(),
                value,
            });
        }

        let Some(current) = read_field(target, &parsed)? else {
            return Ok(false);
        };
        self.base_values.entry(path.to_owned()).or_insert(current);

        let record = ModifierRecord {
            path: path.to_owned(),
            mode,
            value,
        };
        let replaced = self.active.insert(source.clone(), record);
        if let Err(err) = self.recompute(target, &parsed) {
            match replaced {
                Some(old) => self.active.insert(source, old),
                None => self.active.remove(&source),
            };
            return Err(err);
        }
        debug!(source = %source, path, ?mode, value, "modifier applied");

        if let Some(old) = replaced.filter(|old| old.path != path) {
            self.recompute(target, &TargetPath::parse(&old.path)?)?;
        }
        Ok(true)
    }

    /// Revoke `source` and rewrite the field it targeted.
    ///
    /// Unknown sources are logged and return `Ok(false)`.
    pub fn remove(&mut self, target: &mut Entity, source: &str) -> Result<bool, ModifierError> {
        let Some(record) = self.active.remove(source) else {
            warn!(source, entity = %target.id(), "remove: no active modifier with this source");
            return Ok(false);
        };
        debug!(source, path = %record.path, "modifier removed");
        self.recompute(target, &TargetPath::parse(&record.path)?)
    }

    /// Re-base `path` (for example after a permanent stat increase) and
    /// rewrite the field from the new base.
    pub fn set_base_value(
        &mut self,
        target: &mut Entity,
        path: &str,
        value: f64,
    ) -> Result<bool, ModifierError> {
        let parsed = TargetPath::parse(path)?;
        if !value.is_finite() {
            return Err(ModifierError::NonFinite {
                path: path.to_owned(),
                value,
            });
        }
        let previous = self.base_values.insert(path.to_owned(), value);
        let result = self.recompute(target, &parsed);
        if result.is_err() {
            match previous {
                Some(old) => self.base_values.insert(path.to_owned(), old),
                None => self.base_values.remove(path),
            };
        }
        result
    }

    pub fn has_modifier(&self, source: &str) -> bool {
        self.active.contains_key(source)
    }

    pub fn get(&self, source: &str) -> Option<&ModifierRecord> {
        self.active.get(source)
    }

    /// Pre-modifier value of `path`, if any modifier ever targeted it.
    pub fn base_value(&self, path: &str) -> Option<f64> {
        self.base_values.get(path).copied()
    }

    /// Active effects on `path`, ordered by source id.
    pub fn modifiers_for<'a>(
        &'a self,
        path: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ModifierRecord)> + 'a {
        self.active
            .iter()
            .filter(move |(_, record)| record.path == path)
            .map(|(source, record)| (source.as_str(), record))
    }

    /// Source ids of every active effect.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// `(base + sum(add)) * product(multiply)` over the effects on `path`.
    pub fn effective_value(&self, path: &str) -> Option<f64> {
        let base = self.base_value(path)?;
        let (sum, product) = self.modifiers_for(path).fold(
            (0.0, 1.0),
            |(sum, product), (_, record)| match record.mode {
                ModifierMode::Add => (sum + record.value, product),
                ModifierMode::Multiply => (sum, product * record.value),
            },
        );
        Some((base + sum) * product)
    }

    fn recompute(&self, target: &mut Entity, path: &TargetPath) -> Result<bool, ModifierError> {
        let key = path.to_string();
        let Some(value) = self.effective_value(&key) else {
            return Ok(false);
        };
        if !value.is_finite() {
            return Err(ModifierError::NonFinite { path: key, value });
        }
        write_field(target, path, value)
    }
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

fn read_field(target: &Entity, path: &TargetPath) -> Result<Option<f64>, ModifierError> {
    let Some(component) = target.component_by_name(path.component()) else {
        warn!(entity = %target.id(), %path, "component not present on entity; skipping");
        return Ok(None);
    };
    let value = reflect(component.reflect(), path.component())?;
    let number = path.read_number(&value)?;
    if number.is_none() {
        warn!(entity = %target.id(), %path, "field not present on component; skipping");
    }
    Ok(number)
}

fn write_field(target: &mut Entity, path: &TargetPath, number: f64) -> Result<bool, ModifierError> {
    let id = target.id();
    let Some(component) = target.component_by_name_mut(path.component()) else {
        warn!(entity = %id, %path, "component not present on entity; skipping");
        return Ok(false);
    };
    let mut value = reflect(component.reflect(), path.component())?;
    if !path.write_number(&mut value, number)? {
        warn!(entity = %id, %path, "field not present on component; skipping");
        return Ok(false);
    }
    component.load_reflected(value)?;
    Ok(true)
}

fn reflect(
    value: Option<serde_json::Value>,
    component: &str,
) -> Result<serde_json::Value, ModifierError> {
    value.ok_or_else(|| {
        ModifierError::Reflection(EcsError::NotReflectable {
            component: component.to_owned(),
        })
    })
}

// ---------------------------------------------------------------------------
// Entity helpers
// ---------------------------------------------------------------------------

/// [`Modifier::apply`] through the entity's own `Modifier` component,
/// attaching an empty one first if needed.
///
/// Attaching changes the entity's component set; for an entity that already
/// lives in a world, follow up with
/// [`World::notify_entity_changed`](ember_ecs::world::World::notify_entity_changed).
pub fn apply_modifier(
    entity: &mut Entity,
    path: &str,
    mode: ModifierMode,
    value: f64,
    source: impl Into<String>,
) -> Result<bool, ModifierError> {
    let mut modifier = entity.remove::<Modifier>().unwrap_or_default();
    let result = modifier.apply(entity, path, mode, value, source);
    entity.insert(modifier);
    result
}

/// [`Modifier::remove`] through the entity's own `Modifier` component.
/// Entities without one have nothing to revoke.
pub fn remove_modifier(entity: &mut Entity, source: &str) -> Result<bool, ModifierError> {
    let Some(mut modifier) = entity.remove::<Modifier>() else {
        warn!(source, entity = %entity.id(), "remove: entity has no Modifier component");
        return Ok(false);
    };
    let result = modifier.remove(entity, source);
    entity.insert(modifier);
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
