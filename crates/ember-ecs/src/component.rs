//! Component traits, kinds and the name-keyed component registry.
//!
//! A component is any `'static` type implementing [`Component`]. Storage is
//! keyed by the Rust `TypeId`, so requesting a component that does not exist
//! is a type error rather than a misspelled string. Each component also
//! carries a static [`Component::NAME`], which is what dotted target paths,
//! snapshots and the [`ComponentRegistry`] use to find it at runtime.
//!
//! Serializable components get reflection through `serde_json::Value`. The
//! [`serde_component!`](crate::serde_component) macro wires that up for any
//! `Serialize + DeserializeOwned` type:
//!
//! ```
//! use ember_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Movement { max_speed: f32 }
//! ember_ecs::serde_component!(Movement, "Movement");
//!
//! let mut movement = Movement { max_speed: 4.0 };
//! let value = movement.to_value().unwrap();
//! assert_eq!(value, serde_json::json!({ "max_speed": 4.0 }));
//!
//! movement.load_value(serde_json::json!({ "max_speed": 6.0 })).unwrap();
//! assert_eq!(movement, Movement { max_speed: 6.0 });
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::entity::{Entity, EntityId};
use crate::snapshot::EntitySnapshot;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A typed data record attached to an entity.
pub trait Component: Any + Send + Sync {
    /// Name used by target paths, snapshots and the registry.
    const NAME: &'static str;

    /// Serialize the component, or `None` if it does not support reflection.
    fn to_value(&self) -> Option<serde_json::Value> {
        None
    }

    /// Overwrite the component from a serialized value.
    fn load_value(&mut self, value: serde_json::Value) -> Result<(), EcsError> {
        let _ = value;
        Err(EcsError::NotReflectable {
            component: Self::NAME.to_owned(),
        })
    }
}

/// Implement [`Component`] with serde-backed reflection.
///
/// `$ty` must implement `Serialize` and `DeserializeOwned`.
///
/// `load_value` rebuilds the whole value, so fields marked `#[serde(skip)]`
/// would come back as their defaults. List them in `keep = [...]` to carry
/// the live values across a load instead:
///
/// ```
/// #[derive(Debug, serde::Serialize, serde::Deserialize)]
/// struct Body {
///     max_speed: f32,
///     #[serde(skip)]
///     collider: Option<u32>,
/// }
/// ember_ecs::serde_component!(Body, "Body", keep = [collider]);
///
/// use ember_ecs::component::Component;
/// let mut body = Body { max_speed: 4.0, collider: Some(7) };
/// body.load_value(serde_json::json!({ "max_speed": 6.0 })).unwrap();
/// assert_eq!((body.max_speed, body.collider), (6.0, Some(7)));
/// ```
#[macro_export]
macro_rules! serde_component {
    ($ty:ty, $name:expr) => {
        $crate::serde_component!($ty, $name, keep = []);
    };
    ($ty:ty, $name:expr, keep = [$($field:ident),* $(,)?]) => {
        impl $crate::component::Component for $ty {
            const NAME: &'static str = $name;

            fn to_value(&self) -> ::core::option::Option<$crate::serde_json::Value> {
                $crate::serde_json::to_value(self).ok()
            }

            #[allow(unused_mut)]
            fn load_value(
                &mut self,
                value: $crate::serde_json::Value,
            ) -> ::core::result::Result<(), $crate::EcsError> {
                let mut loaded: $ty = $crate::serde_json::from_value(value).map_err(|e| {
                    $crate::EcsError::ComponentDeserialization {
                        component: $name.to_owned(),
                        details: e.to_string(),
                    }
                })?;
                $( ::core::mem::swap(&mut loaded.$field, &mut self.$field); )*
                *self = loaded;
                Ok(())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Static identity of a component type: its `TypeId` plus its name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKind {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentKind {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.name)
    }
}

// ---------------------------------------------------------------------------
// DynComponent
// ---------------------------------------------------------------------------

/// Object-safe view of a [`Component`], implemented for every component.
///
/// Entities store their components as `Box<dyn DynComponent>`; this is also
/// the handle name-based code (target paths, snapshots) works with.
pub trait DynComponent: Any + Send + Sync {
    fn kind(&self) -> ComponentKind;
    fn name(&self) -> &'static str;
    /// Same as [`Component::to_value`].
    fn reflect(&self) -> Option<serde_json::Value>;
    /// Same as [`Component::load_value`].
    fn load_reflected(&mut self, value: serde_json::Value) -> Result<(), EcsError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Component> DynComponent for T {
    fn kind(&self) -> ComponentKind {
        ComponentKind::of::<T>()
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn reflect(&self) -> Option<serde_json::Value> {
        Component::to_value(self)
    }

    fn load_reflected(&mut self, value: serde_json::Value) -> Result<(), EcsError> {
        Component::load_value(self, value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

type ComponentFactory =
    Box<dyn Fn(serde_json::Value) -> Result<Box<dyn DynComponent>, EcsError> + Send + Sync>;

/// Maps component names to deserializing factories.
///
/// Only needed to assemble entities from saved data; live entities never
/// consult it.
pub struct ComponentRegistry {
    by_name: HashMap<&'static str, (TypeId, ComponentFactory)>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    /// Register a component type under its [`Component::NAME`].
    ///
    /// Registering the same type twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if a *different* type is already registered under the same
    /// name.
    pub fn register<T>(&mut self)
    where
        T: Component + serde::de::DeserializeOwned,
    {
        if let Some((existing, _)) = self.by_name.get(T::NAME) {
            assert!(
                *existing == TypeId::of::<T>(),
                "component name '{}' is already registered for a different type",
                T::NAME
            );
            return;
        }
        let factory: ComponentFactory = Box::new(
            |value: serde_json::Value| -> Result<Box<dyn DynComponent>, EcsError> {
                let typed: T = serde_json::from_value(value).map_err(|e| {
                    EcsError::ComponentDeserialization {
                        component: T::NAME.to_owned(),
                        details: e.to_string(),
                    }
                })?;
                Ok(Box::new(typed))
            },
        );
        self.by_name.insert(T::NAME, (TypeId::of::<T>(), factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Build a boxed component from its serialized form.
    pub fn deserialize(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<Box<dyn DynComponent>, EcsError> {
        let (_, factory) = self
            .by_name
            .get(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_owned(),
                registered: self.registered_names().join(", "),
            })?;
        factory(value)
    }

    /// Rebuild a detached entity (same id, tags and active flag) from a
    /// snapshot. Every component in the snapshot must be registered.
    pub fn assemble(&self, snapshot: &EntitySnapshot) -> Result<Entity, EcsError> {
        let mut entity = Entity::with_id(EntityId::from_raw(snapshot.entity_id.to_raw()));
        entity.set_active(snapshot.active);
        for (name, value) in &snapshot.components {
            entity.insert_boxed(self.deserialize(name, value.clone())?);
        }
        for tag in &snapshot.tags {
            entity.insert_tag(tag);
        }
        Ok(entity)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.registered_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }
    crate::serde_component!(Pos, "Pos");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OtherPos {
        x: f32,
    }
    crate::serde_component!(OtherPos, "Pos");

    struct Opaque;
    impl Component for Opaque {
        const NAME: &'static str = "Opaque";
    }

    #[test]
    fn kinds_compare_by_type() {
        assert_eq!(ComponentKind::of::<Pos>(), ComponentKind::of::<Pos>());
        assert_ne!(ComponentKind::of::<Pos>(), ComponentKind::of::<Opaque>());
        assert_eq!(ComponentKind::of::<Pos>().name(), "Pos");
    }

    #[test]
    fn opaque_component_is_not_reflectable() {
        let mut opaque = Opaque;
        assert!(Component::to_value(&opaque).is_none());
        let err = Component::load_value(&mut opaque, serde_json::json!(1)).unwrap_err();
        assert!(matches!(err, EcsError::NotReflectable { component } if component == "Opaque"));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Body {
        max_speed: f32,
        #[serde(skip)]
        collider: Option<u32>,
        #[serde(skip)]
        scratch: Vec<u8>,
    }
    crate::serde_component!(Body, "Body", keep = [collider]);

    #[test]
    fn load_value_keeps_listed_skipped_fields() {
        let mut body = Body {
            max_speed: 4.0,
            collider: Some(7),
            scratch: vec![1, 2],
        };
        Component::load_value(&mut body, serde_json::json!({ "max_speed": 6.0 })).unwrap();
        assert_eq!(body.max_speed, 6.0);
        assert_eq!(body.collider, Some(7));
        assert!(body.scratch.is_empty());
    }

    #[test]
    fn load_value_rejects_wrong_shape() {
        let mut pos = Pos { x: 1.0, y: 2.0 };
        let err = Component::load_value(&mut pos, serde_json::json!({ "x": "nope" })).unwrap_err();
        assert!(matches!(err, EcsError::ComponentDeserialization { .. }));
        assert_eq!(pos, Pos { x: 1.0, y: 2.0 });
    }

    #[test]
    fn registry_deserializes_by_name() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>();
        reg.register::<Pos>();
        assert_eq!(reg.len(), 1);

        let boxed = reg
            .deserialize("Pos", serde_json::json!({ "x": 3.0, "y": 4.0 }))
            .unwrap();
        assert_eq!(
            boxed.as_any().downcast_ref::<Pos>(),
            Some(&Pos { x: 3.0, y: 4.0 })
        );
        assert!(matches!(
            reg.deserialize("Nope", serde_json::json!(null)),
            Err(EcsError::UnknownComponent { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "already registered for a different type")]
    fn registry_rejects_name_collision() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>();
        reg.register::<OtherPos>();
    }
}
