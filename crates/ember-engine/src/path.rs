//! Dotted target paths: `"<Component>.<field>[.<field>...]"`.
//!
//! The first segment names a component by its [`Component::NAME`]; the rest
//! walk the component's serialized form. Object keys select fields and map
//! entries, numeric segments index arrays.
//!
//! [`Component::NAME`]: ember_ecs::component::Component::NAME

use std::fmt;

use serde_json::Value;

use crate::modifier::ModifierError;

/// A parsed target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    component: String,
    fields: Vec<String>,
}

impl TargetPath {
    /// Split `path` on `.`. Needs a component name and at least one field,
    /// with no empty segments.
    pub fn parse(path: &str) -> Result<Self, ModifierError> {
        let mut segments = path.split('.');
        let component = segments.next().unwrap_or_default();
        let fields: Vec<String> = segments.map(str::to_owned).collect();
        if component.is_empty() || fields.is_empty() || fields.iter().any(String::is_empty) {
            return Err(ModifierError::MalformedPath {
                path: path.to_owned(),
            });
        }
        Ok(Self {
            component: component.to_owned(),
            fields,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Read the numeric leaf. `Ok(None)` if a key along the way is missing.
    pub fn read_number(&self, root: &Value) -> Result<Option<f64>, ModifierError> {
        let Some(leaf) = self.walk(root)? else {
            return Ok(None);
        };
        leaf.as_f64()
            .map(Some)
            .ok_or_else(|| ModifierError::NotNumeric {
                path: self.to_string(),
            })
    }

    /// Overwrite the numeric leaf with `value`. Integer leaves receive
    /// `value` rounded to the nearest integer. `Ok(false)` if a key along
    /// the way is missing.
    pub fn write_number(&self, root: &mut Value, value: f64) -> Result<bool, ModifierError> {
        let Some(leaf) = self.walk_mut(root)? else {
            return Ok(false);
        };
        let (unsigned, integer) = match &*leaf {
            Value::Number(n) => (n.is_u64(), n.is_i64() || n.is_u64()),
            _ => {
                return Err(ModifierError::NotNumeric {
                    path: self.to_string(),
                })
            }
        };
        *leaf = if unsigned && value >= 0.0 {
            Value::from(value.round() as u64)
        } else if integer {
            Value::from(value.round() as i64)
        } else {
            let number = serde_json::Number::from_f64(value).ok_or_else(|| {
                ModifierError::NonFinite {
                    path: self.to_string(),
                    value,
                }
            })?;
            Value::Number(number)
        };
        Ok(true)
    }

    fn walk<'v>(&self, root: &'v Value) -> Result<Option<&'v Value>, ModifierError> {
        let mut node = root;
        for segment in &self.fields {
            let next = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => return Err(self.not_indexable(segment)),
            };
            match next {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn walk_mut<'v>(&self, root: &'v mut Value) -> Result<Option<&'v mut Value>, ModifierError> {
        let mut node = root;
        for segment in &self.fields {
            let next = match node {
                Value::Object(map) => map.get_mut(segment),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(move |i| items.get_mut(i)),
                _ => return Err(self.not_indexable(segment)),
            };
            match next {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    fn not_indexable(&self, segment: &str) -> ModifierError {
        ModifierError::PathNotIndexable {
            path: self.to_string(),
            segment: segment.to_owned(),
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component)?;
        for field in &self.fields {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_splits_component_and_fields() {
        let p = TargetPath::parse("Weapon.inventory.ranged.damage").unwrap();
        assert_eq!(p.component(), "Weapon");
        assert_eq!(p.fields(), ["inventory", "ranged", "damage"]);
        assert_eq!(p.to_string(), "Weapon.inventory.ranged.damage");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["Movement", "", ".speed", "Movement.", "Movement..speed"] {
            assert!(
                matches!(TargetPath::parse(bad), Err(ModifierError::MalformedPath { .. })),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn read_nested_and_indexed() {
        let value = json!({ "inventory": { "ranged": { "damage": 12 } }, "ammo": [3, 4.5] });
        let p = TargetPath::parse("Weapon.inventory.ranged.damage").unwrap();
        assert_eq!(p.read_number(&value).unwrap(), Some(12.0));
        let p = TargetPath::parse("Weapon.ammo.1").unwrap();
        assert_eq!(p.read_number(&value).unwrap(), Some(4.5));
    }

    #[test]
    fn missing_key_is_none() {
        let value = json!({ "speed": 1.0 });
        let p = TargetPath::parse("Movement.accel").unwrap();
        assert_eq!(p.read_number(&value).unwrap(), None);
        assert!(!p.write_number(&mut json!({ "speed": 1.0 }), 2.0).unwrap());
    }

    #[test]
    fn scalar_intermediate_is_not_indexable() {
        let value = json!({ "speed": 1.0 });
        let p = TargetPath::parse("Movement.speed.max").unwrap();
        assert!(matches!(
            p.read_number(&value),
            Err(ModifierError::PathNotIndexable { segment, .. }) if segment == "max"
        ));
    }

    #[test]
    fn non_numeric_leaf_is_rejected() {
        let mut value = json!({ "name": "sword" });
        let p = TargetPath::parse("Weapon.name").unwrap();
        assert!(matches!(p.read_number(&value), Err(ModifierError::NotNumeric { .. })));
        assert!(matches!(
            p.write_number(&mut value, 1.0),
            Err(ModifierError::NotNumeric { .. })
        ));
    }

    #[test]
    fn integer_leaves_are_rounded() {
        let mut value = json!({ "hp": 10, "debt": -3, "speed": 1.5 });
        TargetPath::parse("Stats.hp").unwrap().write_number(&mut value, 13.6).unwrap();
        TargetPath::parse("Stats.debt").unwrap().write_number(&mut value, -4.4).unwrap();
        TargetPath::parse("Stats.speed").unwrap().write_number(&mut value, 2.25).unwrap();
        assert_eq!(value, json!({ "hp": 14, "debt": -4, "speed": 2.25 }));
    }
}
