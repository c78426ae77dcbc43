use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

/// Reference to an entity owned by the embedding application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(pub u64);

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single argument of a fact
///
/// Equality is structural: `Int(1)` and `Float(1.0)` are different values.
/// Numeric comparisons that need to mix the two go through [`Value::as_number`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// Absent value
    #[default]
    None,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Immutable shared text
    String(Arc<str>),
    /// Entity reference
    Entity(EntityRef),
}

// -------------------------------------------------------------------------------------------------
// Conversions between `Value` and `serde_json::Value`, used when query rows are handed to
// applications that speak JSON.
// -------------------------------------------------------------------------------------------------

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::None => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Number(serde_json::Number::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s.to_string()),
            Value::Entity(e) => serde_json::json!({ "entity": e.0 }),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    return Err(anyhow!("Unsupported number value: {}", n));
                }
            }
            serde_json::Value::String(s) => Self::String(Arc::from(s.as_str())),
            serde_json::Value::Object(map) => match (map.len(), map.get("entity")) {
                (1, Some(serde_json::Value::Number(n))) => Self::Entity(EntityRef(
                    n.as_u64().ok_or_else(|| anyhow!("Entity reference must be unsigned: {}", n))?,
                )),
                _ => return Err(anyhow!("Objects are not fact values: {}", value)),
            },
            serde_json::Value::Array(_) => {
                return Err(anyhow!("Arrays are not fact values: {}", value));
            }
        })
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::None => 0u8.hash(state),
            Self::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Self::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state); // Use bits representation for consistent hashing
            }
            Self::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Self::Entity(e) => {
                5u8.hash(state);
                e.hash(state);
            }
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Entity(e) => write!(f, "{e}"),
        }
    }
}

impl Value {
    /// Boolean coercion. Only `Bool` converts; every other variant yields `None`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float` values
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text payload, if this is a `String`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    /// Entity payload, if this is an `Entity`
    #[must_use]
    pub const fn as_entity(&self) -> Option<EntityRef> {
        match self {
            Self::Entity(e) => Some(*e),
            _ => None,
        }
    }

    /// Whether this is the `None` variant
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether this value takes part in numeric comparisons
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Entity(_) => "entity",
        }
    }

    /// Create a string value
    #[must_use]
    pub fn string(text: &str) -> Self {
        Self::String(Arc::from(text))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<EntityRef> for Value {
    fn from(value: EntityRef) -> Self {
        Self::Entity(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::None, Value::Bool(false));
        assert_eq!(Value::from("abc"), Value::string("abc"));
    }

    #[test]
    fn test_bool_coercion_only_accepts_bool() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(1).as_bool(), None);
        assert_eq!(Value::None.as_bool(), None);
    }

    #[test]
    fn test_numeric_view_mixes_int_and_float() {
        assert_eq!(Value::Int(2).as_number(), Some(2.0));
        assert_eq!(Value::Float(2.5).as_number(), Some(2.5));
        assert_eq!(Value::string("2").as_number(), None);
    }

    #[test]
    fn test_json_conversion_keeps_entity_refs() {
        let value = Value::Entity(EntityRef(42));
        let json = serde_json::Value::from(&value);
        assert_eq!(json, serde_json::json!({ "entity": 42 }));
        assert_eq!(Value::try_from(&json).unwrap(), value);
        assert!(Value::try_from(&serde_json::json!([1, 2])).is_err());
    }
}
