//! Attribute values and their JSON forms.

use serde_json::Value;
use std::fmt;

/// The declared type of a shadow attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// UTF-8 string, serialized quoted.
    String,
    /// Signed integer, serialized as a literal.
    Int,
    /// Floating point number, serialized as a literal.
    Float,
    /// Boolean, serialized as `true`/`false`.
    Bool,
    /// Always serialized as `null`. Used to delete keys remotely.
    Null,
}

impl AttrKind {
    /// Returns a short lowercase name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            AttrKind::String => "string",
            AttrKind::Int => "int",
            AttrKind::Float => "float",
            AttrKind::Bool => "bool",
            AttrKind::Null => "null",
        }
    }

    /// Parses a kind from its short name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(AttrKind::String),
            "int" => Some(AttrKind::Int),
            "float" => Some(AttrKind::Float),
            "bool" => Some(AttrKind::Bool),
            "null" => Some(AttrKind::Null),
            _ => None,
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
}

impl AttrValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::String(_) => AttrKind::String,
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Float(_) => AttrKind::Float,
            AttrValue::Bool(_) => AttrKind::Bool,
            AttrValue::Null => AttrKind::Null,
        }
    }

    /// Serializes the value as a JSON literal.
    ///
    /// Strings are quoted and escaped. Non-finite floats have no JSON
    /// representation and serialize as `null`.
    pub fn to_json_literal(&self) -> String {
        match self {
            AttrValue::String(s) => Value::from(s.as_str()).to_string(),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Float(f) => Value::from(*f).to_string(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Null => "null".to_string(),
        }
    }

    /// Decodes a JSON value according to the expected kind.
    ///
    /// Returns `None` when the JSON type does not match the kind. Integers
    /// must be integral; floats accept any JSON number.
    pub fn from_json(value: &Value, kind: AttrKind) -> Option<Self> {
        match kind {
            AttrKind::String => value.as_str().map(|s| AttrValue::String(s.to_string())),
            AttrKind::Int => value.as_i64().map(AttrValue::Int),
            AttrKind::Float => value.as_f64().map(AttrValue::Float),
            AttrKind::Bool => value.as_bool().map(AttrValue::Bool),
            AttrKind::Null => value.is_null().then_some(AttrValue::Null),
        }
    }

    /// Parses a value of the given kind from command-line style text.
    pub fn parse(text: &str, kind: AttrKind) -> Option<Self> {
        match kind {
            AttrKind::String => Some(AttrValue::String(text.to_string())),
            AttrKind::Int => text.parse().ok().map(AttrValue::Int),
            AttrKind::Float => text.parse().ok().map(AttrValue::Float),
            AttrKind::Bool => text.parse().ok().map(AttrValue::Bool),
            AttrKind::Null => (text == "null").then_some(AttrValue::Null),
        }
    }

    /// Returns the integer if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the bool if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_literal())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}
