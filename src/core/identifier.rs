//! Identifier codec: turns path segments into typed keys and back
//!
//! The set of supported identifier kinds is closed. Discovery checks a
//! record's declared identifier type against it with [`IdentifierKind::of`],
//! so every descriptor that reaches the dispatcher carries a kind this
//! module can parse.

use crate::core::error::IdentifierError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::fmt;
use uuid::Uuid;

/// Identifier kinds a resource may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// 64-bit signed integer (`i64`)
    Int64,
    /// 32-bit signed integer (`i32`)
    Int32,
    /// `uuid::Uuid`
    Uuid,
    /// Opaque string (`String`)
    String,
}

impl IdentifierKind {
    /// Map a Rust type onto a supported kind, or `None` if unsupported
    pub fn of<T: ?Sized + 'static>() -> Option<Self> {
        Self::from_type_id(TypeId::of::<T>())
    }

    /// Same as [`of`](Self::of) for a type only known by its `TypeId`
    pub fn from_type_id(id: TypeId) -> Option<Self> {
        if id == TypeId::of::<i64>() {
            Some(IdentifierKind::Int64)
        } else if id == TypeId::of::<i32>() {
            Some(IdentifierKind::Int32)
        } else if id == TypeId::of::<Uuid>() {
            Some(IdentifierKind::Uuid)
        } else if id == TypeId::of::<String>() {
            Some(IdentifierKind::String)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Int64 => "int64",
            IdentifierKind::Int32 => "int32",
            IdentifierKind::Uuid => "uuid",
            IdentifierKind::String => "string",
        }
    }

    /// Parse a raw path segment into a typed identifier
    ///
    /// Parsing is strict: no surrounding whitespace, no explicit `+` sign,
    /// values must fit the declared width.
    pub fn parse(&self, raw: &str) -> Result<IdentifierValue, IdentifierError> {
        let malformed = |reason: &str| IdentifierError::Malformed {
            kind: *self,
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(malformed("identifier is empty"));
        }

        let key = match self {
            IdentifierKind::Int64 => {
                if raw.starts_with('+') {
                    return Err(malformed("explicit sign is not allowed"));
                }
                Key::Int64(raw.parse::<i64>().map_err(|e| malformed(&e.to_string()))?)
            }
            IdentifierKind::Int32 => {
                if raw.starts_with('+') {
                    return Err(malformed("explicit sign is not allowed"));
                }
                Key::Int32(raw.parse::<i32>().map_err(|e| malformed(&e.to_string()))?)
            }
            IdentifierKind::Uuid => {
                Key::Uuid(Uuid::parse_str(raw).map_err(|e| malformed(&e.to_string()))?)
            }
            IdentifierKind::String => Key::String(raw.to_string()),
        };

        Ok(IdentifierValue {
            kind: *self,
            raw: raw.to_string(),
            key,
        })
    }

    /// Read an identifier out of a JSON value (as stored inside a record)
    pub fn from_json(&self, value: &Value) -> Option<IdentifierValue> {
        let key = match (self, value) {
            (IdentifierKind::Int64, Value::Number(n)) => Key::Int64(n.as_i64()?),
            (IdentifierKind::Int32, Value::Number(n)) => {
                Key::Int32(i32::try_from(n.as_i64()?).ok()?)
            }
            (IdentifierKind::Uuid, Value::String(s)) => Key::Uuid(Uuid::parse_str(s).ok()?),
            (IdentifierKind::String, Value::String(s)) if !s.is_empty() => Key::String(s.clone()),
            _ => return None,
        };
        let raw = key.to_string();
        Some(IdentifierValue {
            kind: *self,
            raw,
            key,
        })
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed payload of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int64(i64),
    Int32(i32),
    Uuid(Uuid),
    String(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int64(v) => write!(f, "{}", v),
            Key::Int32(v) => write!(f, "{}", v),
            Key::Uuid(v) => write!(f, "{}", v.hyphenated()),
            Key::String(v) => f.write_str(v),
        }
    }
}

/// A parsed identifier together with the string it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierValue {
    kind: IdentifierKind,
    raw: String,
    key: Key,
}

impl IdentifierValue {
    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The string the identifier was parsed from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Whether this is a placeholder (`0`, nil UUID) standing for "not assigned yet"
    pub fn is_placeholder(&self) -> bool {
        match &self.key {
            Key::Int64(n) => *n == 0,
            Key::Int32(n) => *n == 0,
            Key::Uuid(uuid) => uuid.is_nil(),
            Key::String(_) => false,
        }
    }

    /// Canonical string form
    pub fn format(&self) -> String {
        self.key.to_string()
    }

    /// JSON form, as it appears in a record's identifier field
    pub fn to_json(&self) -> Value {
        match &self.key {
            Key::Int64(v) => Value::from(*v),
            Key::Int32(v) => Value::from(*v),
            Key::Uuid(v) => Value::String(v.hyphenated().to_string()),
            Key::String(v) => Value::String(v.clone()),
        }
    }
}

impl fmt::Display for IdentifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}
