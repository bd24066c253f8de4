//! Cache Value Module
//!
//! Dynamically typed payloads stored without serialization, and the
//! type-checked extraction used by reads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Value ==
/// A stored payload.
///
/// Values are moved in on write and cloned out on read. `Any` payloads are
/// shared through their `Arc`, so readers see the very same object the writer
/// stored; it is only observably mutable if it carries interior mutability.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Any(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary payload for opaque storage.
    pub fn any<T: Any + Send + Sync>(payload: T) -> Self {
        Value::Any(Arc::new(payload))
    }

    /// Converts a serializable payload into a `Json` value.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self> {
        serde_json::to_value(payload)
            .map(Value::Json)
            .map_err(|e| CacheError::Usage(format!("value is not representable as JSON: {}", e)))
    }

    /// Name of the variant, used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Any(_) => "any",
        }
    }

    /// Downcasts an `Any` payload to a shared `T`.
    pub fn downcast<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        match self {
            Value::Any(payload) => Arc::clone(payload)
                .downcast::<T>()
                .map_err(|_| CacheError::mismatch(key, std::any::type_name::<T>(), "any")),
            other => Err(CacheError::mismatch(
                key,
                std::any::type_name::<T>(),
                other.type_name(),
            )),
        }
    }

    /// Deserializes a `Json` payload (or a scalar, via its JSON form) into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let json = <serde_json::Value as FromValue>::from_value(self.clone(), key)?;
        serde_json::from_value(json)
            .map_err(|_| CacheError::mismatch(key, std::any::type_name::<T>(), self.type_name()))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::Bytes(v) => f.debug_tuple("Bytes").field(&v.len()).finish(),
            Value::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Value::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Any(a), Value::Any(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// == Conversions into Value ==
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

// == Extraction ==
/// Types that can be extracted from a stored [`Value`].
///
/// `key` is only used to build a descriptive error.
pub trait FromValue: Sized {
    fn from_value(value: Value, key: &str) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value, _key: &str) -> Result<Self> {
        Ok(value)
    }
}

macro_rules! scalar_from_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromValue for $ty {
            fn from_value(value: Value, key: &str) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(CacheError::mismatch(key, $name, other.type_name())),
                }
            }
        }
    };
}

scalar_from_value!(bool, Bool, "bool");
scalar_from_value!(i64, Int, "int");
scalar_from_value!(String, Str, "string");
scalar_from_value!(Vec<u8>, Bytes, "bytes");

/// Largest magnitude an `i64` can have and still convert to `f64` exactly.
const MAX_EXACT_F64_INT: u64 = 1 << 53;

impl FromValue for f64 {
    fn from_value(value: Value, key: &str) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) if v.unsigned_abs() <= MAX_EXACT_F64_INT => Ok(v as f64),
            other => Err(CacheError::mismatch(key, "float", other.type_name())),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value, key: &str) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v),
            Value::Bool(v) => Ok(v.into()),
            Value::Int(v) => Ok(v.into()),
            Value::Float(v) => serde_json::Number::from_f64(v)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CacheError::mismatch(key, "json", "float")),
            Value::Str(v) => Ok(v.into()),
            other => Err(CacheError::mismatch(key, "json", other.type_name())),
        }
    }
}
