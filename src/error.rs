//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache operation.
///
/// `Clone` so that pipeline result handles can report the same outcome
/// to every reader.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Key is absent or has expired
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Stored value or entry kind does not match the requested one
    #[error("Type mismatch for key {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Caller misuse (bad configuration, premature pipeline read, overflow)
    #[error("Usage error: {0}")]
    Usage(String),

    /// The cache has been closed
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// Builds a `TypeMismatch` for `key`.
    pub fn mismatch(key: &str, expected: &'static str, found: &'static str) -> Self {
        CacheError::TypeMismatch {
            key: key.to_string(),
            expected,
            found,
        }
    }

    /// Returns true for a cache miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CacheError::KeyNotFound("k".into()).to_string(),
            "Key not found: k"
        );
        assert_eq!(
            CacheError::mismatch("k", "set", "scalar").to_string(),
            "Type mismatch for key k: expected set, found scalar"
        );
        assert_eq!(CacheError::Closed.to_string(), "Cache is closed");
    }

    #[test]
    fn test_is_not_found() {
        assert!(CacheError::KeyNotFound("k".into()).is_not_found());
        assert!(!CacheError::Usage("x".into()).is_not_found());
    }
}
