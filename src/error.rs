//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for region operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in the region and no loader resolved it
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The region's loader was invoked but produced nothing
    #[error("Key not found and could not be loaded: {0}")]
    KeyNotFoundOrNotLoadable(String),

    /// The background sweep runtime could not be started
    #[error("Sweep runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CacheError {
    /// Builds a `KeyNotFound` error from any debuggable key.
    pub fn key_not_found<K: std::fmt::Debug>(key: &K) -> Self {
        CacheError::KeyNotFound(format!("{:?}", key))
    }

    /// Builds a `KeyNotFoundOrNotLoadable` error from any debuggable key.
    pub fn not_loadable<K: std::fmt::Debug>(key: &K) -> Self {
        CacheError::KeyNotFoundOrNotLoadable(format!("{:?}", key))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_message() {
        let err = CacheError::key_not_found(&"absent");
        assert_eq!(err.to_string(), "Key not found: \"absent\"");
    }

    #[test]
    fn test_not_loadable_message() {
        let err = CacheError::not_loadable(&42u32);
        assert!(matches!(err, CacheError::KeyNotFoundOrNotLoadable(ref k) if k == "42"));
    }
}
