//! Cache key and prompt fingerprint computation.
//!
//! A cache key uniquely identifies one cacheable response based on:
//! - Operation name (e.g. "copy.generate")
//! - Prompt text
//! - Structured parameters, in sorted key order
//!
//! Requests with the same key are considered equivalent and share one cached
//! response. The key is also the only identifier that may appear in logs or
//! stats; raw prompt text never leaves the call site.

use ahash::AHasher;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A deterministic key identifying one cacheable response.
///
/// Parameter order never affects the key: parameters are hashed in
/// `BTreeMap` iteration order, and nested JSON objects serialize with sorted
/// keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Compute a key from request components.
    ///
    /// # Arguments
    /// * `operation` - Logical operation name
    /// * `prompt` - Prompt text (hashed, never stored)
    /// * `params` - Structured parameters (sorted for consistency)
    ///
    /// # Example
    /// ```
    /// use tierguard::CacheKey;
    /// use std::collections::BTreeMap;
    ///
    /// let mut params = BTreeMap::new();
    /// params.insert("model".to_string(), serde_json::json!("model-a"));
    /// params.insert("temperature".to_string(), serde_json::json!(0.7));
    ///
    /// let a = CacheKey::compute("copy.generate", "write a headline", &params);
    /// let b = CacheKey::compute("copy.generate", "write a headline", &params);
    /// assert_eq!(a, b);
    /// ```
    pub fn compute(operation: &str, prompt: &str, params: &BTreeMap<String, Value>) -> Self {
        let mut hasher = AHasher::default();

        operation.hash(&mut hasher);
        prompt.hash(&mut hasher);

        // BTreeMap guarantees sorted key order; Value::to_string() is
        // canonical because serde_json maps are themselves sorted.
        for (key, value) in params {
            key.hash(&mut hasher);
            value.to_string().hash(&mut hasher);
        }

        CacheKey(hasher.finish())
    }

    /// Compute a key for a request with no structured parameters.
    pub fn simple(operation: &str, prompt: &str) -> Self {
        let params = BTreeMap::new();
        Self::compute(operation, prompt, &params)
    }

    /// Get the raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A log-safe stand-in for sensitive text.
///
/// Prompts and identities are customer data; diagnostics reference them only
/// through this fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint a piece of text.
    pub fn of(text: &str) -> Self {
        let mut hasher = AHasher::default();
        text.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    /// Get the raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
