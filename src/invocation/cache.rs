//! Call-result memoization.
//!
//! Entries are keyed by call name and the full argument vector (structural
//! equality). The cache belongs to one engine, lives as long as it does and
//! never evicts; bound its size by bounding argument cardinality or by
//! recreating the engine.
//!
//! Concurrent first accesses to the same key are at-least-once: two workers
//! may both run the backend, but the first result stored wins and every caller
//! observes that same value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::ExecutionError;
use crate::value::Value;

/// Cache key: call name plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    name: String,
    args: Vec<Value>,
}

impl CallKey {
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoizes backend call results.
#[derive(Debug, Default)]
pub struct InvocationCache {
    entries: RwLock<HashMap<CallKey, Value>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn poisoned() -> ExecutionError {
    ExecutionError::Internal {
        message: "invocation cache lock poisoned".to_string(),
    }
}

impl InvocationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached result for `(name, args)` or runs `invoke` and
    /// stores its result. Failures are not cached.
    ///
    /// # Errors
    /// Propagates the error returned by `invoke`, or `Internal` if the cache
    /// lock is poisoned.
    pub fn get_or_invoke<F>(&self, name: &str, args: &[Value], invoke: F) -> Result<Value, ExecutionError>
    where
        F: FnOnce() -> Result<Value, ExecutionError>,
    {
        let key = CallKey::new(name, args.to_vec());
        {
            let guard = self.entries.read().map_err(|_| poisoned())?;
            if let Some(hit) = guard.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Run the backend without holding the lock; backends may be slow or
        // re-enter the cache through nested calls.
        let computed = invoke()?;

        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        // Another thread may have stored a result while we computed.
        Ok(guard.entry(key).or_insert(computed).clone())
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |g| g.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
