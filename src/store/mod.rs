//! Path-addressed document store abstraction backing the board engine.
//!
//! Every store exposes the same primitive contract: snapshot reads, subtree
//! writes, field-level merges, removals, and live subscriptions delivering
//! the current value followed by every affected change. Engines never see
//! backend specifics, only [`BoardStore`] and [`StoreError`].

#[cfg(feature = "http-store")]
pub mod http;
pub mod memory;
pub mod paths;

use std::error::Error;

use futures::future::BoxFuture;
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Field map accepted by [`BoardStore::update`]; keys may contain `/` to
/// address nested fields relative to the update path.
pub type FieldMap = serde_json::Map<String, Value>;

/// Error raised by store backends regardless of the underlying transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failing operation.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored value could not be decoded into the expected shape.
    #[error("malformed value at `{path}`")]
    Malformed {
        /// Path of the offending value.
        path: String,
        /// Decode failure reported by serde.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a decode error for the value stored at `path`.
    pub fn malformed(path: impl Into<String>, source: serde_json::Error) -> Self {
        StoreError::Malformed {
            path: path.into(),
            source,
        }
    }
}

/// Abstraction over the shared session document store.
///
/// Subscriptions are delivered through a [`watch`] channel: the receiver is
/// seeded with the current value (so the initial state is observed without a
/// separate read) and updated on every change affecting the path. Rapid
/// successive writes may coalesce; the channel always holds the latest value.
pub trait BoardStore: Send + Sync {
    /// Replace the subtree at `path` with `value`. Writing `Value::Null`
    /// removes the subtree.
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StoreResult<()>>;
    /// Merge `fields` into the object at `path`. A `Value::Null` field
    /// deletes the addressed entry.
    fn update(&self, path: &str, fields: FieldMap) -> BoxFuture<'static, StoreResult<()>>;
    /// Remove the subtree at `path`.
    fn remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>>;
    /// Snapshot the value at `path`, `Value::Null` when absent.
    fn read_once(&self, path: &str) -> BoxFuture<'static, StoreResult<Value>>;
    /// Subscribe to the value at `path`.
    fn subscribe(&self, path: &str) -> BoxFuture<'static, StoreResult<watch::Receiver<Value>>>;
}

/// Length of the random suffix appended to push keys, in hex characters.
const PUSH_KEY_SUFFIX_LEN: usize = 12;

/// Generate a lexicographically time-ordered store key.
///
/// The key starts with the creation time in zero-padded hex millis so plain
/// key order doubles as creation order; the random suffix keeps keys from
/// concurrent writers distinct.
pub fn push_key(now_millis: u64) -> String {
    let mut suffix_bytes = [0u8; PUSH_KEY_SUFFIX_LEN / 2];
    rand::rng().fill_bytes(&mut suffix_bytes);
    let suffix: String = suffix_bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{now_millis:012x}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keys_sort_by_creation_time() {
        let earlier = push_key(1_700_000_000_000);
        let later = push_key(1_700_000_000_001);
        assert!(earlier < later);
        assert_eq!(earlier.len(), 12 + PUSH_KEY_SUFFIX_LEN);
    }

    #[test]
    fn push_keys_are_distinct_within_one_instant() {
        let a = push_key(1_700_000_000_000);
        let b = push_key(1_700_000_000_000);
        assert_ne!(a, b);
    }
}
