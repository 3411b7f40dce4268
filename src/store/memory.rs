//! In-process store backend.
//!
//! Holds the whole document tree as one [`Value`] guarded by a lock, with a
//! registry of per-path watch channels. Every mutation refreshes the value
//! of each registered path it touches, so watcher channels always carry the
//! current state. Clones share the same tree, which is how the gateway and
//! colocated engines observe each other.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{RwLock, watch};

use super::{BoardStore, FieldMap, StoreResult};

/// Shared in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    root: RwLock<Value>,
    watchers: DashMap<String, watch::Sender<Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    /// Push the post-mutation value to every watcher whose path is an
    /// ancestor or descendant of the mutated path, pruning channels that
    /// lost their last receiver.
    fn notify(&self, root: &Value, mutated_path: &str) {
        let mut orphaned = Vec::new();
        for entry in self.watchers.iter() {
            if paths_related(entry.key(), mutated_path) {
                entry.value().send_replace(value_at(root, entry.key()));
            }
            if entry.value().receiver_count() == 0 {
                orphaned.push(entry.key().clone());
            }
        }
        for path in orphaned {
            self.watchers
                .remove_if(&path, |_, sender| sender.receiver_count() == 0);
        }
    }
}

impl BoardStore for MemoryStore {
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move {
            let mut root = inner.root.write().await;
            set_at(&mut root, &path, value);
            inner.notify(&root, &path);
            Ok(())
        })
    }

    fn update(&self, path: &str, fields: FieldMap) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move {
            let mut root = inner.root.write().await;
            for (relative, value) in fields {
                set_at(&mut root, &format!("{path}/{relative}"), value);
            }
            inner.notify(&root, &path);
            Ok(())
        })
    }

    fn remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>> {
        self.write(path, Value::Null)
    }

    fn read_once(&self, path: &str) -> BoxFuture<'static, StoreResult<Value>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move {
            let root = inner.root.read().await;
            Ok(value_at(&root, &path))
        })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StoreResult<watch::Receiver<Value>>> {
        let inner = self.inner.clone();
        let path = path.to_string();
        Box::pin(async move {
            let root = inner.root.read().await;
            let current = value_at(&root, &path);
            let sender = inner
                .watchers
                .entry(path)
                .or_insert_with(|| watch::channel(current).0);
            Ok(sender.subscribe())
        })
    }
}

/// Non-empty segments of a slash-separated path.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Whether one path is an ancestor of the other (or they are equal), on
/// segment boundaries.
fn paths_related(a: &str, b: &str) -> bool {
    let mut left = segments(a);
    let mut right = segments(b);
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) if l == r => continue,
            (Some(_), Some(_)) => return false,
            _ => return true,
        }
    }
}

/// Snapshot the value stored at `path`, `Null` when absent.
fn value_at(root: &Value, path: &str) -> Value {
    let mut cursor = root;
    for segment in segments(path) {
        match cursor.get(segment) {
            Some(child) => cursor = child,
            None => return Value::Null,
        }
    }
    cursor.clone()
}

/// Replace the subtree at `path`, materialising intermediate objects.
/// A `Null` value deletes the addressed entry instead of storing it.
fn set_at(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((leaf, ancestors)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut cursor = root;
    for segment in ancestors {
        if !cursor.is_object() {
            if value.is_null() {
                // Nothing to delete below a non-object node.
                return;
            }
            *cursor = Value::Object(serde_json::Map::new());
        }
        let object = cursor.as_object_mut().expect("cursor is an object");
        if value.is_null() {
            // Deletions must not materialise missing ancestors.
            match object.get_mut(*segment) {
                Some(child) => cursor = child,
                None => return,
            }
        } else {
            cursor = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
    }

    if value.is_null() {
        if let Some(object) = cursor.as_object_mut() {
            object.remove(*leaf);
        }
        return;
    }

    if !cursor.is_object() {
        *cursor = Value::Object(serde_json::Map::new());
    }
    let object = cursor.as_object_mut().expect("cursor is an object");
    object.insert(leaf.to_string(), value);
}
