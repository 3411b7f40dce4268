//! Cancellation handles for realtime subscriptions.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle onto a running subscription forwarder.
///
/// Cancelling stops delivery; dropping the handle does not, since the
/// owning engine keeps its own copy and releases every subscription in
/// `cleanup()`. Cancellation is idempotent.
#[derive(Clone)]
pub struct WatchHandle {
    task: Arc<JoinHandle<()>>,
}

impl WatchHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task: Arc::new(task) }
    }

    /// Stop the subscription; further changes are no longer delivered.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the forwarder is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Spawn a forwarder that invokes `on_value` with the current value and
/// then once per subsequent change until cancelled or the store goes away.
pub(crate) fn spawn_watch<F>(mut receiver: watch::Receiver<Value>, mut on_value: F) -> WatchHandle
where
    F: FnMut(Value) + Send + 'static,
{
    let task = tokio::spawn(async move {
        loop {
            let value = receiver.borrow_and_update().clone();
            on_value(value);
            if receiver.changed().await.is_err() {
                break;
            }
        }
    });
    WatchHandle::new(task)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn forwarder_delivers_initial_value_then_changes() {
        let (tx, rx) = watch::channel(json!("first"));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = spawn_watch(rx, move |value| {
            let _ = seen_tx.send(value);
        });

        assert_eq!(seen_rx.recv().await, Some(json!("first")));
        tx.send_replace(json!("second"));
        assert_eq!(seen_rx.recv().await, Some(json!("second")));

        handle.cancel();
        handle.cancel();
    }

    #[tokio::test]
    async fn cancelled_forwarders_stop_delivering() {
        let (tx, rx) = watch::channel(json!(0));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = spawn_watch(rx, move |value| {
            let _ = seen_tx.send(value);
        });
        assert_eq!(seen_rx.recv().await, Some(json!(0)));

        handle.cancel();
        // Wait for the abort to land before poking the channel again.
        while handle.is_active() {
            tokio::task::yield_now().await;
        }
        tx.send_replace(json!(1));
        assert!(seen_rx.try_recv().is_err());
    }
}
