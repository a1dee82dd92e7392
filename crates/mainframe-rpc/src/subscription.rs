//! Server-side subscription tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::Message;

#[derive(Default)]
struct Table {
    closed: bool,
    tasks: HashMap<String, JoinHandle<()>>,
}

/// Tracks the subscriptions a single transport has opened.
///
/// Each subscription is a task pumping items from a capability handler's
/// stream into the transport as notifications. The sink is bounded: once
/// it is full the task stops polling its stream until the writer catches
/// up. The task, and with it the
/// handler's stream, lives until the stream ends, the handle is
/// unsubscribed, or the transport closes.
#[derive(Default)]
pub struct SubscriptionManager {
    table: Mutex<Table>,
}

impl SubscriptionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| {
            warn!("SubscriptionManager lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Allocate a fresh opaque handle.
    #[must_use]
    pub fn new_handle() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Start pumping `stream` into `sink` under `handle`.
    ///
    /// The caller must have queued the response carrying `handle` on `sink`
    /// already so the peer sees the handle before any item. Returns `false`
    /// (and drops the stream) if the transport is already closed.
    pub(crate) fn attach(
        self: &Arc<Self>,
        handle: String,
        mut stream: BoxStream<'static, Value>,
        sink: mpsc::Sender<Message>,
    ) -> bool {
        let mut table = self.lock();
        if table.closed {
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let key = handle.clone();
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                if sink.send(Message::subscription_item(&handle, item)).await.is_err() {
                    break;
                }
            }
            debug!(subscription = %handle, "subscription stream ended");
            if let Some(manager) = weak.upgrade() {
                manager.lock().tasks.remove(&handle);
            }
        });
        table.tasks.insert(key, task);
        true
    }

    /// Tear down a subscription. Unknown handles are ignored.
    ///
    /// Returns whether a live subscription was removed.
    pub fn unsubscribe(&self, handle: &str) -> bool {
        match self.lock().tasks.remove(handle) {
            Some(task) => {
                task.abort();
                debug!(subscription = %handle, "unsubscribed");
                true
            },
            None => false,
        }
    }

    /// Tear down every subscription and refuse new ones.
    pub fn close_all(&self) {
        let mut table = self.lock();
        table.closed = true;
        for (_, task) in table.tasks.drain() {
            task.abort();
        }
    }

    /// Whether `handle` names a live subscription.
    #[must_use]
    pub fn contains(&self, handle: &str) -> bool {
        self.lock().tasks.contains_key(handle)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether there are no live subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn items_are_tagged_with_the_handle() {
        let manager = Arc::new(SubscriptionManager::new());
        let (tx, mut rx) = mpsc::channel(16);
        let items = stream::iter(vec![Value::from(1), Value::from(2)]).boxed();

        assert!(manager.attach("h".into(), items, tx));

        for expected in [1, 2] {
            let Some(Message::Notification { params, .. }) = rx.recv().await else {
                panic!("expected notification");
            };
            assert_eq!(params["subscription"], "h");
            assert_eq!(params["result"], expected);
        }
    }

    #[tokio::test]
    async fn a_full_sink_stops_pulling_the_stream() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let manager = Arc::new(SubscriptionManager::new());
        let (tx, mut rx) = mpsc::channel(2);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let items = stream::iter(0..)
            .map(move |n: u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::from(n)
            })
            .boxed();

        assert!(manager.attach("h".into(), items, tx));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(pulled.load(Ordering::SeqCst) <= 3);

        for expected in 0..5u64 {
            let Some(Message::Notification { params, .. }) = rx.recv().await else {
                panic!("expected notification");
            };
            assert_eq!(params["result"], expected);
        }
        assert!(manager.unsubscribe("h"));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let manager = Arc::new(SubscriptionManager::new());
        let (tx, _rx) = mpsc::channel(16);
        manager.attach("h".into(), stream::pending().boxed(), tx);

        assert!(manager.contains("h"));
        assert!(manager.unsubscribe("h"));
        assert!(!manager.unsubscribe("h"));
        assert!(!manager.unsubscribe("never-existed"));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn close_all_rejects_new_subscriptions() {
        let manager = Arc::new(SubscriptionManager::new());
        let (tx, _rx) = mpsc::channel(16);
        manager.attach("a".into(), stream::pending().boxed(), tx.clone());
        manager.attach("b".into(), stream::pending().boxed(), tx.clone());
        assert_eq!(manager.len(), 2);

        manager.close_all();
        assert!(manager.is_empty());
        assert!(!manager.attach("c".into(), stream::pending().boxed(), tx));
        assert!(manager.is_empty());
    }
}
