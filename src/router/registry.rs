//! Per-key subscriber registry with synchronous fan-out.

use crate::types::{PathKey, Record, Scope};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback invoked with each new record for a subscribed key.
pub type RecordCallback = Arc<dyn Fn(&Arc<Record>) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// The `(scope, key)` pair a subscription is attached to.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct SubjectKey {
    scope: Scope,
    key: PathKey,
}

struct Listener {
    id: SubscriptionId,
    callback: RecordCallback,
}

/// Callbacks for each observed key, in registration order. An empty vector
/// is never retained: the last release removes the entry, so memory is
/// bounded by the currently-observed keys, not the historical total.
type ListenerMap = HashMap<SubjectKey, Vec<Listener>>;

/// Registry mapping `(scope, key)` to its set of subscriber callbacks.
pub struct SubscriberRegistry {
    listeners: Arc<RwLock<ListenerMap>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for one `(scope, key)` stream.
    ///
    /// The returned handle detaches it again; dropping the handle without
    /// releasing leaves the subscription alive.
    pub fn subscribe(
        &self,
        scope: Scope,
        key: PathKey,
        callback: impl Fn(&Arc<Record>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subject = SubjectKey { scope, key };

        self.listeners
            .write()
            .entry(subject.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });

        debug!(id = id.0, key = %subject.key, "subscribed");

        SubscriptionHandle {
            id,
            subject,
            listeners: Arc::downgrade(&self.listeners),
            released: AtomicBool::new(false),
        }
    }

    /// Deliver a record to every callback registered for `(scope, key)`,
    /// in registration order.
    ///
    /// The callback list is snapshotted before iteration, so a callback may
    /// subscribe or release (even its own handle) without corrupting the
    /// in-flight delivery.
    pub fn deliver(&self, scope: &Scope, key: &PathKey, record: &Arc<Record>) {
        let subject = SubjectKey {
            scope: scope.clone(),
            key: key.clone(),
        };

        let snapshot: Vec<RecordCallback> = {
            let listeners = self.listeners.read();
            match listeners.get(&subject) {
                Some(entries) => entries
                    .iter()
                    .map(|listener| Arc::clone(&listener.callback))
                    .collect(),
                None => return,
            }
        };

        for callback in snapshot {
            callback(record);
        }
    }

    /// Total registered callbacks.
    pub fn subscription_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Number of keys with at least one subscriber.
    pub fn observed_key_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Drop every registration without invoking callbacks.
    pub fn reset(&self) {
        self.listeners.write().clear();
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one subscription; [`release`](Self::release) detaches it.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    subject: SubjectKey,
    listeners: Weak<RwLock<ListenerMap>>,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Detach the callback. Idempotent, and safe to call from inside the
    /// callback itself; takes effect no later than the next delivered batch.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        let mut listeners = listeners.write();
        if let Some(entries) = listeners.get_mut(&self.subject) {
            entries.retain(|listener| listener.id != self.id);
            if entries.is_empty() {
                listeners.remove(&self.subject);
            }
        }
        debug!(id = self.id.0, key = %self.subject.key, "released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Arc<Record> {
        Arc::new(Record {
            path: "navigation.speedOverGround".to_string(),
            value,
            source: "gps.0".to_string(),
            pgn: None,
            sentence: None,
            timestamp: "10:00:00".to_string(),
        })
    }

    fn key() -> PathKey {
        PathKey::compose("navigation.speedOverGround", "gps.0")
    }

    #[test]
    fn test_subscribe_deliver_release() {
        let registry = SubscriberRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = Arc::clone(&seen);
        let handle = registry.subscribe(Scope::SelfVessel, key(), move |record| {
            seen2.lock().push(record.value.clone());
        });
        assert_eq!(registry.subscription_count(), 1);

        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(1)));
        assert_eq!(*seen.lock(), vec![json!(1)]);

        handle.release();
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(registry.observed_key_count(), 0);

        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(2)));
        assert_eq!(*seen.lock(), vec![json!(1)]);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order1 = Arc::clone(&order);
        let _h1 = registry.subscribe(Scope::SelfVessel, key(), move |_| {
            order1.lock().push("first");
        });
        let order2 = Arc::clone(&order);
        let _h2 = registry.subscribe(Scope::SelfVessel, key(), move |_| {
            order2.lock().push("second");
        });

        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(1)));
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_unrelated_key_not_invoked() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let hits2 = Arc::clone(&hits);
        let _handle = registry.subscribe(Scope::SelfVessel, key(), move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let other = PathKey::compose("environment.depth", "sounder.0");
        registry.deliver(&Scope::SelfVessel, &other, &record(json!(4.2)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let handle = registry.subscribe(Scope::SelfVessel, key(), |_| {});

        handle.release();
        handle.release();
        assert!(handle.is_released());
        assert_eq!(registry.subscription_count(), 0);
    }

    #[test]
    fn test_release_during_delivery() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let slot2 = Arc::clone(&slot);
        let hits2 = Arc::clone(&hits);
        let handle = registry.subscribe(Scope::SelfVessel, key(), move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = slot2.lock().as_ref() {
                handle.release();
            }
        });
        *slot.lock() = Some(handle);

        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(1)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Released during its own invocation; must not fire again.
        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscription_count(), 0);
    }

    #[test]
    fn test_reset_detaches_without_invoking() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let hits2 = Arc::clone(&hits);
        let handle = registry.subscribe(Scope::SelfVessel, key(), move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        registry.reset();
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry.deliver(&Scope::SelfVessel, &key(), &record(json!(1)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Releasing a handle whose registration was reset away is harmless.
        handle.release();
    }
}
