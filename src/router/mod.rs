//! Delta ingestion: decompose inbound batches into per-key records and fan
//! them out.
//!
//! A batch touches only the keys it mentions. Each resulting record is
//! written into the snapshot store and then delivered synchronously to the
//! callbacks registered for that key; observers of unrelated keys do no
//! work. Updates to one key reach its subscribers in publish order; across
//! distinct keys there is no ordering guarantee.

mod registry;

pub use registry::{RecordCallback, SubscriberRegistry, SubscriptionHandle, SubscriptionId};

use crate::snapshot::SnapshotStore;
use crate::timefmt;
use crate::types::{Delta, PathKey, Record, Scope, SelfIdentity, Update};
use std::sync::Arc;
use tracing::{debug, trace};

/// Fields one update group shares across all its values.
struct GroupContext<'a> {
    source: &'a str,
    pgn: Option<u32>,
    sentence: Option<&'a str>,
    /// Already display-formatted.
    timestamp: String,
}

/// Routes inbound delta batches into the snapshot store and out to per-key
/// subscribers.
///
/// Explicitly owned: construct one per connection (shared via `Arc` across
/// every mounted consumer), tear it down when the owning view goes away.
pub struct DeltaRouter {
    identity: SelfIdentity,
    snapshot: Arc<SnapshotStore>,
    registry: SubscriberRegistry,
}

impl DeltaRouter {
    pub fn new(identity: SelfIdentity) -> Self {
        Self {
            identity,
            snapshot: Arc::new(SnapshotStore::new()),
            registry: SubscriberRegistry::new(),
        }
    }

    /// The snapshot this router writes into.
    pub fn snapshot(&self) -> &Arc<SnapshotStore> {
        &self.snapshot
    }

    /// Attach a callback to one `(scope, key)` stream. See
    /// [`SubscriberRegistry::subscribe`].
    pub fn subscribe(
        &self,
        scope: Scope,
        key: PathKey,
        callback: impl Fn(&Arc<Record>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.registry.subscribe(scope, key, callback)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    /// Ingest one delta batch.
    ///
    /// Infallible by contract: the transport cannot be trusted to deliver
    /// well-formed data, so malformed batches are dropped, never raised.
    pub fn publish_delta(&self, delta: &Delta) {
        let (context, updates) = match (&delta.context, &delta.updates) {
            (Some(context), Some(updates)) => (context, updates),
            _ => {
                debug!("dropping delta without context or updates");
                return;
            }
        };
        let scope = self.identity.normalize(context);

        for update in updates {
            self.apply_meta(&scope, update);
            self.apply_values(&scope, update);
        }
    }

    fn apply_meta(&self, scope: &Scope, update: &Update) {
        let Some(meta) = &update.meta else { return };
        for entry in meta {
            let Some(fields) = entry.value.as_object() else {
                trace!(path = %entry.path, "ignoring non-object meta entry");
                continue;
            };
            self.snapshot.merge_meta(scope, &entry.path, fields);
        }
    }

    fn apply_values(&self, scope: &Scope, update: &Update) {
        let Some(values) = &update.values else { return };
        let Some(source) = update.source.as_deref() else {
            debug!("dropping values group without $source");
            return;
        };

        let group = GroupContext {
            source,
            pgn: update.source_details.as_ref().and_then(|d| d.pgn),
            sentence: update
                .source_details
                .as_ref()
                .and_then(|d| d.sentence.as_deref()),
            // A delta without a timestamp was received just now.
            timestamp: update
                .timestamp
                .as_deref()
                .map(timefmt::format_timestamp_now)
                .unwrap_or_else(timefmt::format_now),
        };

        for entry in values {
            if entry.path.is_empty() {
                // Path-less bundle: each field of the payload is its own key
                // under the group's source.
                let Some(fields) = entry.value.as_object() else {
                    trace!("ignoring path-less value with non-object payload");
                    continue;
                };
                for (path, value) in fields {
                    self.route(scope, path, value.clone(), &group);
                }
            } else {
                self.route(scope, &entry.path, entry.value.clone(), &group);
            }
        }
    }

    fn route(&self, scope: &Scope, path: &str, value: serde_json::Value, group: &GroupContext<'_>) {
        let key = PathKey::compose(path, group.source);
        let record = Arc::new(Record {
            path: path.to_string(),
            value,
            source: group.source.to_string(),
            pgn: group.pgn,
            sentence: group.sentence.map(str::to_string),
            timestamp: group.timestamp.clone(),
        });

        trace!(scope = %scope, key = %key, "routing record");
        self.snapshot.write(scope, key.clone(), Arc::clone(&record));
        self.registry.deliver(scope, &key, &record);
    }

    /// Drop every subscription without invoking callbacks.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Full teardown for view dismissal: subscriptions and snapshot both go.
    pub fn teardown(&self) {
        self.registry.reset();
        self.snapshot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(json: serde_json::Value) -> Delta {
        serde_json::from_value(json).unwrap()
    }

    fn router() -> DeltaRouter {
        DeltaRouter::new(SelfIdentity::new("vessels.urn:mrn:signalk:uuid:abc"))
    }

    #[test]
    fn test_malformed_batches_are_noops() {
        let router = router();

        router.publish_delta(&Delta::default());
        router.publish_delta(&delta(json!({ "context": "self" })));
        router.publish_delta(&delta(json!({ "updates": [] })));

        assert!(router.snapshot().scopes().is_empty());
    }

    #[test]
    fn test_values_group_without_source_is_dropped() {
        let router = router();
        router.publish_delta(&delta(json!({
            "context": "self",
            "updates": [{
                "timestamp": "2024-05-01T10:00:00Z",
                "values": [{ "path": "navigation.headingTrue", "value": 1.57 }]
            }]
        })));

        assert_eq!(router.snapshot().record_count(&Scope::SelfVessel), 0);
    }

    #[test]
    fn test_protocol_annotations_carried_into_record() {
        let router = router();
        router.publish_delta(&delta(json!({
            "context": "self",
            "updates": [{
                "$source": "n2k.1",
                "source": { "pgn": 129029 },
                "timestamp": "2024-05-01T10:00:00Z",
                "values": [{ "path": "navigation.position", "value": { "latitude": 60.1 } }]
            }]
        })));

        let key = PathKey::compose("navigation.position", "n2k.1");
        let record = router.snapshot().get(&Scope::SelfVessel, &key).unwrap();
        assert_eq!(record.pgn, Some(129029));
        assert_eq!(record.sentence, None);
    }

    #[test]
    fn test_missing_timestamp_renders_current_time() {
        let router = router();
        router.publish_delta(&delta(json!({
            "context": "self",
            "updates": [{
                "$source": "gps.0",
                "values": [{ "path": "navigation.headingTrue", "value": 1.57 }]
            }]
        })));

        let key = PathKey::compose("navigation.headingTrue", "gps.0");
        let record = router.snapshot().get(&Scope::SelfVessel, &key).unwrap();
        // Time-only wall clock, "HH:MM:SS".
        assert_eq!(record.timestamp.len(), 8);
        assert!(record.timestamp.contains(':'));
    }
}
