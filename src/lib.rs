//! # Delta Bus
//!
//! Delta ingestion and per-key fan-out core for a live vessel-telemetry
//! table: high-rate batched updates come in, independent per-key streams
//! and a searchable snapshot come out.
//!
//! ## Core Concepts
//!
//! - **Router**: decomposes each inbound batch into per-key records and
//!   invokes only the subscribers registered for the affected keys
//! - **Snapshot**: latest record per `(scope, key)` plus per-path metadata,
//!   for search/sort/filter and for seeding late-mounting observers
//! - **Filtered View**: memoized, sorted key list driven by search text and
//!   a selected-source filter
//! - **Transport adapter**: subscribe handshake, self-identity, pause gate
//!
//! ## Example
//!
//! ```
//! use deltabus::{Delta, DeltaRouter, PathKey, Scope, SelfIdentity};
//!
//! let router = DeltaRouter::new(SelfIdentity::new("vessels.urn:mrn:signalk:uuid:1234"));
//!
//! let delta: Delta = serde_json::from_str(r#"{
//!     "context": "vessels.urn:mrn:signalk:uuid:1234",
//!     "updates": [{
//!         "$source": "gps.0",
//!         "timestamp": "2024-05-01T10:00:00Z",
//!         "values": [{ "path": "navigation.speedOverGround", "value": 3.2 }]
//!     }]
//! }"#).unwrap();
//! router.publish_delta(&delta);
//!
//! let key = PathKey::compose("navigation.speedOverGround", "gps.0");
//! let record = router.snapshot().get(&Scope::SelfVessel, &key).unwrap();
//! assert_eq!(record.value, serde_json::json!(3.2));
//! ```

pub mod error;
pub mod prefs;
pub mod router;
pub mod snapshot;
pub mod timefmt;
pub mod transport;
pub mod types;
pub mod view;

// Re-exports
pub use error::{BusError, Result};
pub use prefs::Preferences;
pub use router::{
    DeltaRouter, RecordCallback, SubscriberRegistry, SubscriptionHandle, SubscriptionId,
};
pub use snapshot::{MetaFields, SnapshotStore};
pub use transport::{
    pump, FeedGate, Hello, SubscribeRequest, SubscriptionSpec, UnsubscribeRequest,
    DEFAULT_PERIOD_MILLIS,
};
pub use types::{
    Delta, PathKey, PathValue, Record, Scope, SelfIdentity, SourceDetails, Update, KEY_SEPARATOR,
};
pub use view::{meta_paths, FilteredView, SourceSelection};
