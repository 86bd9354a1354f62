//! Transport-facing adapter: the subscribe handshake, the self-identity
//! signal, and the pause gate in front of the router.
//!
//! The connection itself (websocket, reconnects) lives outside this crate;
//! these are the wire messages it sends and the boundary deltas cross on
//! the way in.

use crate::router::DeltaRouter;
use crate::types::{Delta, SelfIdentity};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Polling period requested from the server, in milliseconds. Opaque to the
/// core; this default matches the admin UI.
pub const DEFAULT_PERIOD_MILLIS: u64 = 2000;

/// Wildcard subscription request, issued once per active connection.
#[derive(Clone, Debug, Serialize)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<SubscriptionSpec>,
}

impl SubscribeRequest {
    pub fn wildcard(period_millis: u64) -> Self {
        Self {
            context: "*".to_string(),
            subscribe: vec![SubscriptionSpec {
                path: "*".to_string(),
                period: Some(period_millis),
            }],
        }
    }
}

/// Revokes the wildcard subscription on teardown or pause.
#[derive(Clone, Debug, Serialize)]
pub struct UnsubscribeRequest {
    pub context: String,
    pub unsubscribe: Vec<SubscriptionSpec>,
}

impl UnsubscribeRequest {
    pub fn wildcard() -> Self {
        Self {
            context: "*".to_string(),
            unsubscribe: vec![SubscriptionSpec {
                path: "*".to_string(),
                period: None,
            }],
        }
    }
}

/// One path pattern within a subscribe/unsubscribe request.
#[derive(Clone, Debug, Serialize)]
pub struct SubscriptionSpec {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

/// The server's greeting, carrying the local vessel's full identifier.
#[derive(Clone, Debug, Deserialize)]
pub struct Hello {
    #[serde(rename = "self", default)]
    pub self_id: Option<String>,
}

impl Hello {
    /// Identity for scope normalization.
    pub fn identity(&self) -> SelfIdentity {
        match &self.self_id {
            Some(id) => SelfIdentity::new(id.clone()),
            None => SelfIdentity::unknown(),
        }
    }
}

/// Pause gate in front of the router.
///
/// While paused, deltas are dropped outright (ignore, not buffering),
/// freezing the snapshot and the filtered view until resumed.
pub struct FeedGate {
    router: Arc<DeltaRouter>,
    paused: AtomicBool,
}

impl FeedGate {
    pub fn new(router: Arc<DeltaRouter>) -> Self {
        Self {
            router,
            paused: AtomicBool::new(false),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        debug!(paused, "feed gate");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Forward one delta unless paused. Returns whether it was forwarded.
    pub fn offer(&self, delta: &Delta) -> bool {
        if self.is_paused() {
            return false;
        }
        self.router.publish_delta(delta);
        true
    }
}

/// Drain parsed deltas into the gate until the sending side disconnects.
/// Returns the number of deltas forwarded.
pub fn pump(receiver: &Receiver<Delta>, gate: &FeedGate) -> u64 {
    let mut forwarded = 0;
    for delta in receiver.iter() {
        if gate.offer(&delta) {
            forwarded += 1;
        }
    }
    info!(forwarded, "delta feed disconnected");
    forwarded
}
