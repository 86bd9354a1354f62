//! Latest-value snapshot shared by the filtered view and late-mounting
//! observers.
//!
//! Nothing is ever evicted: the feed carries no deletion messages, and
//! growth is bounded by the upstream device/path cardinality. Favoring
//! "never miss a late-arriving key" over bounding memory is the accepted
//! tradeoff here.

use crate::types::{PathKey, Record, Scope};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metadata object for one path (units, display hints).
pub type MetaFields = serde_json::Map<String, serde_json::Value>;

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-wide generation ticket. Every stamp is distinct, so equal
/// generations always mean "nothing changed" — even when the values come
/// from different store or selection instances.
pub(crate) fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
struct ScopeState {
    records: HashMap<PathKey, Arc<Record>>,
    meta: HashMap<String, MetaFields>,
    /// Restamped when a key first appears; value overwrites leave it alone.
    key_generation: u64,
}

/// Per-scope map from key to latest record, plus per-path metadata.
#[derive(Default)]
pub struct SnapshotStore {
    scopes: RwLock<HashMap<Scope, ScopeState>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest record for a key, or `None` while no delta has mentioned it.
    pub fn get(&self, scope: &Scope, key: &PathKey) -> Option<Arc<Record>> {
        self.scopes.read().get(scope)?.records.get(key).cloned()
    }

    /// Every record in a scope. The records themselves are shared and
    /// immutable; the returned map is the caller's own copy.
    pub fn get_all(&self, scope: &Scope) -> HashMap<PathKey, Arc<Record>> {
        self.scopes
            .read()
            .get(scope)
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    /// Replace the record for a key. Called by the router only.
    pub fn write(&self, scope: &Scope, key: PathKey, record: Arc<Record>) {
        let mut scopes = self.scopes.write();
        let state = scopes.entry(scope.clone()).or_default();
        if !state.records.contains_key(&key) {
            state.key_generation = next_generation();
        }
        state.records.insert(key, record);
    }

    /// Merge metadata fields for a path. Later fields overwrite same-named
    /// earlier ones; unrelated fields persist.
    pub fn merge_meta(&self, scope: &Scope, path: &str, fields: &MetaFields) {
        let mut scopes = self.scopes.write();
        let state = scopes.entry(scope.clone()).or_default();
        let entry = state.meta.entry(path.to_string()).or_default();
        for (name, value) in fields {
            entry.insert(name.clone(), value.clone());
        }
    }

    /// Metadata for a path, or `None` if no delta has described it.
    pub fn meta_for(&self, scope: &Scope, path: &str) -> Option<MetaFields> {
        self.scopes.read().get(scope)?.meta.get(path).cloned()
    }

    /// Generation of the scope's key set. Changes exactly when a key first
    /// appears, never on a value overwrite; the filtered view keys its
    /// memoization on this. Generations are process-wide tickets, so a
    /// cleared and re-populated store can never echo an earlier value.
    pub fn key_generation(&self, scope: &Scope) -> u64 {
        self.scopes
            .read()
            .get(scope)
            .map(|state| state.key_generation)
            .unwrap_or(0)
    }

    /// Scopes seen so far, self first, the rest sorted by name (the order
    /// the scope selector presents them in).
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.scopes.read().keys().cloned().collect();
        scopes.sort_by_key(|scope| (!matches!(scope, Scope::SelfVessel), scope.to_string()));
        scopes
    }

    pub fn record_count(&self, scope: &Scope) -> usize {
        self.scopes
            .read()
            .get(scope)
            .map(|state| state.records.len())
            .unwrap_or(0)
    }

    /// Drop every record and metadata entry, for full teardown.
    pub fn clear(&self) {
        self.scopes.write().clear();
    }
}
