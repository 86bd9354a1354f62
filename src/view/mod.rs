//! Derived table view: which keys are visible given the search text and the
//! source filter.
//!
//! The view is a pure function of the snapshot's key set and the filter
//! inputs, memoized so that per-record value updates (absorbed by per-key
//! observers) never trigger a refilter.

use crate::snapshot::{next_generation, SnapshotStore};
use crate::types::{PathKey, Scope};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Selected-source filter state.
///
/// Selecting the first source auto-activates filtering, deselecting the
/// last one auto-deactivates it; toggling among two or more selections
/// leaves the flag alone. The header checkbox flips the flag directly.
#[derive(Clone, Debug)]
pub struct SourceSelection {
    selected: HashSet<String>,
    active: bool,
    /// Process-wide ticket, restamped on every mutation and at construction.
    /// Two selections never share a generation, so the view's cache can
    /// compare generations without caring which instance produced them.
    generation: u64,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceSelection {
    pub fn new() -> Self {
        Self {
            selected: HashSet::new(),
            active: false,
            generation: next_generation(),
        }
    }

    /// Rebuild from persisted preferences.
    pub fn from_parts(selected: impl IntoIterator<Item = String>, active: bool) -> Self {
        Self {
            selected: selected.into_iter().collect(),
            active,
            generation: next_generation(),
        }
    }

    /// Toggle one source in or out of the selection.
    pub fn toggle(&mut self, source: &str) {
        if self.selected.remove(source) {
            if self.selected.is_empty() {
                self.active = false;
            }
        } else {
            self.selected.insert(source.to_string());
            if self.selected.len() == 1 {
                self.active = true;
            }
        }
        self.generation = next_generation();
    }

    /// Activate or deactivate filtering without touching the selection.
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.generation = next_generation();
        }
    }

    /// Drop the whole selection (the scope selector does this on change).
    pub fn clear(&mut self) {
        if !self.selected.is_empty() || self.active {
            self.selected.clear();
            self.active = false;
            self.generation = next_generation();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_selected(&self, source: &str) -> bool {
        self.selected.contains(source)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> + '_ {
        self.selected.iter().map(String::as_str)
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, PartialEq, Eq)]
struct ViewInputs {
    scope: Scope,
    key_generation: u64,
    search: String,
    selection_generation: u64,
}

/// Memoized filter/sort over the snapshot's keys.
#[derive(Default)]
pub struct FilteredView {
    cache: Option<(ViewInputs, Arc<[PathKey]>)>,
    recomputes: u64,
}

impl FilteredView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys to display, lexicographically sorted.
    ///
    /// A key survives when source filtering is inactive, or the selection is
    /// empty, or its record's source is selected; and when the search text
    /// is empty or the key contains it case-insensitively.
    ///
    /// Recomputes only when the scope, the snapshot's key-set generation,
    /// the search text, or the source selection changed since the last call.
    pub fn visible_keys(
        &mut self,
        store: &SnapshotStore,
        scope: &Scope,
        search: &str,
        selection: &SourceSelection,
    ) -> Arc<[PathKey]> {
        let inputs = ViewInputs {
            scope: scope.clone(),
            key_generation: store.key_generation(scope),
            search: search.to_string(),
            selection_generation: selection.generation(),
        };

        if let Some((cached, keys)) = &self.cache {
            if *cached == inputs {
                return Arc::clone(keys);
            }
        }

        self.recomputes += 1;
        trace!(scope = %scope, search, "recomputing visible keys");

        let needle = search.to_lowercase();
        let mut keys: Vec<PathKey> = store
            .get_all(scope)
            .into_iter()
            .filter(|(key, record)| {
                let source_ok = !selection.is_active()
                    || selection.is_empty()
                    || selection.is_selected(&record.source);
                let search_ok =
                    needle.is_empty() || key.as_str().to_lowercase().contains(&needle);
                source_ok && search_ok
            })
            .map(|(key, _)| key)
            .collect();
        keys.sort();

        let keys: Arc<[PathKey]> = keys.into();
        self.cache = Some((inputs, Arc::clone(&keys)));
        keys
    }

    /// How many times the filter actually ran; memoization hits leave it
    /// unchanged.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}

/// Distinct paths visible in the metadata table for a scope: every key
/// matching the search, reduced to unique paths, sorted.
pub fn meta_paths(store: &SnapshotStore, scope: &Scope, search: &str) -> Vec<String> {
    let needle = search.to_lowercase();
    let mut paths: Vec<String> = store
        .get_all(scope)
        .into_iter()
        .filter(|(key, _)| needle.is_empty() || key.as_str().to_lowercase().contains(&needle))
        .map(|(_, record)| record.path.clone())
        .collect();
    paths.sort();
    paths.dedup();
    paths
}
