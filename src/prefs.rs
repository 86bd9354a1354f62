//! Durable data-browser preferences.
//!
//! The core treats these as plain inputs/outputs, read once at startup and
//! written on every change; they are not part of its state machine.

use crate::error::Result;
use crate::view::SourceSelection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// User settings persisted across sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub search: String,
    pub pause: bool,
    pub raw: bool,
    pub include_meta: bool,
    /// Selected scope, as the raw context string.
    pub context: String,
    pub selected_sources: BTreeSet<String>,
    pub source_filter_active: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            search: String::new(),
            pause: false,
            raw: false,
            include_meta: false,
            context: "self".to_string(),
            selected_sources: BTreeSet::new(),
            source_filter_active: false,
        }
    }
}

impl Preferences {
    /// Load from disk; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Source selection restored from these settings.
    pub fn source_selection(&self) -> SourceSelection {
        SourceSelection::from_parts(
            self.selected_sources.iter().cloned(),
            self.source_filter_active,
        )
    }

    /// Capture the selection back for persistence.
    pub fn remember_selection(&mut self, selection: &SourceSelection) {
        self.selected_sources = selection.selected().map(str::to_string).collect();
        self.source_filter_active = selection.is_active();
    }
}
