//! Core types for the delta bus.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between path and source in a composite key.
pub const KEY_SEPARATOR: char = '$';

/// A logical source context for telemetry data.
///
/// Exactly one scope represents the local vessel; every context string that
/// names it (see [`SelfIdentity::normalize`]) collapses to `SelfVessel`
/// before any lookup, so "self" and the full identifier share one entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The local vessel.
    SelfVessel,
    /// Any other context, by its full identifier.
    Named(String),
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::SelfVessel => write!(f, "self"),
            Scope::Named(name) => write!(f, "{}", name),
        }
    }
}

/// The transport-provided identifier for the local vessel's context.
///
/// The server announces it in the connection greeting; until then the
/// identity is unknown and only the literal aliases normalize to self.
#[derive(Clone, Debug, Default)]
pub struct SelfIdentity {
    identifier: Option<String>,
}

impl SelfIdentity {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
        }
    }

    /// Identity before the greeting arrived.
    pub fn unknown() -> Self {
        Self { identifier: None }
    }

    /// Normalize a raw context string to a scope.
    ///
    /// `"self"`, `"vessels.self"`, and the configured full identifier all
    /// name the local vessel; anything else keeps its own scope.
    pub fn normalize(&self, raw: &str) -> Scope {
        if raw == "self" || raw == "vessels.self" {
            return Scope::SelfVessel;
        }
        if self.identifier.as_deref() == Some(raw) {
            return Scope::SelfVessel;
        }
        Scope::Named(raw.to_string())
    }
}

/// Composite key identifying one value stream: `path$source`.
///
/// Uniqueness is per `(scope, key)`; the same path reported by two sources
/// yields two independent keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    pub fn compose(path: &str, source: &str) -> Self {
        PathKey(format!("{}{}{}", path, KEY_SEPARATOR, source))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-delimited path portion.
    pub fn path(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(path, _)| path)
            .unwrap_or(&self.0)
    }

    /// The source portion.
    pub fn source(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(_, source)| source)
            .unwrap_or("")
    }
}

impl fmt::Debug for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathKey({})", self.0)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Latest known state for one `(scope, key)` pair.
///
/// Immutable once constructed: the router replaces the whole `Arc<Record>`
/// on update, so an observer holding a previous record always sees a
/// consistent value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Dot-delimited path this value belongs to.
    pub path: String,

    /// The raw value, arbitrary structured data.
    pub value: serde_json::Value,

    /// Originating data source.
    pub source: String,

    /// NMEA 2000 frame number, when the producing device reported one.
    pub pgn: Option<u32>,

    /// Raw NMEA 0183 sentence tag, when reported.
    pub sentence: Option<String>,

    /// Display-formatted timestamp (time-only when same-day).
    pub timestamp: String,
}

// --- Inbound wire shapes ---

/// One delta batch as it arrives from the transport.
///
/// Every field is optional: the transport is untrusted, and a batch missing
/// `context` or `updates` is dropped without error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub updates: Option<Vec<Update>>,
}

/// One update group within a batch.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Update {
    /// Source identifier shared by every value in the group.
    #[serde(rename = "$source", default)]
    pub source: Option<String>,

    /// Protocol-level details about the producing device.
    #[serde(rename = "source", default)]
    pub source_details: Option<SourceDetails>,

    /// ISO-8601 timestamp shared by every value in the group.
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub values: Option<Vec<PathValue>>,

    /// Metadata entries (units, display hints), merged field-by-field.
    #[serde(default)]
    pub meta: Option<Vec<PathValue>>,
}

/// Protocol annotations attached to an update group.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceDetails {
    #[serde(default)]
    pub pgn: Option<u32>,
    #[serde(default)]
    pub sentence: Option<String>,
}

/// A single path/value pair.
///
/// An empty path is not a single key: the value is then an object whose own
/// field names each expand into independent keys (some devices emit grouped,
/// path-less payload bundles).
#[derive(Clone, Debug, Deserialize)]
pub struct PathValue {
    pub path: String,
    pub value: serde_json::Value,
}
