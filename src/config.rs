//! Dialect capability settings.
//!
//! The host installs one [`DialectSettings`] value at startup via
//! [`install`]. It is read-only for the lifetime of the process and is
//! consulted by [`crate::pipeline::PipelineOptions::from_settings`] at the
//! start of each compilation.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::RewriteError;

/// Whether a query is part of a multi-statement ("split") collection load.
///
/// In split mode every statement must return rows in a stable order, so a
/// missing ORDER BY under OFFSET is a hard error instead of a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySplittingBehavior {
    #[default]
    SingleQuery,
    SplitQuery,
}

/// Process-wide capability flags for the target dialect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectSettings {
    /// Store and compare date/time values with millisecond precision by
    /// converting them to their double representation.
    pub millisecond_support: bool,
    /// Splitting behaviour assumed when the host does not pass one per query.
    pub default_query_splitting: QuerySplittingBehavior,
}

impl DialectSettings {
    /// Parse settings from a JSON document, e.g.
    /// `{"millisecond_support": true, "default_query_splitting": "split_query"}`.
    pub fn from_json(json: &str) -> Result<Self, RewriteError> {
        serde_json::from_str(json)
            .map_err(|e| RewriteError::InvalidArgument(format!("dialect settings: {e}")))
    }

    pub fn to_json(&self) -> Result<String, RewriteError> {
        serde_json::to_string(self)
            .map_err(|e| RewriteError::InternalError(format!("dialect settings: {e}")))
    }
}

static SETTINGS: OnceLock<DialectSettings> = OnceLock::new();

/// Install the process-wide settings. May be called once.
pub fn install(settings: DialectSettings) -> Result<(), RewriteError> {
    SETTINGS.set(settings).map_err(|_| {
        RewriteError::InvalidArgument("dialect settings are already installed".into())
    })
}

// ── Convenience accessors ──────────────────────────────────────────────────

/// Returns the installed settings, or the defaults when none were installed.
pub fn current() -> DialectSettings {
    SETTINGS.get().cloned().unwrap_or_default()
}

/// Returns whether millisecond emulation is enabled.
pub fn millisecond_support_enabled() -> bool {
    SETTINGS.get().is_some_and(|s| s.millisecond_support)
}

/// Returns the default splitting behaviour.
pub fn default_query_splitting() -> QuerySplittingBehavior {
    SETTINGS
        .get()
        .map(|s| s.default_query_splitting)
        .unwrap_or_default()
}
