//! Explicit opener registry.
//!
//! The set of available source openers is built once, frozen, and injected
//! into the composite machinery; there is no ambient global table of openers.
//! Openers are tried in registration order when a source entry carries no
//! explicit type hint.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConfigError, OpenError};
use crate::source::provider::{SourceOpener, TileSource};

// =============================================================================
// Builder
// =============================================================================

/// Accumulates opener registrations before the registry is frozen.
#[derive(Default)]
pub struct OpenerRegistryBuilder {
    openers: Vec<(String, Arc<dyn SourceOpener>)>,
}

impl OpenerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an opener under a type name. Registration order is the
    /// auto-detection order.
    pub fn register(mut self, name: impl Into<String>, opener: Arc<dyn SourceOpener>) -> Self {
        self.openers.push((name.into(), opener));
        self
    }

    /// Freeze into a read-only registry.
    pub fn freeze(self) -> OpenerRegistry {
        OpenerRegistry {
            openers: self.openers,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Read-only table of source openers.
pub struct OpenerRegistry {
    openers: Vec<(String, Arc<dyn SourceOpener>)>,
}

impl OpenerRegistry {
    /// Look up an opener by type name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceOpener>> {
        self.openers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, opener)| opener.clone())
    }

    /// Registered opener names, in detection order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.openers.iter().map(|(n, _)| n.as_str())
    }

    /// Open a path as a tile source.
    ///
    /// With a `type_hint`, only that opener is consulted and an unknown name
    /// is a configuration error. Without one, openers are tried in
    /// registration order and the first success wins; the final opener's
    /// error is reported if none succeed.
    pub async fn open(
        &self,
        path: &Path,
        type_hint: Option<&str>,
        params: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn TileSource>, OpenError> {
        if let Some(name) = type_hint {
            let opener = self.get(name).ok_or_else(|| ConfigError::UnknownSourceType {
                name: name.to_string(),
            })?;
            return opener.open(path, params).await;
        }

        let mut last_err = OpenError::SourceRead {
            path: path.to_path_buf(),
            message: "no source openers registered".to_string(),
        };
        for (name, opener) in &self.openers {
            match opener.open(path, params).await {
                Ok(source) => {
                    debug!(opener = %name, path = %path.display(), "opened source");
                    return Ok(source);
                }
                Err(err) => {
                    debug!(opener = %name, path = %path.display(), %err, "opener declined");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

// =============================================================================
// Tests
// =============================================================================
