//! Editor configuration.
//!
//! Hosts typically keep these values in their own preference store; the core only needs a
//! plain struct. `EditorConfig` can also be read from TOML:
//!
//! ```rust
//! use ftl_editor_core::EditorConfig;
//!
//! let config = EditorConfig::from_toml_str("reconcile_delay_ms = 150\nauto_closers_enabled = false").unwrap();
//! assert_eq!(config.reconcile_delay_ms, 150);
//! assert!(!config.auto_closers_enabled);
//! assert!(config.auto_activation);
//! ```

use crate::error::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default quiescence delay before a reconcile pass runs.
pub const DEFAULT_RECONCILE_DELAY_MS: u64 = 300;

/// Settings for a [`TemplateEditor`](crate::TemplateEditor).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiescence delay in milliseconds before the background reconciler runs.
    pub reconcile_delay_ms: u64,
    /// Whether closing-pair strategies (tag/interpolation/comment closers) are active.
    pub auto_closers_enabled: bool,
    /// Whether completion auto-activates after a trigger sequence such as `<#` or `${`.
    pub auto_activation: bool,
    /// Whether a single remaining proposal should be inserted without showing a list.
    pub auto_insert: bool,
    /// Root directory for `/`-absolute include paths.
    pub template_root: Option<PathBuf>,
    /// Upper bound on the number of proposals returned by one completion request.
    pub max_completions: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            reconcile_delay_ms: DEFAULT_RECONCILE_DELAY_MS,
            auto_closers_enabled: true,
            auto_activation: true,
            auto_insert: true,
            template_root: None,
            max_completions: 200,
        }
    }
}

impl EditorConfig {
    /// Parse a config from TOML; missing keys take their default values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// The reconcile delay as a [`Duration`].
    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }

    /// Builder-style setter for the reconcile delay.
    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder-style setter for the template root.
    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = Some(root.into());
        self
    }
}
