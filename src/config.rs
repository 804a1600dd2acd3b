//! Monitor configuration.

use serde::{Deserialize, Serialize};

/// Default number of change records retained per store.
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 100;

/// Construction-time configuration. Read-only for the lifetime of a monitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// When false, every registration is rejected.
    /// Default: true
    pub enabled: bool,

    /// Per-store history bound; oldest records are evicted first.
    /// Default: 100
    pub max_history_size: usize,

    /// Emit lifecycle diagnostics at debug level.
    pub debug_mode: bool,

    /// Advertised to auto-registration helpers; the engine itself never
    /// intercepts store construction.
    pub auto_register: bool,

    /// Log every recorded change.
    pub log_changes: bool,

    /// Registration filters.
    pub filters: FilterConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            debug_mode: false,
            auto_register: false,
            log_changes: false,
            filters: FilterConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Only allow the given store names to register.
    pub fn with_store_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.store_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size;
        self
    }

    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }
}

/// Name and key filters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Allow-list applied at registration (empty = allow all).
    pub store_names: Vec<String>,

    /// Reserved. Carried through configuration but not applied to diffs.
    pub exclude_keys: Vec<String>,
}

impl FilterConfig {
    /// Whether `name` passes the registration allow-list.
    pub fn allows(&self, name: &str) -> bool {
        self.store_names.is_empty() || self.store_names.iter().any(|n| n == name)
    }
}
