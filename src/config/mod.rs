use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// Number of action categories (fixed execution order)
pub const CATEGORY_COUNT: usize = 9;

/// Format version written into every queue snapshot
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Environment variable enabling insert ordering
pub const ENV_ORDER_INSERTS: &str = "ACTION_QUEUE_ORDER_INSERTS";

/// Environment variable enabling update/collection ordering
pub const ENV_ORDER_UPDATES: &str = "ACTION_QUEUE_ORDER_UPDATES";

/// Environment variable enabling query-cache space invalidation
pub const ENV_QUERY_CACHE: &str = "ACTION_QUEUE_QUERY_CACHE";

/// Store-wide flush policy consulted by the action queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Regroup inserts by entity type before executing (`sort_actions`)
    pub order_inserts: bool,

    /// Sort updates and collection actions by (role, key) before executing
    pub order_updates: bool,

    /// Invalidate affected storage spaces in the query cache
    pub query_cache_enabled: bool,
}

impl QueueSettings {
    pub fn with_order_inserts(mut self, enabled: bool) -> Self {
        self.order_inserts = enabled;
        self
    }

    pub fn with_order_updates(mut self, enabled: bool) -> Self {
        self.order_updates = enabled;
        self
    }

    pub fn with_query_cache(mut self, enabled: bool) -> Self {
        self.query_cache_enabled = enabled;
        self
    }

    /// Load settings from a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> QueueResult<Self> {
        serde_json::from_str(json).map_err(|e| QueueError::ConfigError {
            setting: "QueueSettings".to_string(),
            value: json.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load settings from `ACTION_QUEUE_*` environment variables
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let mut settings = Self::default();
        if let Some(value) = lookup(ENV_ORDER_INSERTS) {
            settings.order_inserts = parse_flag(ENV_ORDER_INSERTS, &value)?;
        }
        if let Some(value) = lookup(ENV_ORDER_UPDATES) {
            settings.order_updates = parse_flag(ENV_ORDER_UPDATES, &value)?;
        }
        if let Some(value) = lookup(ENV_QUERY_CACHE) {
            settings.query_cache_enabled = parse_flag(ENV_QUERY_CACHE, &value)?;
        }
        Ok(settings)
    }
}

fn parse_flag(setting: &str, value: &str) -> QueueResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(QueueError::ConfigError {
            setting: setting.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
