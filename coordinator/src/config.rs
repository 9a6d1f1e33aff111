use monitor_criteria::CompilerOptions;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

pub const DEBOUNCE_ENV: &str = "DESK_MONITOR_DEBOUNCE_MS";
pub const MAX_CONCURRENT_QUERIES_ENV: &str = "DESK_MONITOR_MAX_CONCURRENT_QUERIES";
pub const AUTOREFRESH_ENV: &str = "DESK_MONITOR_AUTOREFRESH";

/// Configuration for the update coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between the first relevant signal and the refetch it triggers
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Items requested per `fetch_next`
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Window size for descriptors that don't set one
    #[serde(default = "default_window_size")]
    pub default_window_size: usize,

    /// Bound on outstanding queries across all groups
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Apply every signal-triggered refetch without suppression
    #[serde(default)]
    pub autorefresh_content: bool,

    #[serde(default)]
    pub compiler: CompilerOptions,
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_page_size() -> usize {
    25
}

fn default_window_size() -> usize {
    25
}

fn default_max_concurrent_queries() -> usize {
    4
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            page_size: default_page_size(),
            default_window_size: default_window_size(),
            max_concurrent_queries: default_max_concurrent_queries(),
            autorefresh_content: false,
            compiler: CompilerOptions::default(),
        }
    }
}

impl MonitorConfig {
    /// Configuration for tests and tools that want refetches right away
    pub fn immediate() -> Self {
        Self {
            debounce_ms: 0,
            ..Default::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be greater than zero".to_string());
        }

        if self.default_window_size == 0 {
            return Err("default_window_size must be greater than zero".to_string());
        }

        if self.max_concurrent_queries == 0 {
            return Err("max_concurrent_queries must be greater than zero".to_string());
        }

        self.compiler.validate()
    }

    /// Applies `DESK_MONITOR_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(debounce_ms) = lookup(DEBOUNCE_ENV).and_then(|value| value.trim().parse().ok())
        {
            self.debounce_ms = debounce_ms;
        }
        if let Some(limit) = lookup(MAX_CONCURRENT_QUERIES_ENV)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
        {
            self.max_concurrent_queries = limit;
        }
        if let Some(enabled) = lookup(AUTOREFRESH_ENV).and_then(|value| {
            match value.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => Some(false),
                "1" | "true" | "on" => Some(true),
                _ => None,
            }
        }) {
            self.autorefresh_content = enabled;
        }
        self
    }
}
