//! Configuration: one explicit structure per concern, loaded from JSON.
//!
//! Every section carries `#[serde(default)]`, so a config file only has to
//! name the fields it overrides. `validate()` runs before the coordinator
//! starts any lane.

use crate::error::{LedgerError, LedgerResult};
use crate::transaction::SortOrder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    pub refresh: RefreshConfig,
    pub analytics: AnalyticsConfig,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` keeps the store in memory for the process lifetime.
    pub path: Option<PathBuf>,
    pub max_records: usize,
    /// Slack above `max_records` tolerated before an eviction pass.
    pub eviction_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_records: 100_000,
            eviction_buffer: 1_000,
        }
    }
}

impl StoreConfig {
    /// Hard ceiling on stored records after any `add`.
    pub fn ceiling(&self) -> usize {
        self.max_records + self.eviction_buffer
    }

    /// Default row limit for store-side text search: 1% of capacity.
    pub fn search_limit(&self) -> usize {
        (self.max_records / 100).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub seed: Option<u64>,
    /// Records generated on first start when the store is empty.
    pub initial_count: usize,
    pub chunk_size: usize,
    /// Records adopted from a non-empty store on start.
    pub initial_page_size: usize,
    /// Upper bound on the coordinator's in-memory canonical set.
    pub working_set_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            initial_count: 100_000,
            chunk_size: 1_000,
            initial_page_size: 1_000,
            working_set_limit: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_ms: u64,
    pub batch_size: usize,
    pub auto_start: bool,
    pub summary_debounce_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            batch_size: 200,
            auto_start: false,
            summary_debounce_ms: 300,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn summary_debounce(&self) -> Duration {
        Duration::from_millis(self.summary_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Risk analytics run only when the filtered view is larger than this.
    pub threshold: usize,
    /// Newest slice of the view handed to the analytics lane.
    pub max_analyzed: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            threshold: 2_000,
            max_analyzed: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Presentation preferences the core honours or stamps into its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    /// ISO-4217 code stamped on generated records.
    pub currency: String,
    pub locale: String,
    pub timezone: String,
    pub items_per_page: usize,
    pub sort_order: SortOrder,
    pub enable_notifications: bool,
    pub compact_view: bool,
    pub show_advanced_filters: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            currency: "USD".to_string(),
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            items_per_page: 50,
            sort_order: SortOrder::Desc,
            enable_notifications: true,
            compact_view: false,
            show_advanced_filters: false,
        }
    }
}

impl LedgerConfig {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: LedgerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.store.max_records == 0 {
            return Err(invalid("store.max_records", "must be > 0"));
        }
        if self.store.eviction_buffer >= self.store.max_records {
            return Err(invalid(
                "store.eviction_buffer",
                format!("must be < max_records ({})", self.store.max_records),
            ));
        }
        if self.generation.chunk_size == 0 {
            return Err(invalid("generation.chunk_size", "must be > 0"));
        }
        if self.generation.initial_page_size == 0 {
            return Err(invalid("generation.initial_page_size", "must be > 0"));
        }
        if self.generation.working_set_limit == 0 {
            return Err(invalid("generation.working_set_limit", "must be > 0"));
        }
        if self.refresh.batch_size == 0 {
            return Err(invalid("refresh.batch_size", "must be > 0"));
        }
        if self.refresh.interval_ms < 100 {
            return Err(invalid("refresh.interval_ms", "must be >= 100"));
        }
        if self.preferences.items_per_page == 0 {
            return Err(invalid("preferences.items_per_page", "must be > 0"));
        }
        let currency = &self.preferences.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid(
                "preferences.currency",
                format!("'{currency}' is not a three-letter currency code"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
