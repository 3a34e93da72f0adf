#![forbid(unsafe_code)]

//! Table configuration.
//!
//! [`TableConfig`] holds the tunables that are not part of the persisted
//! state: initial page size, the storage key, virtualization defaults, and
//! behavioral switches. Values come from [`Default`], builder methods, or the
//! environment.
//!
//! # Environment Variables
//!
//! | Variable | Field | Format |
//! |----------|-------|--------|
//! | `TABULA_PAGE_SIZE` | `page_size` | positive integer |
//! | `TABULA_OVERSCAN` | `overscan` | integer |
//! | `TABULA_ESTIMATE_SIZE` | `estimate_size` | positive integer |
//! | `TABULA_STORAGE_KEY` | `storage_key` | non-empty string |
//! | `TABULA_PERSIST` | `persist` | bool (1/0/true/false/yes/no/on/off) |
//!
//! Invalid values keep the default and are reported in [`ConfigParse::errors`].

use std::env;
use std::fmt;

pub const ENV_PAGE_SIZE: &str = "TABULA_PAGE_SIZE";
pub const ENV_OVERSCAN: &str = "TABULA_OVERSCAN";
pub const ENV_ESTIMATE_SIZE: &str = "TABULA_ESTIMATE_SIZE";
pub const ENV_STORAGE_KEY: &str = "TABULA_STORAGE_KEY";
pub const ENV_PERSIST: &str = "TABULA_PERSIST";

/// Default storage key for the persisted state blob.
pub const DEFAULT_STORAGE_KEY: &str = "data-table-state";

/// Table tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Initial rows per page.
    pub page_size: usize,
    /// Page sizes offered to the user.
    pub page_size_options: Vec<usize>,
    /// Key under which the state blob is persisted.
    pub storage_key: String,
    /// Whether the state is persisted at all.
    pub persist: bool,
    /// Estimated row size before measurement.
    pub estimate_size: u32,
    /// Extra rows rendered on each side of the viewport.
    pub overscan: usize,
    /// Reset the page index to 0 when filters, sorting, or grouping change.
    pub auto_reset_page_index: bool,
    /// Whether rows can be selected.
    pub row_selection: bool,
    /// Allow more than one selected row.
    pub multi_row_selection: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_size_options: vec![10, 20, 30, 40, 50],
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            persist: true,
            estimate_size: 50,
            overscan: 5,
            auto_reset_page_index: true,
            row_selection: true,
            multi_row_selection: true,
        }
    }
}

/// Configuration plus every diagnostic produced while reading it.
#[derive(Debug, Clone)]
pub struct ConfigParse {
    pub config: TableConfig,
    pub errors: Vec<ConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl TableConfig {
    /// Read config from environment variables, dropping diagnostics.
    #[must_use]
    pub fn from_env() -> TableConfig {
        let parse = Self::from_env_with_diagnostics();
        for error in &parse.errors {
            tracing::warn!(%error, "ignoring invalid table config value");
        }
        parse.config
    }

    /// Read config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ConfigParse {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Read config through an arbitrary lookup.
    pub fn from_env_with<F>(mut get: F) -> ConfigParse
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = TableConfig::default();
        let mut errors = Vec::new();

        if let Some(value) = get(ENV_PAGE_SIZE) {
            match parse_usize(&value).filter(|v| *v > 0) {
                Some(parsed) => config.page_size = parsed,
                None => errors.push(ConfigError::new(
                    "page_size",
                    value,
                    "expected positive integer",
                )),
            }
        }

        if let Some(value) = get(ENV_OVERSCAN) {
            match parse_usize(&value) {
                Some(parsed) => config.overscan = parsed,
                None => errors.push(ConfigError::new("overscan", value, "expected integer")),
            }
        }

        if let Some(value) = get(ENV_ESTIMATE_SIZE) {
            match value.trim().parse::<u32>().ok().filter(|v| *v > 0) {
                Some(parsed) => config.estimate_size = parsed,
                None => errors.push(ConfigError::new(
                    "estimate_size",
                    value,
                    "expected positive integer",
                )),
            }
        }

        if let Some(value) = get(ENV_STORAGE_KEY) {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                errors.push(ConfigError::new("storage_key", value, "expected non-empty key"));
            } else {
                config.storage_key = trimmed.to_owned();
            }
        }

        if let Some(value) = get(ENV_PERSIST) {
            match parse_bool(&value) {
                Some(parsed) => config.persist = parsed,
                None => errors.push(ConfigError::new(
                    "persist",
                    value,
                    "expected bool (1/0/true/false)",
                )),
            }
        }

        if let Err(mut validation) = config.validate() {
            errors.append(&mut validation);
        }

        ConfigParse { config, errors }
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.page_size == 0 {
            errors.push(ConfigError::new("page_size", "0", "must be positive"));
        }
        if self.estimate_size == 0 {
            errors.push(ConfigError::new("estimate_size", "0", "must be positive"));
        }
        if self.page_size_options.iter().any(|&size| size == 0) {
            errors.push(ConfigError::new(
                "page_size_options",
                format!("{:?}", self.page_size_options),
                "page sizes must be positive",
            ));
        }
        if self.persist && self.storage_key.is_empty() {
            errors.push(ConfigError::new(
                "storage_key",
                "",
                "persistence requires a storage key",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn page_size_options(mut self, options: Vec<usize>) -> Self {
        self.page_size_options = options;
        self
    }

    #[must_use]
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    #[must_use]
    pub fn estimate_size(mut self, size: u32) -> Self {
        self.estimate_size = size;
        self
    }

    #[must_use]
    pub fn overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    #[must_use]
    pub fn auto_reset_page_index(mut self, enabled: bool) -> Self {
        self.auto_reset_page_index = enabled;
        self
    }

    #[must_use]
    pub fn row_selection(mut self, enabled: bool) -> Self {
        self.row_selection = enabled;
        self
    }

    #[must_use]
    pub fn multi_row_selection(mut self, enabled: bool) -> Self {
        self.multi_row_selection = enabled;
        self
    }
}

#[inline]
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[inline]
fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}
