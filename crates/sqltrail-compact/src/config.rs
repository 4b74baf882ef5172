//! Compaction configuration.
//!
//! All variation between deployments (comment affix, size bound,
//! participating tables) is carried as data; the state machine is shared.

use crate::classify::{normalize_table, write_target};
use sqltrail_core::{Error, Result};

/// Default comment affix: contexts are written as `/*Bemi {...} Bemi*/`.
pub const DEFAULT_AFFIX: &str = "Bemi";

/// Default upper bound for an encoded context comment, in bytes (~1MB).
pub const DEFAULT_MAX_CONTEXT_SIZE: usize = 1_000_000;

const ENV_MAX_CONTEXT_SIZE: &str = "SQLTRAIL_MAX_CONTEXT_SIZE";
const ENV_AFFIX: &str = "SQLTRAIL_AFFIX";
const ENV_INCLUDE_TABLES: &str = "SQLTRAIL_INCLUDE_TABLES";
const ENV_INJECT_SQL: &str = "SQLTRAIL_INJECT_SQL";
const ENV_LOG_QUERIES: &str = "SQLTRAIL_LOG_QUERIES";

/// Configuration for context merging and transaction compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactConfig {
    /// Largest encoded context comment (bytes) that may be attached to a write.
    /// Bigger contexts are dropped for that statement; the write still runs.
    pub max_context_size: usize,
    /// Token delimiting the context comment.
    pub affix: String,
    /// Tables whose writes receive context. `None` means every table.
    pub include_tables: Option<Vec<String>>,
    /// Fold the write's own SQL text into the attached context under `"SQL"`.
    pub inject_sql: bool,
    /// Log every statement that is actually sent to the database.
    pub log_queries: bool,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            max_context_size: DEFAULT_MAX_CONTEXT_SIZE,
            affix: DEFAULT_AFFIX.to_string(),
            include_tables: None,
            inject_sql: false,
            log_queries: false,
        }
    }
}

impl CompactConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum encoded context size in bytes.
    pub fn max_context_size(mut self, bytes: usize) -> Self {
        self.max_context_size = bytes;
        self
    }

    /// Set the comment affix.
    pub fn affix(mut self, affix: impl Into<String>) -> Self {
        self.affix = affix.into();
        self
    }

    /// Only attach context to writes against these tables.
    ///
    /// Names are compared without identifier quotes; an unqualified entry
    /// also matches a schema-qualified target (`todo` matches `public.todo`).
    pub fn include_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Enable/disable folding the write SQL into the context.
    pub fn inject_sql(mut self, enabled: bool) -> Self {
        self.inject_sql = enabled;
        self
    }

    /// Enable/disable logging of sent statements.
    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Check the configuration, failing fast on values that would produce
    /// comments the classifier cannot recognise.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.max_context_size == 0 {
            return Err(Error::config("max_context_size must be greater than zero"));
        }
        if self.affix.is_empty() {
            return Err(Error::config("affix must not be empty"));
        }
        if !self
            .affix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(format!(
                "affix '{}' may only contain ASCII letters, digits and '_'",
                self.affix
            )));
        }
        if let Some(tables) = &self.include_tables {
            if tables.iter().any(|t| t.trim().is_empty()) {
                return Err(Error::config("include_tables contains an empty name"));
            }
        }
        Ok(())
    }

    /// Defaults overridden by `SQLTRAIL_*` environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    #[allow(clippy::result_large_err)]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_CONTEXT_SIZE) {
            config.max_context_size = raw.trim().parse().map_err(|_| {
                Error::config(format!("{ENV_MAX_CONTEXT_SIZE}: '{raw}' is not a byte count"))
            })?;
        }
        if let Some(affix) = lookup(ENV_AFFIX) {
            config.affix = affix.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_INCLUDE_TABLES) {
            let tables: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            config.include_tables = Some(tables);
        }
        if let Some(raw) = lookup(ENV_INJECT_SQL) {
            config.inject_sql = parse_flag(ENV_INJECT_SQL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG_QUERIES) {
            config.log_queries = parse_flag(ENV_LOG_QUERIES, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Whether a table takes part in context merging.
    pub fn includes_table(&self, table: &str) -> bool {
        let Some(tables) = &self.include_tables else {
            return true;
        };
        let target = normalize_table(table);
        let unqualified = target.rsplit('.').next().unwrap_or(&target);
        tables.iter().any(|entry| {
            let entry = normalize_table(entry.trim());
            entry.eq_ignore_ascii_case(&target) || entry.eq_ignore_ascii_case(unqualified)
        })
    }

    /// Whether a write statement takes part in context merging.
    ///
    /// With an allow-list configured, writes whose target table cannot be
    /// found lexically are left alone.
    pub fn includes_write(&self, sql: &str) -> bool {
        if self.include_tables.is_none() {
            return true;
        }
        write_target(sql).is_some_and(|table| self.includes_table(table))
    }
}

#[allow(clippy::result_large_err)]
fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::config(format!("{name}: '{raw}' is not a boolean"))),
    }
}
