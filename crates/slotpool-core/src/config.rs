//! Configuration for slotpool
//!
//! One TOML document with a section per component. Every field has a
//! default, so an empty file is a valid configuration.

use crate::types::{ProjectId, SlotId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotpoolConfig {
    /// SQLite file holding slots, metadata, audit log and the safe view
    pub database_path: PathBuf,
    /// Pool shape used by provisioning
    pub pool: PoolLayout,
    /// Allocator tuning
    pub allocator: AllocatorConfig,
    /// Reconciler tuning
    pub reconciler: ReconcilerConfig,
    /// Where engine resources and their slot tags live
    pub engine: EngineSchema,
    /// Connection settings
    pub store: StoreConfig,
}

impl SlotpoolConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With database path
    #[inline]
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// With pool layout
    #[inline]
    #[must_use]
    pub fn with_pool(mut self, pool: PoolLayout) -> Self {
        self.pool = pool;
        self
    }

    /// With candidate limit (K)
    #[inline]
    #[must_use]
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.allocator.candidate_limit = limit;
        self
    }

    /// With reconciler idle grace period
    #[inline]
    #[must_use]
    pub fn with_idle_grace_secs(mut self, secs: u64) -> Self {
        self.reconciler.idle_grace_secs = secs;
        self
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`]
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`Self::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check every section
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.allocator.validate()?;
        self.reconciler.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

impl Default for SlotpoolConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("slotpool.db"),
            pool: PoolLayout::default(),
            allocator: AllocatorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            engine: EngineSchema::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Upper bound on `project_count * slots_per_project`
pub const MAX_POOL_SLOTS: usize = 100_000;

/// Fixed per-project pools provisioned in bulk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolLayout {
    /// Prefix for generated project ids
    pub project_prefix: String,
    /// Number of engine projects
    pub project_count: usize,
    /// Slots carved from each project
    pub slots_per_project: usize,
}

impl PoolLayout {
    /// Create a layout
    #[inline]
    #[must_use]
    pub fn new(
        project_prefix: impl Into<String>,
        project_count: usize,
        slots_per_project: usize,
    ) -> Self {
        Self {
            project_prefix: project_prefix.into(),
            project_count,
            slots_per_project,
        }
    }

    /// Total slots in the pool, saturating at `usize::MAX`
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.project_count.saturating_mul(self.slots_per_project)
    }

    /// Every `(project, slot)` pair, in ascending id order
    ///
    /// Numbers are zero-padded so string order matches numeric order.
    #[must_use]
    pub fn slot_ids(&self) -> Vec<(ProjectId, SlotId)> {
        let project_width = pad_width(self.project_count);
        let slot_width = pad_width(self.slots_per_project);

        let mut out = Vec::with_capacity(self.capacity().min(MAX_POOL_SLOTS));
        for p in 1..=self.project_count {
            let project = format!("{}-{p:0project_width$}", self.project_prefix);
            for s in 1..=self.slots_per_project {
                let slot = format!("{project}-slot-{s:0slot_width$}");
                out.push((ProjectId::new(project.clone()), SlotId::new(slot)));
            }
        }
        out
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project_prefix.is_empty()
            || !self
                .project_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "pool.project_prefix must be non-empty [A-Za-z0-9_-]: {:?}",
                self.project_prefix
            )));
        }
        if self.project_count == 0 || self.slots_per_project == 0 {
            return Err(ConfigError::Invalid(
                "pool.project_count and pool.slots_per_project must be at least 1".to_string(),
            ));
        }
        match self.project_count.checked_mul(self.slots_per_project) {
            Some(total) if total <= MAX_POOL_SLOTS => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "pool of {} x {} slots exceeds the {MAX_POOL_SLOTS} slot limit",
                self.project_count, self.slots_per_project
            ))),
        }
    }
}

impl Default for PoolLayout {
    fn default() -> Self {
        Self::new("proj", 10, 5)
    }
}

fn pad_width(count: usize) -> usize {
    count.to_string().len().max(2)
}

/// Allocator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Candidates read from the safe view per acquire (K); also the bound on
    /// commit attempts
    pub candidate_limit: usize,
}

impl AllocatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_limit == 0 {
            return Err(ConfigError::Invalid(
                "allocator.candidate_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { candidate_limit: 5 }
    }
}

/// Longest idle grace accepted (ten years)
const MAX_IDLE_GRACE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Reconciler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Assignments younger than this are not reported as empty
    pub idle_grace_secs: u64,
}

impl ReconcilerConfig {
    /// Grace period as a chrono duration
    #[must_use]
    pub fn idle_grace(&self) -> chrono::Duration {
        i64::try_from(self.idle_grace_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::zero)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_grace_secs > MAX_IDLE_GRACE_SECS {
            return Err(ConfigError::Invalid(format!(
                "reconciler.idle_grace_secs exceeds {MAX_IDLE_GRACE_SECS}"
            )));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            idle_grace_secs: 24 * 60 * 60,
        }
    }
}

/// Location of slot-tagged resources inside the engine database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSchema {
    /// Resource table
    pub table: String,
    /// Column holding the slot id tag
    pub tag_column: String,
}

impl EngineSchema {
    /// Create a schema description
    #[inline]
    #[must_use]
    pub fn new(table: impl Into<String>, tag_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tag_column: tag_column.into(),
        }
    }

    /// Validate both identifiers
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for anything that is not a plain SQL
    /// identifier
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("engine.table", &self.table),
            ("engine.tag_column", &self.tag_column),
        ];
        for (field, value) in fields {
            if !is_sql_identifier(value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} is not a plain identifier: {value:?}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineSchema {
    fn default() -> Self {
        Self::new("workflow_entity", "slot_id")
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters
#[must_use]
pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    value.len() <= 64
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = SlotpoolConfig::from_toml_str("").unwrap();
        assert_eq!(config, SlotpoolConfig::default());
        assert_eq!(config.pool.capacity(), 50);
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
            database_path = "/var/lib/slotpool/state.db"

            [pool]
            project_prefix = "tenant"
            project_count = 3
            slots_per_project = 4

            [allocator]
            candidate_limit = 8

            [engine]
            table = "workflows"
            tag_column = "folder_slot"
        "#;
        let config = SlotpoolConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.pool, PoolLayout::new("tenant", 3, 4));
        assert_eq!(config.allocator.candidate_limit, 8);
        assert_eq!(config.engine, EngineSchema::new("workflows", "folder_slot"));
        assert_eq!(config.reconciler, ReconcilerConfig::default());
    }

    #[test]
    fn rejects_injected_identifiers() {
        let raw = r#"
            [engine]
            table = "workflows; DROP TABLE slots"
        "#;
        assert!(matches!(
            SlotpoolConfig::from_toml_str(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_zero_candidate_limit() {
        let config = SlotpoolConfig::new().with_candidate_limit(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_pool() {
        let huge = SlotpoolConfig::new().with_pool(PoolLayout::new("proj", usize::MAX, 2));
        assert!(matches!(huge.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(huge.pool.capacity(), usize::MAX);

        let raw = r#"
            [pool]
            project_count = 1000
            slots_per_project = 1000
        "#;
        assert!(matches!(
            SlotpoolConfig::from_toml_str(raw),
            Err(ConfigError::Invalid(_))
        ));

        let at_limit = SlotpoolConfig::new().with_pool(PoolLayout::new("proj", 1_000, 100));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconciler]\nidle_grace_secs = 60").unwrap();
        let config = SlotpoolConfig::load(file.path()).unwrap();
        assert_eq!(config.reconciler.idle_grace(), chrono::Duration::seconds(60));
    }

    #[test]
    fn slot_ids_are_padded_and_ordered() {
        let layout = PoolLayout::new("proj", 2, 3);
        let ids = layout.slot_ids();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[0].0.as_str(), "proj-01");
        assert_eq!(ids[0].1.as_str(), "proj-01-slot-01");
        assert_eq!(ids[5].1.as_str(), "proj-02-slot-03");

        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(sorted, ids);
    }

    #[test]
    fn identifier_rules() {
        assert!(is_sql_identifier("workflow_entity"));
        assert!(is_sql_identifier("_x1"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("1abc"));
        assert!(!is_sql_identifier("a-b"));
        assert!(!is_sql_identifier("a\"b"));
    }
}
