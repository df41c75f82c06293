//! Configuration module for mmrepl.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Values are handed explicitly to the resolver, record builder and sink; there
//! are no process-wide toggles.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::NodeId;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for mmrepl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub conflicts: ConflictsConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

/// Identity of the local node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Cluster system identifier; 0 means "not configured".
    pub system_id: u64,
    pub timeline_id: u32,
    pub database_id: u32,
    /// Optional human-readable node name used in server-log lines.
    pub name: Option<String>,
}

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.system_id, self.timeline_id, self.database_id)
    }
}

/// Policy used when no conflict handler decides a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Later commit timestamp wins, ties broken by node identity.
    #[default]
    LastUpdateWins,
    /// Always apply the remote change.
    ApplyRemote,
    /// Always keep the local row.
    KeepLocal,
}

impl std::fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DefaultPolicy::LastUpdateWins => "last_update_wins",
            DefaultPolicy::ApplyRemote => "apply_remote",
            DefaultPolicy::KeepLocal => "keep_local",
        };
        write!(f, "{}", s)
    }
}

/// Conflict logging and resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    /// Append every conflict to the conflict-history store.
    pub log_to_table: bool,
    /// Emit one diagnostic line per conflict.
    pub log_to_server_log: bool,
    /// Keep full local/remote tuples in conflict records.
    pub include_tuples: bool,
    pub default_policy: DefaultPolicy,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite conflict-history database.
    pub history_db: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/mmrepl/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("mmrepl")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            log_to_table: false,
            log_to_server_log: true,
            include_tuples: false,
            default_policy: DefaultPolicy::LastUpdateWins,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_db: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("mmrepl")
                .join("conflict_history.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"node.system_id"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- node ---
        if self.node.system_id == 0 {
            errors.push(ValidationError {
                field: "node.system_id".into(),
                message: "must be set to the cluster system identifier".into(),
            });
        }
        if self.node.database_id == 0 {
            errors.push(ValidationError {
                field: "node.database_id".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(name) = &self.node.name {
            if name.trim().is_empty() {
                errors.push(ValidationError {
                    field: "node.name".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }

        // --- conflicts ---
        if !self.conflicts.log_to_table && self.conflicts.include_tuples {
            errors.push(ValidationError {
                field: "conflicts.include_tuples".into(),
                message: "has no effect unless conflicts.log_to_table is enabled".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        // --- storage ---
        if self.storage.history_db.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.history_db".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use mmrepl_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .node(6_104_873_211_092_837_123, 1, 16384)
///     .conflicts_log_to_table(true)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- node ---

    pub fn node(mut self, system_id: u64, timeline_id: u32, database_id: u32) -> Self {
        self.config.node.system_id = system_id;
        self.config.node.timeline_id = timeline_id;
        self.config.node.database_id = database_id;
        self
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.config.node.name = Some(name.into());
        self
    }

    // --- conflicts ---

    pub fn conflicts_log_to_table(mut self, enabled: bool) -> Self {
        self.config.conflicts.log_to_table = enabled;
        self
    }

    pub fn conflicts_log_to_server_log(mut self, enabled: bool) -> Self {
        self.config.conflicts.log_to_server_log = enabled;
        self
    }

    pub fn conflicts_include_tuples(mut self, enabled: bool) -> Self {
        self.config.conflicts.include_tuples = enabled;
        self
    }

    pub fn conflicts_default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.config.conflicts.default_policy = policy;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- storage ---

    pub fn storage_history_db(mut self, path: PathBuf) -> Self {
        self.config.storage.history_db = path;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn valid_builder() -> ConfigBuilder {
        ConfigBuilder::new().node(6_104_873_211_092_837_123, 1, 16384)
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.node.system_id, 0);
        assert!(cfg.node.name.is_none());
        assert!(!cfg.conflicts.log_to_table);
        assert!(cfg.conflicts.log_to_server_log);
        assert!(!cfg.conflicts.include_tuples);
        assert_eq!(cfg.conflicts.default_policy, DefaultPolicy::LastUpdateWins);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "text");
        assert!(cfg
            .storage
            .history_db
            .to_string_lossy()
            .ends_with("conflict_history.db"));
    }

    #[test]
    fn default_config_only_lacks_node_identity() {
        let errors = Config::default().validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["node.system_id", "node.database_id"]);
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
node:
  system_id: 6104873211092837123
  timeline_id: 2
  database_id: 16384
  name: node-a
conflicts:
  log_to_table: true
  log_to_server_log: false
  include_tuples: true
  default_policy: keep_local
logging:
  level: debug
  format: json
storage:
  history_db: /tmp/mmrepl-history.db
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(
            cfg.node.node_id(),
            NodeId::new(6_104_873_211_092_837_123, 2, 16384)
        );
        assert_eq!(cfg.node.name.as_deref(), Some("node-a"));
        assert!(cfg.conflicts.log_to_table);
        assert!(!cfg.conflicts.log_to_server_log);
        assert!(cfg.conflicts.include_tuples);
        assert_eq!(cfg.conflicts.default_policy, DefaultPolicy::KeepLocal);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.storage.history_db, PathBuf::from("/tmp/mmrepl-history.db"));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let yaml = "node:\n  system_id: 5\n  database_id: 1\n";
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.node.system_id, 5);
        assert!(cfg.conflicts.log_to_server_log);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_returns_error_on_unknown_policy() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"conflicts:\n  default_policy: keep_both\n")
            .unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_invalid_log_level() {
        let cfg = valid_builder().logging_level("verbose").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_catches_invalid_log_format() {
        let cfg = valid_builder().logging_format("xml").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.format"));
    }

    #[test]
    fn validate_catches_tuples_without_table_logging() {
        let cfg = valid_builder()
            .conflicts_log_to_table(false)
            .conflicts_include_tuples(true)
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "conflicts.include_tuples");
    }

    #[test]
    fn validate_catches_blank_node_name() {
        let cfg = valid_builder().node_name("  ").build();
        assert!(cfg.validate().iter().any(|e| e.field == "node.name"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = valid_builder().logging_level(*level).build();
            assert!(cfg.validate().is_empty(), "level {level} rejected");
        }
    }

    // -- Builder --

    #[test]
    fn builder_overrides_fields() {
        let cfg = valid_builder()
            .node_name("paris")
            .conflicts_log_to_table(true)
            .conflicts_log_to_server_log(false)
            .conflicts_default_policy(DefaultPolicy::ApplyRemote)
            .storage_history_db(PathBuf::from("/var/lib/mmrepl/h.db"))
            .build();
        assert_eq!(cfg.node.name.as_deref(), Some("paris"));
        assert!(cfg.conflicts.log_to_table);
        assert!(!cfg.conflicts.log_to_server_log);
        assert_eq!(cfg.conflicts.default_policy, DefaultPolicy::ApplyRemote);
        assert_eq!(cfg.storage.history_db, PathBuf::from("/var/lib/mmrepl/h.db"));
    }

    #[test]
    fn builder_build_validated() {
        assert!(valid_builder().build_validated().is_ok());
        let errs = ConfigBuilder::new().build_validated().unwrap_err();
        assert!(errs.iter().any(|e| e.field == "node.system_id"));
    }

    #[test]
    fn default_policy_display() {
        assert_eq!(DefaultPolicy::LastUpdateWins.to_string(), "last_update_wins");
        assert_eq!(DefaultPolicy::ApplyRemote.to_string(), "apply_remote");
        assert_eq!(DefaultPolicy::KeepLocal.to_string(), "keep_local");
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("mmrepl/config.yaml"));
    }
}
