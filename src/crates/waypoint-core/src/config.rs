//! Runtime configuration
//!
//! [`WaypointConfig`] is loaded from TOML, YAML or JSON (chosen by file
//! extension), then adjusted by `WAYPOINT_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `WAYPOINT_RECURSION_LIMIT` | `execution.recursion_limit` |
//! | `WAYPOINT_CHECKPOINT_BACKEND` | `checkpoint.backend` (`memory` / `sqlite`) |
//! | `WAYPOINT_SQLITE_PATH` | `checkpoint.path` (switches to sqlite) |
//! | `WAYPOINT_LOG_LEVEL` | `logging.level` |
//! | `WAYPOINT_LOG_FORMAT` | `logging.format` |
//!
//! ```toml
//! [execution]
//! recursion_limit = 50
//!
//! [checkpoint]
//! backend = "sqlite"
//! path = "${HOME}/.waypoint/checkpoints.db"
//!
//! [logging]
//! level = "info,waypoint_core=debug"
//! format = "json"
//! ```
//!
//! String paths support `${VAR}` expansion; unknown variables are left as
//! written.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};
use waypoint_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};

use crate::builder::{CompileOptions, DEFAULT_RECURSION_LIMIT};
use crate::error::{GraphError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub checkpoint: CheckpointBackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Execution limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum steps per invocation
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

fn default_recursion_limit() -> usize {
    DEFAULT_RECURSION_LIMIT
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

/// Checkpoint persistence backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CheckpointBackendConfig {
    /// Process-local, lost on exit
    Memory,

    /// SQLite database file
    Sqlite {
        path: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl Default for CheckpointBackendConfig {
    fn default() -> Self {
        CheckpointBackendConfig::Memory
    }
}

impl CheckpointBackendConfig {
    /// Open the configured saver
    pub async fn build(&self) -> Result<Arc<dyn CheckpointSaver>> {
        match self {
            CheckpointBackendConfig::Memory => {
                debug!("Using in-memory checkpoint saver");
                Ok(Arc::new(InMemoryCheckpointSaver::new()))
            }
            #[cfg(feature = "sqlite")]
            CheckpointBackendConfig::Sqlite {
                path,
                max_connections,
            } => {
                info!(path = %path, max_connections, "Opening SQLite checkpoint saver");
                let saver =
                    waypoint_checkpoint::SqliteCheckpointSaver::connect(path, *max_connections)
                        .await?;
                Ok(Arc::new(saver))
            }
            #[cfg(not(feature = "sqlite"))]
            CheckpointBackendConfig::Sqlite { .. } => Err(GraphError::Configuration(
                "SQLite backend requested but the `sqlite` feature is disabled".to_string(),
            )),
        }
    }
}

/// Log output settings for [`init_tracing`](crate::telemetry::init_tracing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"warn,waypoint_core=debug"`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(GraphError::Configuration(format!(
                "Unknown log format '{}'",
                other
            ))),
        }
    }
}

/// Serialization format of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(GraphError::Configuration(format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }
}

impl WaypointConfig {
    /// Load from a file, expand `${VAR}`s and apply environment overrides
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await.map_err(|e| {
            GraphError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_str_with_format(&content, format)?;
        config.apply_env_overrides()?;
        config.resolve_env_vars_from(|key| std::env::var(key).ok());

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse without touching the environment
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Apply `WAYPOINT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `WAYPOINT_*` overrides from an arbitrary lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(limit) = lookup("WAYPOINT_RECURSION_LIMIT") {
            self.execution.recursion_limit = limit.parse().map_err(|_| {
                GraphError::Configuration(format!("Invalid WAYPOINT_RECURSION_LIMIT: {}", limit))
            })?;
        }

        if let Some(backend) = lookup("WAYPOINT_CHECKPOINT_BACKEND") {
            self.checkpoint = match backend.to_ascii_lowercase().as_str() {
                "memory" => CheckpointBackendConfig::Memory,
                "sqlite" => match &self.checkpoint {
                    sqlite @ CheckpointBackendConfig::Sqlite { .. } => sqlite.clone(),
                    CheckpointBackendConfig::Memory => CheckpointBackendConfig::Sqlite {
                        path: "waypoint.db".to_string(),
                        max_connections: default_max_connections(),
                    },
                },
                other => {
                    return Err(GraphError::Configuration(format!(
                        "Unknown checkpoint backend '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(new_path) = lookup("WAYPOINT_SQLITE_PATH") {
            let max_connections = match &self.checkpoint {
                CheckpointBackendConfig::Sqlite {
                    max_connections, ..
                } => *max_connections,
                CheckpointBackendConfig::Memory => default_max_connections(),
            };
            self.checkpoint = CheckpointBackendConfig::Sqlite {
                path: new_path,
                max_connections,
            };
        }

        if let Some(level) = lookup("WAYPOINT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("WAYPOINT_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Expand `${VAR}` in path fields
    pub fn resolve_env_vars_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let CheckpointBackendConfig::Sqlite { path, .. } = &mut self.checkpoint {
            *path = expand_env_vars(path, &lookup);
        }
    }

    /// Compile options carrying the configured backend and limits
    pub async fn compile_options(&self) -> Result<CompileOptions> {
        if self.execution.recursion_limit == 0 {
            return Err(GraphError::Configuration(
                "execution.recursion_limit must be at least 1".to_string(),
            ));
        }
        let saver = self.checkpoint.build().await?;
        Ok(CompileOptions::new()
            .with_checkpointer(saver)
            .with_recursion_limit(self.execution.recursion_limit))
    }
}

/// Replace every `${NAME}` with its value; unknown names are kept verbatim
pub fn expand_env_vars<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(resolved) => out.push_str(&resolved),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
