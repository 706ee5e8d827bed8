//! Configuration loading for tagtree (`tagtree.toml`) and tracing setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use tagtree_core::{expand_tags, ScanSettings, TAGS_GROUP};
use thiserror::Error;

mod diagnostics;
mod logging;
mod validation;

pub use diagnostics::{ConfigDiagnostics, ConfigWarning};
pub use logging::init_tracing;
pub use validation::ConfigValidationContext;

/// Top-level `tagtree.toml` schema.
///
/// ```toml
/// [scan]
/// regex = "($TAGS)"
/// tags = ["TODO", "FIXME"]
/// globs = ["!target"]
///
/// [view]
/// flat = true
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagtreeConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Pattern template. `($TAGS)` is replaced with the `|`-joined tag list.
    #[serde(default = "ScanConfig::default_regex")]
    pub regex: String,
    #[serde(default = "ScanConfig::default_tags")]
    pub tags: Vec<String>,
    /// ripgrep `-g` globs, e.g. `!target` to exclude a directory.
    #[serde(default)]
    pub globs: Vec<String>,
    /// Explicit ripgrep executable. Relative paths resolve against the config file.
    #[serde(default)]
    pub ripgrep: Option<PathBuf>,
    /// Scan this folder instead of the workspace root.
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    /// Per-invocation timeout. Unset or `0` means scans may run indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ScanConfig {
    fn default_regex() -> String {
        TAGS_GROUP.to_owned()
    }

    fn default_tags() -> Vec<String> {
        vec!["TODO".to_owned(), "FIXME".to_owned()]
    }

    /// The effective regular expression with tags substituted.
    pub fn pattern(&self) -> String {
        expand_tags(&self.regex, &self.tags)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            regex: Self::default_regex(),
            tags: Self::default_tags(),
            globs: Vec::new(),
            ripgrep: None,
            root_folder: None,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Show a flat list of files instead of a folder tree.
    #[serde(default)]
    pub flat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file. If it cannot be opened, file logging is skipped.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            "off" => "off".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level merged with `RUST_LOG`, if set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl TagtreeConfig {
    /// Load a config file from TOML. Relative paths resolve against the file's directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let (config, _) = Self::load_from_path_with_diagnostics(path)?;
        Ok(config)
    }

    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = read_config(path)?;
        let ctx = ConfigValidationContext {
            workspace_root: None,
            config_dir: path.parent(),
        };
        Self::load_from_str_with_diagnostics_inner(&text, ctx)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        Self::load_from_str_with_diagnostics_inner(text, ConfigValidationContext::default())
    }

    fn load_from_str_with_diagnostics_inner(
        text: &str,
        ctx: ConfigValidationContext<'_>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (mut config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<TagtreeConfig>(text)?;
        config.resolve_paths(ctx);

        let diagnostics = ConfigDiagnostics {
            unknown_keys,
            warnings: config.validate_with_context(ctx),
        };
        for warning in &diagnostics.warnings {
            tracing::warn!(target: "tagtree.config", %warning, "config warning");
        }
        for key in &diagnostics.unknown_keys {
            tracing::debug!(target: "tagtree.config", key = %key, "ignoring unknown config key");
        }

        Ok((config, diagnostics))
    }

    fn resolve_paths(&mut self, ctx: ConfigValidationContext<'_>) {
        if let Some(ripgrep) = self.scan.ripgrep.as_mut() {
            *ripgrep = ctx.resolve(ripgrep);
        }
        if let Some(root) = self.scan.root_folder.as_mut() {
            *root = ctx.resolve(root);
        }
    }

    /// Inputs the scan engine compares to decide between a rescan and a re-projection.
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            pattern: self.scan.pattern(),
            globs: self.scan.globs.clone(),
            scanner_path: self.scan.ripgrep.clone(),
            timeout: self.scan.timeout(),
        }
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub const TAGTREE_CONFIG_ENV_VAR: &str = "TAGTREE_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that set [`TAGTREE_CONFIG_ENV_VAR`] must wrap the mutation and the discovery
/// in this so concurrent discovery does not observe the override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `TAGTREE_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `tagtree.toml` in `workspace_root`
/// 3) `.tagtree.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(TAGTREE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["tagtree.toml", ".tagtree.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`TagtreeConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(TagtreeConfig, Option<PathBuf>), ConfigError> {
    let (config, path, _) = load_for_workspace_with_diagnostics(workspace_root)?;
    Ok((config, path))
}

pub fn load_for_workspace_with_diagnostics(
    workspace_root: &Path,
) -> Result<(TagtreeConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((
            TagtreeConfig::default(),
            None,
            ConfigDiagnostics::default(),
        ));
    };

    let text = read_config(&path)?;
    let ctx = ConfigValidationContext {
        workspace_root: Some(workspace_root),
        config_dir: path.parent(),
    };
    let (config, diagnostics) = TagtreeConfig::load_from_str_with_diagnostics_inner(&text, ctx)?;
    tracing::debug!(target: "tagtree.config", path = %path.display(), "loaded config");
    Ok((config, Some(path), diagnostics))
}

/// Reload the configuration for a workspace root and report whether it changed.
pub fn reload_for_workspace(
    workspace_root: &Path,
    previous: &TagtreeConfig,
    previous_path: Option<&Path>,
) -> Result<(TagtreeConfig, Option<PathBuf>, bool), ConfigError> {
    let (config, path) = load_for_workspace(workspace_root)?;
    let changed = path.as_deref() != previous_path || &config != previous;
    Ok((config, path, changed))
}
