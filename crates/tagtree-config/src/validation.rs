use std::path::{Path, PathBuf};

use tagtree_core::TAGS_GROUP;

use crate::{ConfigWarning, LoggingConfig, TagtreeConfig};

/// Filesystem context used to resolve relative paths while validating.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidationContext<'a> {
    pub workspace_root: Option<&'a Path>,
    /// Directory of the config file; relative paths in the file resolve against it.
    pub config_dir: Option<&'a Path>,
}

impl ConfigValidationContext<'_> {
    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_dir.or(self.workspace_root) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}

impl TagtreeConfig {
    pub fn validate_with_context(&self, ctx: ConfigValidationContext<'_>) -> Vec<ConfigWarning> {
        let mut out = Vec::new();
        let scan = &self.scan;

        if scan.regex.contains(TAGS_GROUP) && scan.tags.is_empty() {
            out.push(ConfigWarning::EmptyTags);
        }

        let pattern = scan.pattern();
        if let Err(err) = regex::Regex::new(&pattern) {
            out.push(ConfigWarning::InvalidRegex {
                pattern,
                message: err.to_string(),
            });
        }

        if let Some(ripgrep) = &scan.ripgrep {
            let resolved = ctx.resolve(ripgrep);
            if !resolved.is_file() {
                out.push(ConfigWarning::RipgrepPathMissing { resolved });
            }
        }

        let directives = LoggingConfig::normalize_level_directives(&self.logging.level);
        if tracing_subscriber::EnvFilter::try_new(&directives).is_err() {
            out.push(ConfigWarning::LoggingLevelInvalid {
                value: self.logging.level.clone(),
            });
        }

        out
    }
}
