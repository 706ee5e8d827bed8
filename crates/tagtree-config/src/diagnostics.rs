use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Diagnostics produced while loading and validating a tagtree config.
///
/// Loading is best effort: callers always get a config when deserialization succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiagnostics {
    /// Keys present in the TOML that the schema does not recognize (`scan.tagz`).
    pub unknown_keys: Vec<String>,
    pub warnings: Vec<ConfigWarning>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The expanded scan pattern does not compile.
    InvalidRegex { pattern: String, message: String },
    /// The template uses `($TAGS)` but no tags are configured.
    EmptyTags,
    /// `scan.ripgrep` points at a file that does not exist.
    RipgrepPathMissing { resolved: PathBuf },
    LoggingLevelInvalid { value: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidRegex { pattern, message } => {
                write!(f, "scan.regex: pattern `{pattern}` is not a valid regex: {message}")
            }
            ConfigWarning::EmptyTags => {
                f.write_str("scan.tags: list is empty but scan.regex contains ($TAGS)")
            }
            ConfigWarning::RipgrepPathMissing { resolved } => {
                write!(f, "scan.ripgrep: {} does not exist", resolved.display())
            }
            ConfigWarning::LoggingLevelInvalid { value } => {
                write!(f, "logging.level: `{value}` is not a valid filter directive")
            }
        }
    }
}

pub(crate) fn deserialize_toml_with_unknown_keys<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut unknown = Vec::<String>::new();
    let deserializer = toml::de::Deserializer::new(text);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(normalize_serde_ignored_path(path));
    })?;
    unknown.sort();
    unknown.dedup();
    Ok((value, unknown))
}

fn normalize_serde_ignored_path(path: serde_ignored::Path) -> String {
    // Root paths render with a leading `.`; sequence indices render as `.0`.
    let raw = path.to_string();
    let raw = raw.trim_start_matches('.');
    raw.split('.')
        .enumerate()
        .fold(String::new(), |mut out, (idx, segment)| {
            let is_index =
                idx > 0 && !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
            if is_index {
                out.push('[');
                out.push_str(segment);
                out.push(']');
                return out;
            }

            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
            out
        })
}
