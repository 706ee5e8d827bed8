//! Core shared types for tagtree.
//!
//! The scan engine and the scanner adapters only talk to each other through the
//! types and traits in this crate.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod pattern;

pub use pattern::{expand_tags, TAGS_GROUP, TAGS_PLACEHOLDER};

/// One marker occurrence reported by a scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    /// Absolute path of the file containing the marker.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column of the first matched byte.
    pub column: u32,
    /// The full text of the matched line.
    pub text: String,
}

impl Match {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32, text: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            text: text.into(),
        }
    }

    /// Presentation order: file path (compared as raw path bytes), then line.
    ///
    /// Column and text are ignored so that a stable sort keeps insertion order
    /// for markers sharing a line.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.file
            .as_os_str()
            .cmp(other.file.as_os_str())
            .then(self.line.cmp(&other.line))
    }
}

/// A pending unit of scan work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanUnit {
    /// Recursive scan rooted at the folder.
    Folder(PathBuf),
    /// Scan restricted to a single file.
    File(PathBuf),
}

impl ScanUnit {
    pub fn path(&self) -> &Path {
        match self {
            ScanUnit::Folder(path) | ScanUnit::File(path) => path,
        }
    }

    /// Whether results for `file` are produced by this unit.
    pub fn covers(&self, file: &Path) -> bool {
        match self {
            ScanUnit::Folder(root) => file.starts_with(root),
            ScanUnit::File(path) => file == path,
        }
    }
}

impl fmt::Display for ScanUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanUnit::Folder(path) => write!(f, "folder {}", path.display()),
            ScanUnit::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// The folder used as the recursive scan boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RootFolder {
    /// No workspace folder is active; only open documents are scanned.
    #[default]
    Unset,
    Path(PathBuf),
}

impl RootFolder {
    pub fn path(&self) -> Option<&Path> {
        match self {
            RootFolder::Unset => None,
            RootFolder::Path(path) => Some(path),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, RootFolder::Unset)
    }

    /// Whether `file` lies inside the root. Always false for [`RootFolder::Unset`].
    pub fn contains(&self, file: &Path) -> bool {
        self.path().is_some_and(|root| file.starts_with(root))
    }
}

impl From<Option<PathBuf>> for RootFolder {
    fn from(value: Option<PathBuf>) -> Self {
        value.map_or(RootFolder::Unset, RootFolder::Path)
    }
}

impl fmt::Display for RootFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootFolder::Unset => f.write_str("<no folder>"),
            RootFolder::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Match options handed to a [`Scanner`] for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Regular expression, already expanded (no `$TAGS` placeholder).
    pub pattern: String,
    /// Include/exclude globs in the scanner's own syntax.
    pub globs: Vec<String>,
    /// When set, only this file is scanned and the root is not recursed.
    pub restrict_to_file: Option<PathBuf>,
}

/// Effective configuration inputs of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanSettings {
    pub pattern: String,
    pub globs: Vec<String>,
    /// Explicitly configured scanner executable.
    pub scanner_path: Option<PathBuf>,
    /// Per-invocation timeout.
    pub timeout: Option<Duration>,
}

impl ScanSettings {
    pub fn options_for(&self, unit: &ScanUnit) -> ScanOptions {
        ScanOptions {
            pattern: self.pattern.clone(),
            globs: self.globs.clone(),
            restrict_to_file: match unit {
                ScanUnit::File(path) => Some(path.clone()),
                ScanUnit::Folder(_) => None,
            },
        }
    }

    /// Whether switching from `previous` to `self` changes what a scan would match.
    pub fn affects_matches(&self, previous: &ScanSettings) -> bool {
        self.pattern != previous.pattern
    }

    /// Whether switching from `previous` to `self` requires resolving the scanner again.
    pub fn affects_resolution(&self, previous: &ScanSettings) -> bool {
        self.scanner_path != previous.scanner_path || self.timeout != previous.timeout
    }
}

/// A single scanner invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", format_diagnostic(.diagnostic))]
pub struct ScanError {
    pub message: String,
    /// Extra detail captured from the scanner, usually its stderr.
    pub diagnostic: Option<String>,
}

impl ScanError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        self.diagnostic = (!diagnostic.trim().is_empty()).then_some(diagnostic);
        self
    }
}

fn format_diagnostic(diagnostic: &Option<String>) -> String {
    match diagnostic {
        Some(text) => format!(" ({})", text.trim()),
        None => String::new(),
    }
}

/// No usable scanner executable could be located.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to find {tool} - install it or set `{config_key}` to point to the executable")]
pub struct ResolutionError {
    pub tool: String,
    /// Configuration key that sets an explicit executable path.
    pub config_key: String,
    /// Every location that was checked, in priority order.
    pub searched: Vec<PathBuf>,
}

/// Runs one scan invocation against an external search tool.
#[async_trait]
pub trait Scanner: Send + Sync + fmt::Debug {
    /// Scan `root` (or only `options.restrict_to_file` when set).
    ///
    /// An empty result means "no markers found" and is not an error.
    async fn scan(&self, root: &Path, options: &ScanOptions) -> Result<Vec<Match>, ScanError>;
}

/// Produces a [`Scanner`] for the given settings, or explains why none is usable.
pub trait ScannerResolver: Send + Sync {
    fn resolve(&self, settings: &ScanSettings) -> Result<Arc<dyn Scanner>, ResolutionError>;
}
