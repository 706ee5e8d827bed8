//! Building blocks of the `tagtree` binary.

pub mod view;

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tagtree_core::{Match, RootFolder};
use tagtree_scan::{EngineError, Projection};
use thiserror::Error;

use crate::view::View;

/// One line of `tagtree watch` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Refresh,
    Save(PathBuf),
    Close(PathBuf),
    Open(PathBuf),
    Active(Option<PathBuf>),
    Config,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchParseError {
    #[error("unknown command `{0}` (expected refresh, save, close, open, active, config or quit)")]
    Unknown(String),
    #[error("`{0}` needs a file argument")]
    MissingPath(&'static str),
}

impl WatchCommand {
    /// Parse a line. Blank lines and `#` comments yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, WatchParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let path = |name: &'static str| {
            if rest.is_empty() {
                Err(WatchParseError::MissingPath(name))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        let command = match verb {
            "refresh" => WatchCommand::Refresh,
            "save" => WatchCommand::Save(path("save")?),
            "close" => WatchCommand::Close(path("close")?),
            "open" => WatchCommand::Open(path("open")?),
            "active" => WatchCommand::Active((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "config" => WatchCommand::Config,
            "quit" | "exit" => WatchCommand::Quit,
            other => return Err(WatchParseError::Unknown(other.to_owned())),
        };
        Ok(Some(command))
    }
}

/// Make `path` absolute against `base` without touching the filesystem.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Drop `.` and resolve `..` against the preceding component, without touching
/// the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The key a user-supplied path is tracked under.
///
/// Existing paths are canonicalized so they match what the scanner reports for the
/// (canonical) workspace. A path that no longer exists keeps its canonical parent
/// where possible.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let path = normalize_lexically(&absolutize(base, path));
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => path,
        },
        _ => path,
    }
}

/// Failures surfaced by the engine, shared between the projection and `main`.
#[derive(Debug, Default)]
pub struct RunStatus {
    resolution_failed: AtomicBool,
    scan_failures: AtomicUsize,
}

impl RunStatus {
    pub fn resolution_failed(&self) -> bool {
        self.resolution_failed.load(Ordering::SeqCst)
    }

    pub fn scan_failures(&self) -> usize {
        self.scan_failures.load(Ordering::SeqCst)
    }

    /// 2 when no scanner could be found, 1 when any scan failed, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.resolution_failed() {
            2
        } else if self.scan_failures() > 0 {
            1
        } else {
            0
        }
    }

    fn record(&self, error: &EngineError) {
        match error {
            EngineError::Resolution(_) => self.resolution_failed.store(true, Ordering::SeqCst),
            EngineError::Adapter { .. } => {
                self.scan_failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Prints every projection to stdout and failures to stderr.
#[derive(Debug, Clone)]
pub struct PrintProjection {
    json: bool,
    flat: Arc<AtomicBool>,
    status: Arc<RunStatus>,
}

impl PrintProjection {
    /// `flat` is shared so a configuration reload can switch the layout.
    pub fn new(json: bool, flat: Arc<AtomicBool>, status: Arc<RunStatus>) -> Self {
        Self { json, flat, status }
    }

    pub fn render(&self, root: &RootFolder, matches: &[Match]) -> String {
        let view = View::build(root, matches, self.flat.load(Ordering::SeqCst));
        if self.json {
            match serde_json::to_string_pretty(&view) {
                Ok(json) => json + "\n",
                Err(err) => {
                    tracing::error!(target: "tagtree.cli", error = %err, "failed to serialize view");
                    String::new()
                }
            }
        } else {
            view.render_text()
        }
    }
}

impl Projection for PrintProjection {
    fn scan_started(&mut self, root: &RootFolder) {
        tracing::info!(target: "tagtree.cli", root = %root, "scanning");
    }

    fn project(&mut self, root: &RootFolder, matches: &[Match]) {
        print!("{}", self.render(root, matches));
    }

    fn report(&mut self, error: &EngineError) {
        self.status.record(error);
        match error {
            EngineError::Resolution(_) => eprintln!("error: {error}"),
            EngineError::Adapter { .. } => eprintln!("warning: {error}"),
        }
    }
}
