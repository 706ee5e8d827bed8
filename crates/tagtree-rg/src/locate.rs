use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use tagtree_core::ResolutionError;

/// Configuration key that points at an explicit ripgrep executable.
pub const RIPGREP_CONFIG_KEY: &str = "scan.ripgrep";

/// Platform-specific ripgrep executable name.
pub fn exe_name() -> &'static str {
    if cfg!(windows) {
        "rg.exe"
    } else {
        "rg"
    }
}

/// Finds the ripgrep executable.
///
/// Search order:
/// 1) the explicitly configured path
/// 2) bundled locations next to the running executable
/// 3) directories on `PATH`
///
/// The first candidate that exists as a file wins.
#[derive(Debug, Clone)]
pub struct RipgrepLocator {
    configured: Option<PathBuf>,
    bundled_dirs: Vec<PathBuf>,
    search_path: Option<OsString>,
}

impl Default for RipgrepLocator {
    fn default() -> Self {
        Self {
            configured: None,
            bundled_dirs: default_bundled_dirs(),
            search_path: env::var_os("PATH"),
        }
    }
}

impl RipgrepLocator {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            ..Self::default()
        }
    }

    pub fn with_configured(mut self, configured: Option<PathBuf>) -> Self {
        self.configured = configured;
        self
    }

    pub fn with_bundled_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.bundled_dirs = dirs;
        self
    }

    /// Override the `PATH`-style directory list; `None` disables the `PATH` lookup.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Every location checked by [`RipgrepLocator::locate`], in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(configured) = &self.configured {
            out.push(configured.clone());
        }
        out.extend(self.bundled_dirs.iter().map(|dir| dir.join(exe_name())));
        if let Some(search_path) = &self.search_path {
            out.extend(env::split_paths(search_path).map(|dir| dir.join(exe_name())));
        }
        out
    }

    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }

    pub fn locate_or_error(&self) -> Result<PathBuf, ResolutionError> {
        let candidates = self.candidates();
        if let Some(found) = candidates.iter().find(|path| path.is_file()) {
            return Ok(found.clone());
        }

        Err(ResolutionError {
            tool: "ripgrep".to_string(),
            config_key: RIPGREP_CONFIG_KEY.to_string(),
            searched: candidates,
        })
    }
}

fn default_bundled_dirs() -> Vec<PathBuf> {
    let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
    else {
        return Vec::new();
    };

    vec![
        exe_dir.clone(),
        exe_dir.join("../lib/tagtree/bin"),
        exe_dir.join("../libexec/tagtree"),
    ]
}
