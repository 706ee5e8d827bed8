//! ripgrep integration: argument formatting, output parsing and executable
//! resolution behind the [`tagtree_core::Scanner`] seam.

mod locate;
mod parse;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tagtree_core::{
    Match, ResolutionError, ScanError, ScanOptions, ScanSettings, Scanner, ScannerResolver,
};
use tagtree_process::{run_command, CommandSpec, RunOptions};

pub use locate::{exe_name, RipgrepLocator, RIPGREP_CONFIG_KEY};
pub use parse::{parse_vimgrep_line, parse_vimgrep_output};

/// ripgrep's exit code when the search ran fine but found nothing.
const EXIT_NO_MATCHES: i32 = 1;

/// Runs `rg --vimgrep` and turns its output into [`Match`]es.
#[derive(Debug, Clone)]
pub struct RipgrepScanner {
    program: PathBuf,
    run_options: RunOptions,
}

impl RipgrepScanner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            run_options: RunOptions::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_options.timeout = timeout;
        self
    }

    /// Cap on captured stdout/stderr bytes; a scan whose output exceeds it fails.
    pub fn with_max_output_bytes(mut self, max_bytes: usize) -> Self {
        self.run_options.max_bytes = max_bytes;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for one invocation, without the program itself.
    ///
    /// `--null` ends each path with a NUL byte so paths containing `:` parse
    /// unambiguously.
    pub fn build_args(target: &Path, options: &ScanOptions) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-messages",
            "--vimgrep",
            "--null",
            "-H",
            "--column",
            "--line-number",
            "--color",
            "never",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        args.push("-e".to_owned());
        args.push(options.pattern.clone());
        for glob in &options.globs {
            args.push("-g".to_owned());
            args.push(glob.clone());
        }
        args.push(target.to_string_lossy().into_owned());
        args
    }
}

/// The path handed to ripgrep and the directory it runs in.
fn target_and_cwd(root: &Path, options: &ScanOptions) -> (PathBuf, PathBuf) {
    match &options.restrict_to_file {
        Some(file) => {
            let cwd = file
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(root);
            (file.clone(), cwd.to_path_buf())
        }
        None => (root.to_path_buf(), root.to_path_buf()),
    }
}

#[async_trait]
impl Scanner for RipgrepScanner {
    async fn scan(&self, root: &Path, options: &ScanOptions) -> Result<Vec<Match>, ScanError> {
        let (target, cwd) = target_and_cwd(root, options);
        let args = Self::build_args(&target, options);
        let command = CommandSpec::new(&cwd, &self.program, &args);

        let result = run_command(&cwd, &self.program, &args, self.run_options.clone())
            .await
            .map_err(|err| ScanError::new(format!("failed to run `{command}`: {err}")))?;

        if result.timed_out {
            return Err(ScanError::new(format!("`{command}` timed out"))
                .with_diagnostic(result.output.stderr));
        }

        match result.code() {
            Some(0) | Some(EXIT_NO_MATCHES) => {}
            _ => {
                return Err(
                    ScanError::new(format!("`{command}` exited with {}", result.status))
                        .with_diagnostic(result.output.stderr),
                );
            }
        }

        if result.output.truncated {
            return Err(ScanError::new(format!(
                "`{command}` printed more than {} bytes; refusing partial results",
                self.run_options.max_bytes
            ))
            .with_diagnostic(
                "narrow the search with `scan.globs` or a more specific `scan.regex`",
            ));
        }

        let matches = parse_vimgrep_output(&result.output.stdout, &cwd);
        tracing::debug!(
            target: "tagtree.rg",
            target_path = %target.display(),
            matches = matches.len(),
            "ripgrep scan finished"
        );
        Ok(matches)
    }
}

/// Resolves a [`RipgrepScanner`] through a [`RipgrepLocator`].
///
/// The explicitly configured path comes from [`ScanSettings::scanner_path`];
/// the other search locations come from the base locator.
#[derive(Debug, Clone, Default)]
pub struct RipgrepResolver {
    base: RipgrepLocator,
}

impl RipgrepResolver {
    pub fn new(base: RipgrepLocator) -> Self {
        Self { base }
    }
}

impl ScannerResolver for RipgrepResolver {
    fn resolve(&self, settings: &ScanSettings) -> Result<Arc<dyn Scanner>, ResolutionError> {
        let program = self
            .base
            .clone()
            .with_configured(settings.scanner_path.clone())
            .locate_or_error()?;
        tracing::info!(target: "tagtree.rg", program = %program.display(), "using ripgrep");
        Ok(Arc::new(
            RipgrepScanner::new(program).with_timeout(settings.timeout),
        ))
    }
}
