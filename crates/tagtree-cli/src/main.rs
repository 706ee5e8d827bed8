use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tagtree_cli::{resolve_path, PrintProjection, RunStatus, WatchCommand};
use tagtree_config::{load_for_workspace_with_diagnostics, reload_for_workspace, TagtreeConfig};
use tagtree_core::{RootFolder, ScannerResolver};
use tagtree_rg::RipgrepResolver;
use tagtree_scan::planner::full_scan_units;
use tagtree_scan::{
    EngineError, Executor, Projection, ResultAggregate, ScanEngine, ScanHandle, ScanQueue,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "tagtree", version, about = "Find TODO/FIXME-style markers with ripgrep")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan once and print every marker
    Scan(ScanArgs),
    /// Read triggers (refresh, save, close, open, active, config, quit) from stdin and
    /// print the markers after every scan
    Watch(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Workspace folder (defaults to current directory)
    path: Option<PathBuf>,
    /// Emit JSON
    #[arg(long)]
    json: bool,
    /// List files instead of a folder tree
    #[arg(long)]
    flat: bool,
    /// ripgrep executable to use
    #[arg(long, value_name = "PATH")]
    rg: Option<PathBuf>,
    /// Pattern template; `($TAGS)` expands to the tag list
    #[arg(long)]
    regex: Option<String>,
    /// Marker tag (repeatable); replaces the configured tags
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,
    /// ripgrep glob (repeatable), e.g. `!target`
    #[arg(long = "glob", value_name = "GLOB")]
    globs: Vec<String>,
    /// Treat FILE as an open document (repeatable)
    #[arg(long = "open", value_name = "FILE")]
    open: Vec<PathBuf>,
    /// Per-invocation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl ScanArgs {
    fn apply_overrides(&self, config: &mut TagtreeConfig) {
        if let Some(rg) = &self.rg {
            config.scan.ripgrep = Some(rg.clone());
        }
        if let Some(regex) = &self.regex {
            config.scan.regex = regex.clone();
        }
        if !self.tags.is_empty() {
            config.scan.tags = self.tags.clone();
        }
        config.scan.globs.extend(self.globs.iter().cloned());
        if self.timeout_ms.is_some() {
            config.scan.timeout_ms = self.timeout_ms;
        }
        if self.flat {
            config.view.flat = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    match cli.command {
        Command::Scan(args) => runtime.block_on(scan(args)),
        Command::Watch(args) => runtime.block_on(watch(args)),
    }
}

/// Workspace, configuration and open documents resolved from the command line.
struct Setup {
    cwd: PathBuf,
    workspace: PathBuf,
    /// Config as loaded from disk, before command-line overrides.
    file_config: TagtreeConfig,
    config_path: Option<PathBuf>,
    /// Effective config with overrides applied.
    config: TagtreeConfig,
    root: RootFolder,
    /// `scan.root_folder` was configured, so editor focus never moves the root.
    root_pinned: bool,
    open: BTreeSet<PathBuf>,
}

impl Setup {
    fn load(args: &ScanArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let requested = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
        let workspace = cwd
            .join(&requested)
            .canonicalize()
            .with_context(|| format!("failed to open workspace {}", requested.display()))?;

        let (file_config, config_path, diagnostics) =
            load_for_workspace_with_diagnostics(&workspace)
                .with_context(|| format!("failed to load config for {}", workspace.display()))?;
        let mut config = file_config.clone();
        args.apply_overrides(&mut config);
        tagtree_config::init_tracing(&config.logging);
        for warning in &diagnostics.warnings {
            eprintln!("warning: {warning}");
        }

        let root_pinned = config.scan.root_folder.is_some();
        let root = match &config.scan.root_folder {
            Some(folder) => resolve_path(&workspace, folder),
            None => workspace.clone(),
        };
        let open = args.open.iter().map(|doc| resolve_path(&cwd, doc)).collect();

        Ok(Self {
            cwd,
            workspace,
            file_config,
            config_path,
            config,
            root: RootFolder::Path(root),
            root_pinned,
            open,
        })
    }
}

async fn scan(args: ScanArgs) -> Result<i32> {
    let setup = Setup::load(&args)?;
    let status = Arc::new(RunStatus::default());
    let flat = Arc::new(AtomicBool::new(setup.config.view.flat));
    let mut projection = PrintProjection::new(args.json, flat, Arc::clone(&status));

    let settings = setup.config.scan_settings();
    match RipgrepResolver::default().resolve(&settings) {
        Ok(scanner) => {
            let mut queue = ScanQueue::new();
            queue.replace(full_scan_units(&setup.root, &setup.open));
            let mut aggregate = ResultAggregate::new();
            projection.scan_started(&setup.root);
            Executor::new(scanner, settings)
                .drain(&mut queue, &mut aggregate, &setup.root, &mut projection)
                .await;
        }
        Err(err) => projection.report(&EngineError::Resolution(err)),
    }

    Ok(status.exit_code())
}

/// A running engine plus the configuration it was started from.
struct Session {
    cwd: PathBuf,
    workspace: PathBuf,
    file_config: TagtreeConfig,
    config_path: Option<PathBuf>,
    flat: Arc<AtomicBool>,
    status: Arc<RunStatus>,
    handle: ScanHandle,
    join: JoinHandle<()>,
}

impl Session {
    fn start(args: &ScanArgs) -> Result<Self> {
        let setup = Setup::load(args)?;
        let flat = Arc::new(AtomicBool::new(setup.config.view.flat));
        let status = Arc::new(RunStatus::default());
        let projection = PrintProjection::new(args.json, Arc::clone(&flat), Arc::clone(&status));
        let (engine, handle) = ScanEngine::new(
            setup.root,
            setup.config.scan_settings(),
            Arc::new(RipgrepResolver::default()),
            Box::new(projection),
        );
        let join = tokio::spawn(engine.with_pinned_root(setup.root_pinned).run());

        for doc in &setup.open {
            handle.document_opened(doc.clone());
        }

        Ok(Self {
            cwd: setup.cwd,
            workspace: setup.workspace,
            file_config: setup.file_config,
            config_path: setup.config_path,
            flat,
            status,
            handle,
            join,
        })
    }

    fn path(&self, path: &Path) -> PathBuf {
        resolve_path(&self.cwd, path)
    }

    fn reload_config(&mut self, args: &ScanArgs) -> Result<()> {
        let (file_config, config_path, changed) = reload_for_workspace(
            &self.workspace,
            &self.file_config,
            self.config_path.as_deref(),
        )
        .context("failed to reload config")?;
        if !changed {
            tracing::debug!(target: "tagtree.cli", "config unchanged");
            return Ok(());
        }

        let mut config = file_config.clone();
        args.apply_overrides(&mut config);
        self.flat.store(config.view.flat, Ordering::SeqCst);
        self.handle.configuration_changed(config.scan_settings());
        self.file_config = file_config;
        self.config_path = config_path;
        Ok(())
    }

    /// Drain outstanding work and stop the engine.
    async fn finish(self) -> Result<i32> {
        self.handle.wait_idle().await;
        self.handle.shutdown();
        self.join.await.context("scan engine panicked")?;
        Ok(self.status.exit_code())
    }
}

async fn watch(args: ScanArgs) -> Result<i32> {
    let mut session = Session::start(&args)?;
    session.handle.startup();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match WatchCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };

        match command {
            WatchCommand::Refresh => session.handle.full_refresh(),
            WatchCommand::Save(path) => session.handle.file_saved(session.path(&path)),
            WatchCommand::Close(path) => session.handle.file_closed(session.path(&path)),
            WatchCommand::Open(path) => session.handle.document_opened(session.path(&path)),
            WatchCommand::Active(dir) => session
                .handle
                .active_context_changed(dir.map(|dir| session.path(&dir))),
            WatchCommand::Config => session.reload_config(&args)?,
            WatchCommand::Quit => break,
        }
    }

    session.finish().await
}
