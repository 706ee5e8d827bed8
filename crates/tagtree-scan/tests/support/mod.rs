#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tagtree_core::{
    Match, ResolutionError, RootFolder, ScanError, ScanOptions, ScanSettings, Scanner,
    ScannerResolver,
};
use tagtree_scan::{EngineError, Projection};
use tokio::sync::{mpsc, Semaphore};

/// One recorded scanner invocation: `(root, restrict_to_file)`.
pub type Call = (PathBuf, Option<PathBuf>);

/// In-memory file tree whose lines are matched by substring against each
/// `|`-separated alternative of the pattern.
#[derive(Debug, Default)]
pub struct FakeTree {
    files: Mutex<BTreeMap<PathBuf, Vec<String>>>,
    failing: Mutex<BTreeSet<PathBuf>>,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<Call>>,
}

impl FakeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every invocation waits for one permit and announces itself on the returned channel.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<Call>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        self.gate = Some(Arc::clone(&gate));
        self.started = Some(tx);
        (self, gate, rx)
    }

    pub fn write(&self, path: &str, lines: &[&str]) {
        self.files.lock().unwrap().insert(
            PathBuf::from(path),
            lines.iter().map(|line| line.to_string()).collect(),
        );
    }

    /// Scans rooted at or restricted to `path` fail.
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(PathBuf::from(path));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn collect(&self, root: &Path, options: &ScanOptions) -> Vec<Match> {
        let alternatives: Vec<&str> = options.pattern.split('|').collect();
        let files = self.files.lock().unwrap();
        let mut out = Vec::new();
        for (file, lines) in files.iter() {
            let in_scope = match &options.restrict_to_file {
                Some(only) => file == only,
                None => file.starts_with(root),
            };
            if !in_scope {
                continue;
            }
            for (idx, line) in lines.iter().enumerate() {
                let column = alternatives
                    .iter()
                    .filter(|alt| !alt.is_empty())
                    .filter_map(|alt| line.find(alt))
                    .min();
                if let Some(column) = column {
                    out.push(Match::new(
                        file.clone(),
                        idx as u32 + 1,
                        column as u32 + 1,
                        line.clone(),
                    ));
                }
            }
        }
        out
    }
}

#[async_trait]
impl Scanner for FakeTree {
    async fn scan(&self, root: &Path, options: &ScanOptions) -> Result<Vec<Match>, ScanError> {
        let call = (root.to_path_buf(), options.restrict_to_file.clone());
        self.calls.lock().unwrap().push(call.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        if let Some(started) = &self.started {
            let _ = started.send(call.clone());
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let target = call.1.clone().unwrap_or(call.0.clone());
        let result = if self.failing.lock().unwrap().contains(&target) {
            Err(ScanError::new("scanner exited with status 2").with_diagnostic("bad input"))
        } else {
            Ok(self.collect(root, options))
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Always hands out the same scanner.
pub struct FixedResolver {
    scanner: Arc<FakeTree>,
    pub resolved: AtomicUsize,
}

impl FixedResolver {
    pub fn new(scanner: Arc<FakeTree>) -> Arc<Self> {
        Arc::new(Self {
            scanner,
            resolved: AtomicUsize::new(0),
        })
    }
}

impl ScannerResolver for FixedResolver {
    fn resolve(&self, _settings: &ScanSettings) -> Result<Arc<dyn Scanner>, ResolutionError> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        let scanner: Arc<dyn Scanner> = self.scanner.clone();
        Ok(scanner)
    }
}

/// Never finds a scanner.
#[derive(Default)]
pub struct MissingResolver {
    pub attempts: AtomicUsize,
}

impl ScannerResolver for MissingResolver {
    fn resolve(&self, _settings: &ScanSettings) -> Result<Arc<dyn Scanner>, ResolutionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ResolutionError {
            tool: "rg".to_string(),
            config_key: "scan.ripgrep".to_string(),
            searched: vec![PathBuf::from("/usr/bin/rg")],
        })
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub started: Vec<RootFolder>,
    pub projections: Vec<(RootFolder, Vec<Match>)>,
    pub reports: Vec<EngineError>,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(pub Arc<Mutex<Recorded>>);

impl Recorder {
    pub fn projections(&self) -> Vec<(RootFolder, Vec<Match>)> {
        self.0.lock().unwrap().projections.clone()
    }

    pub fn reports(&self) -> Vec<EngineError> {
        self.0.lock().unwrap().reports.clone()
    }

    pub fn started(&self) -> Vec<RootFolder> {
        self.0.lock().unwrap().started.clone()
    }
}

impl Projection for Recorder {
    fn scan_started(&mut self, root: &RootFolder) {
        self.0.lock().unwrap().started.push(root.clone());
    }

    fn project(&mut self, root: &RootFolder, matches: &[Match]) {
        self.0
            .lock()
            .unwrap()
            .projections
            .push((root.clone(), matches.to_vec()));
    }

    fn report(&mut self, error: &EngineError) {
        self.0.lock().unwrap().reports.push(error.clone());
    }
}

pub fn settings(pattern: &str) -> ScanSettings {
    ScanSettings {
        pattern: pattern.to_string(),
        ..ScanSettings::default()
    }
}

pub fn root(path: &str) -> RootFolder {
    RootFolder::Path(PathBuf::from(path))
}

pub fn keys(matches: &[Match]) -> Vec<(PathBuf, u32)> {
    matches.iter().map(|m| (m.file.clone(), m.line)).collect()
}

pub fn key(path: &str, line: u32) -> (PathBuf, u32) {
    (PathBuf::from(path), line)
}
