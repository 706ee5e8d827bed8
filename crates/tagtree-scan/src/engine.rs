//! The scan engine actor.
//!
//! A single task owns every piece of mutable state (results, queue, open documents,
//! root folder). Triggers arrive over a channel through [`ScanHandle`], so they are
//! serialized with respect to each other and to result application. At most one
//! scanner invocation is in flight; the next unit starts only after the previous
//! result has been applied.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tagtree_core::{Match, RootFolder, ScanError, ScanSettings, ScanUnit, ScannerResolver};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use crate::executor::{apply_outcome, flatten_join, InFlight, UnitOutcome};
use crate::planner::{plan, Plan, PlanContext, Trigger};
use crate::{EngineError, Executor, Projection, ResultAggregate, ScanQueue};

#[derive(Debug)]
enum Command {
    Trigger(Trigger),
    DocumentOpened(PathBuf),
    ConfigurationChanged(ScanSettings),
    Snapshot(oneshot::Sender<Vec<Match>>),
    WaitIdle(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable entry point for triggers. Sends never block.
///
/// Once the engine has stopped, triggers are dropped and queries return `None`/`false`.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ScanHandle {
    pub fn startup(&self) {
        self.trigger(Trigger::Startup);
    }

    pub fn full_refresh(&self) {
        self.trigger(Trigger::FullRefresh);
    }

    pub fn configuration_changed(&self, settings: ScanSettings) {
        self.send(Command::ConfigurationChanged(settings));
    }

    pub fn file_saved(&self, path: impl Into<PathBuf>) {
        self.trigger(Trigger::FileSaved(path.into()));
    }

    pub fn file_closed(&self, path: impl Into<PathBuf>) {
        self.trigger(Trigger::FileClosed(path.into()));
    }

    /// Track an open document. Does not scan by itself.
    pub fn document_opened(&self, path: impl Into<PathBuf>) {
        self.send(Command::DocumentOpened(path.into()));
    }

    /// The focused document changed; `workspace` is its workspace folder, if any.
    pub fn active_context_changed(&self, workspace: Option<PathBuf>) {
        self.trigger(Trigger::ActiveEditorChanged { workspace });
    }

    pub fn trigger(&self, trigger: Trigger) {
        self.send(Command::Trigger(trigger));
    }

    /// Current results in presentation order.
    pub async fn snapshot(&self) -> Option<Vec<Match>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.ok()
    }

    /// Resolves once the queue is empty, nothing is in flight and the results
    /// have been projected. Returns `false` if the engine stopped first.
    pub async fn wait_idle(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.send(Command::WaitIdle(tx));
        rx.await.is_ok()
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!(target: "tagtree.scan", "scan engine stopped; dropping command");
        }
    }
}

struct Running {
    generation: u64,
    inner: InFlight,
}

enum Step {
    Command(Option<Command>),
    Finished(Result<Result<Vec<Match>, ScanError>, JoinError>),
}

pub struct ScanEngine {
    commands: mpsc::UnboundedReceiver<Command>,
    projection: Box<dyn Projection>,
    resolver: Arc<dyn ScannerResolver>,
    settings: ScanSettings,
    executor: Option<Executor>,
    resolution_reported: bool,

    root: RootFolder,
    root_pinned: bool,
    last_scanned_root: Option<RootFolder>,
    open_documents: BTreeSet<PathBuf>,

    aggregate: ResultAggregate,
    queue: ScanQueue,
    /// Bumped by every full scan; results from older generations are discarded.
    generation: u64,
    in_flight: Option<Running>,
    projection_pending: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl ScanEngine {
    pub fn new(
        root: RootFolder,
        settings: ScanSettings,
        resolver: Arc<dyn ScannerResolver>,
        projection: Box<dyn Projection>,
    ) -> (Self, ScanHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let engine = Self {
            commands,
            projection,
            resolver,
            settings,
            executor: None,
            resolution_reported: false,
            root,
            root_pinned: false,
            last_scanned_root: None,
            open_documents: BTreeSet::new(),
            aggregate: ResultAggregate::new(),
            queue: ScanQueue::new(),
            generation: 0,
            in_flight: None,
            projection_pending: false,
            idle_waiters: Vec::new(),
        };
        (engine, ScanHandle { tx })
    }

    /// Keep the initial root even when the active editor moves to another workspace.
    pub fn with_pinned_root(mut self, pinned: bool) -> Self {
        self.root_pinned = pinned;
        self
    }

    /// Build the engine and run it on a new task.
    pub fn spawn(
        root: RootFolder,
        settings: ScanSettings,
        resolver: Arc<dyn ScannerResolver>,
        projection: Box<dyn Projection>,
    ) -> (ScanHandle, JoinHandle<()>) {
        let (engine, handle) = Self::new(root, settings, resolver, projection);
        (handle, tokio::spawn(engine.run()))
    }

    /// Process commands until [`ScanHandle::shutdown`] or every handle is dropped.
    pub async fn run(mut self) {
        loop {
            self.advance();

            let step = match self.in_flight.as_mut() {
                Some(running) => {
                    tokio::select! {
                        biased;
                        command = self.commands.recv() => Step::Command(command),
                        joined = &mut running.inner.task => Step::Finished(joined),
                    }
                }
                None => Step::Command(self.commands.recv().await),
            };

            match step {
                Step::Command(None) | Step::Command(Some(Command::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle(command),
                Step::Finished(joined) => {
                    if let Some(running) = self.in_flight.take() {
                        self.finish(running.generation, running.inner.unit, joined);
                    }
                }
            }
        }

        if let Some(running) = self.in_flight.take() {
            running.inner.abort();
        }
        tracing::debug!(target: "tagtree.scan", "scan engine stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Trigger(trigger) => self.apply_trigger(trigger),
            Command::DocumentOpened(path) => {
                self.open_documents.insert(path);
            }
            Command::ConfigurationChanged(settings) => self.apply_settings(settings),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.aggregate.sorted_view());
            }
            Command::WaitIdle(reply) => {
                if self.is_idle() {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn apply_settings(&mut self, settings: ScanSettings) {
        let affects_matches = settings.affects_matches(&self.settings);
        if settings.affects_resolution(&self.settings) {
            self.executor = None;
            self.resolution_reported = false;
        } else if let Some(executor) = self.executor.as_mut() {
            executor.set_settings(settings.clone());
        }
        self.settings = settings;
        self.apply_trigger(Trigger::ConfigChanged { affects_matches });
    }

    fn apply_trigger(&mut self, trigger: Trigger) {
        if let Trigger::FileClosed(path) = &trigger {
            self.open_documents.remove(path);
        }

        let plan = plan(
            &trigger,
            &PlanContext {
                root: &self.root,
                root_pinned: self.root_pinned,
                last_scanned_root: self.last_scanned_root.as_ref(),
                open_documents: &self.open_documents,
            },
        );
        tracing::trace!(target: "tagtree.scan", ?trigger, ?plan, "planned trigger");

        match plan {
            Plan::Nothing => {}
            Plan::Reproject => self.projection_pending = true,
            Plan::FullScan { root, units } => {
                self.root = root;
                if !self.ensure_executor() {
                    return;
                }
                self.generation += 1;
                self.aggregate.clear();
                tracing::info!(
                    target: "tagtree.scan",
                    root = %self.root,
                    units = units.len(),
                    generation = self.generation,
                    "starting full scan"
                );
                self.queue.replace(units);
                self.last_scanned_root = Some(self.root.clone());
                self.projection.scan_started(&self.root);
                self.projection_pending = true;
            }
            Plan::Rescan { file } => {
                if !self.ensure_executor() {
                    return;
                }
                self.aggregate.remove_file(&file);
                self.queue.push(ScanUnit::File(file));
                self.projection_pending = true;
            }
        }
    }

    /// Resolve the scanner if needed. A failure is reported once until the
    /// configuration changes how the scanner is found.
    fn ensure_executor(&mut self) -> bool {
        if self.executor.is_some() {
            return true;
        }
        match self.resolver.resolve(&self.settings) {
            Ok(scanner) => {
                self.executor = Some(Executor::new(scanner, self.settings.clone()));
                self.resolution_reported = false;
                true
            }
            Err(err) => {
                if self.resolution_reported {
                    tracing::debug!(target: "tagtree.scan", error = %err, "scanner still unavailable");
                } else {
                    tracing::error!(target: "tagtree.scan", error = %err, "scanner unavailable");
                    self.resolution_reported = true;
                    self.projection.report(&EngineError::Resolution(err));
                }
                false
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty() && !self.projection_pending
    }

    /// Start the next unit, or project and wake idle waiters once the queue drained.
    fn advance(&mut self) {
        if self.in_flight.is_some() {
            return;
        }

        if !self.queue.is_empty() && !self.ensure_executor() {
            self.queue.clear();
        }
        if let (Some(unit), Some(executor)) = (self.queue.pop(), self.executor.as_ref()) {
            self.in_flight = Some(Running {
                generation: self.generation,
                inner: executor.start(unit, &self.root),
            });
            return;
        }

        if self.projection_pending {
            self.projection_pending = false;
            let view = self.aggregate.sorted_view();
            tracing::debug!(
                target: "tagtree.scan",
                root = %self.root,
                matches = view.len(),
                "projecting results"
            );
            self.projection.project(&self.root, &view);
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn finish(
        &mut self,
        generation: u64,
        unit: ScanUnit,
        joined: Result<Result<Vec<Match>, ScanError>, JoinError>,
    ) {
        if generation != self.generation {
            tracing::debug!(
                target: "tagtree.scan",
                unit = %unit,
                "discarding results superseded by a newer full scan"
            );
            return;
        }
        let outcome = UnitOutcome {
            unit,
            result: flatten_join(joined),
        };
        apply_outcome(&mut self.aggregate, outcome, &mut *self.projection);
    }
}
