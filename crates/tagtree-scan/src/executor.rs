use std::path::PathBuf;
use std::sync::Arc;

use tagtree_core::{Match, RootFolder, ScanError, ScanSettings, ScanUnit, Scanner};
use tokio::task::{JoinError, JoinHandle};

use crate::{EngineError, Projection, ResultAggregate, ScanQueue};

/// Runs scan units against a resolved scanner.
#[derive(Debug, Clone)]
pub struct Executor {
    scanner: Arc<dyn Scanner>,
    settings: ScanSettings,
}

/// The result of one scanner invocation.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: ScanUnit,
    pub result: Result<Vec<Match>, ScanError>,
}

/// A scanner invocation running on its own task.
#[derive(Debug)]
pub struct InFlight {
    pub(crate) unit: ScanUnit,
    pub(crate) task: JoinHandle<Result<Vec<Match>, ScanError>>,
}

impl InFlight {
    pub async fn finish(self) -> UnitOutcome {
        let joined = self.task.await;
        UnitOutcome {
            unit: self.unit,
            result: flatten_join(joined),
        }
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

pub(crate) fn flatten_join(
    joined: Result<Result<Vec<Match>, ScanError>, JoinError>,
) -> Result<Vec<Match>, ScanError> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => Err(ScanError::new("scan was cancelled")),
        Err(err) => Err(ScanError::new(format!("scan task failed: {err}"))),
    }
}

impl Executor {
    pub fn new(scanner: Arc<dyn Scanner>, settings: ScanSettings) -> Self {
        Self { scanner, settings }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Later invocations use `settings`; running ones are unaffected.
    pub fn set_settings(&mut self, settings: ScanSettings) {
        self.settings = settings;
    }

    /// Spawn the scanner for `unit`. Must be called inside a tokio runtime.
    pub fn start(&self, unit: ScanUnit, root: &RootFolder) -> InFlight {
        let scanner = Arc::clone(&self.scanner);
        let options = self.settings.options_for(&unit);
        let scan_root = invocation_root(&unit, root);
        tracing::debug!(target: "tagtree.scan", unit = %unit, "starting scan");
        let task = tokio::spawn(async move { scanner.scan(&scan_root, &options).await });
        InFlight { unit, task }
    }

    pub async fn run_unit(&self, unit: ScanUnit, root: &RootFolder) -> UnitOutcome {
        self.start(unit, root).finish().await
    }

    /// Run every queued unit one at a time, then project the sorted results once.
    ///
    /// Adapter failures are reported and the drain continues with the next unit.
    pub async fn drain(
        &self,
        queue: &mut ScanQueue,
        aggregate: &mut ResultAggregate,
        root: &RootFolder,
        projection: &mut dyn Projection,
    ) {
        while let Some(unit) = queue.pop() {
            let outcome = self.run_unit(unit, root).await;
            apply_outcome(aggregate, outcome, projection);
        }
        let view = aggregate.sorted_view();
        tracing::debug!(
            target: "tagtree.scan",
            root = %root,
            files = aggregate.files().len(),
            matches = view.len(),
            "queue drained"
        );
        projection.project(root, &view);
    }
}

/// Fold a finished unit into the aggregate, or report its failure.
pub(crate) fn apply_outcome(
    aggregate: &mut ResultAggregate,
    outcome: UnitOutcome,
    projection: &mut dyn Projection,
) {
    let UnitOutcome { unit, result } = outcome;
    match result {
        Ok(matches) => {
            tracing::debug!(
                target: "tagtree.scan",
                unit = %unit,
                matches = matches.len(),
                "scan finished"
            );
            aggregate.replace_scope(&unit, matches);
        }
        Err(source) => {
            tracing::warn!(target: "tagtree.scan", unit = %unit, error = %source, "scan failed");
            projection.report(&EngineError::Adapter { unit, source });
        }
    }
}

fn invocation_root(unit: &ScanUnit, root: &RootFolder) -> PathBuf {
    match unit {
        ScanUnit::Folder(path) => path.clone(),
        ScanUnit::File(path) => root
            .path()
            .filter(|root| path.starts_with(root))
            .or_else(|| path.parent())
            .unwrap_or(path.as_path())
            .to_path_buf(),
    }
}
