use tagtree_core::{Match, RootFolder};

use crate::EngineError;

/// Receives the engine's output.
///
/// Implementations run on the engine task and should not block.
pub trait Projection: Send {
    /// A full scan of `root` has been queued and previous results were cleared.
    fn scan_started(&mut self, _root: &RootFolder) {}

    /// The queue drained; `matches` is the complete, sorted result set.
    fn project(&mut self, root: &RootFolder, matches: &[Match]);

    fn report(&mut self, _error: &EngineError) {}
}
