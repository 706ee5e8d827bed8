use tagtree_core::{ResolutionError, ScanError, ScanUnit};
use thiserror::Error;

/// A failure surfaced to the user through [`crate::Projection::report`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("failed to scan {unit}: {source}")]
    Adapter {
        unit: ScanUnit,
        #[source]
        source: ScanError,
    },
}
