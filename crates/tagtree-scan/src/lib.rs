//! Scan orchestration: turns editor/workspace triggers into scanner invocations and
//! keeps an aggregate of every marker found.

mod aggregate;
mod engine;
mod error;
mod executor;
pub mod planner;
mod projection;
mod queue;

pub use aggregate::ResultAggregate;
pub use engine::{ScanEngine, ScanHandle};
pub use error::EngineError;
pub use executor::{Executor, InFlight, UnitOutcome};
pub use planner::{plan, Plan, PlanContext, Trigger};
pub use projection::Projection;
pub use queue::ScanQueue;
