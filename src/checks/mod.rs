//! Check collaborators: the built-in step catalog, the executor seam, and
//! the runner that feeds verdicts into the status tracker.

pub mod catalog;
pub mod executor;
pub mod runner;

pub use catalog::{CATALOG, StepDefinition};
pub use executor::{CheckExecutor, CheckOutcome, CheckRegistry, CommandExecutor};
pub use runner::run_check;
