//! Migration status tracking.
//!
//! A migration process is a fixed sequence of phases, each phase a set of
//! steps, each step an append-only log of executions. Recording an execution
//! drives the whole chain:
//!
//! | Stage        | Where                                | Effect                                         |
//! |--------------|--------------------------------------|------------------------------------------------|
//! | record       | `db::MigrationDb::record_execution`  | append the execution                           |
//! | step update  | `db::MigrationDb::update_step_status`| step takes the execution's status             |
//! | phase rollup | `status::rollup_phase`               | phase status and progress from its steps       |
//! | sequencing   | `db::MigrationDb::create_next_phase_if_needed` | open the next phase once one completes |
//! | process      | `status::rollup_process`             | overall progress and completion                |

pub mod db;
pub mod models;
pub mod status;

pub use db::{DbHandle, MigrationDb};
pub use models::{
    AutomationType, MigrationProcess, NewStep, Phase, PhaseDetail, PhaseType, ProcessDetail, Step,
    StepExecution, StepReport, StepStatus,
};
