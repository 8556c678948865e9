use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::migration::db::DbHandle;
use crate::migration::models::{StepReport, StepStatus};

use super::catalog::StepDefinition;
use super::executor::{CheckOutcome, CheckRegistry};

/// Run one check and record the outcome.
///
/// Registers the step (and, on first use, its process and phase), times the
/// executor, and hands the verdict to the recorder so the status cascade
/// runs. A check that errors out is recorded as failed; only storage faults
/// and a missing executor are returned as errors.
pub async fn run_check(
    db: &DbHandle,
    registry: &CheckRegistry,
    process_title: &str,
    def: &'static StepDefinition,
    account_id: &str,
) -> Result<StepReport> {
    let executor = registry.get(def.slug)?;

    let title = process_title.to_string();
    let new_step = def.to_new_step();
    let step = db.call(move |db| db.ensure_step(&title, &new_step)).await?;

    let started = Instant::now();
    let outcome = match executor.execute(account_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(check = def.slug, error = %format!("{:#}", e), "check could not run");
            CheckOutcome::failure(format!("{:#}", e))
        }
    };
    let duration_ms = started.elapsed().as_millis() as i64;

    let status = if outcome.success() {
        StepStatus::Completed
    } else {
        StepStatus::Failed
    };
    let logs = execution_logs(def, &outcome);
    let (process_id, step_id) = (step.process_id, step.id);
    let payload = outcome.payload;

    let execution = db
        .call(move |db| {
            db.record_execution(process_id, step_id, status, &payload, &logs, duration_ms)
        })
        .await?;
    info!(
        check = def.slug,
        process_id,
        step_id,
        %status,
        duration_ms,
        "check finished"
    );

    Ok(StepReport::from_execution(def.title, &execution))
}

/// Log lines stored with an execution.
pub fn execution_logs(def: &StepDefinition, outcome: &CheckOutcome) -> Vec<String> {
    vec![
        "Initializing AWS SDK...".to_string(),
        "Connecting to AWS account...".to_string(),
        def.activity.to_string(),
        format!(
            "Analysis complete: {}",
            outcome.message().unwrap_or("No message provided.")
        ),
    ]
}
