//! Check execution and manual recording: `run`, `record`.

use anyhow::{Context, Result};

use migration_assistant::checks::{CheckRegistry, catalog, run_check};
use migration_assistant::config::AssistantConfig;
use migration_assistant::errors::TrackerError;
use migration_assistant::migration::{PhaseType, StepReport, StepStatus};

use super::status::print_report;
use super::{open_handle, print_json};

pub async fn cmd_run(
    config: &AssistantConfig,
    slug: &str,
    account: &str,
    phase: Option<&str>,
    json: bool,
) -> Result<()> {
    let def = match phase {
        Some(p) => {
            let phase: PhaseType = p.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            catalog::find_in_phase(phase, slug)?
        }
        None => catalog::find(slug).ok_or_else(|| TrackerError::UnknownCheck {
            slug: slug.to_string(),
        })?,
    };

    let registry = CheckRegistry::from_config(config)?;
    let db = open_handle(config)?;
    let report = run_check(&db, &registry, &config.process_title(), def, account).await?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

/// Record an execution for a step whose check ran elsewhere.
///
/// Built-in steps are registered on first use; any other step must already
/// exist.
pub async fn cmd_record(
    config: &AssistantConfig,
    step_id: i64,
    status: &str,
    result: &str,
    logs: Vec<String>,
    duration_ms: i64,
    json: bool,
) -> Result<()> {
    let status: StepStatus = status.parse().map_err(|_| TrackerError::InvalidStatus {
        value: status.to_string(),
    })?;
    let result: serde_json::Value =
        serde_json::from_str(result).context("--result must be valid JSON")?;

    let db = open_handle(config)?;
    let title = config.process_title();
    let (execution, step) = db
        .call(move |db| {
            let existing = match db.get_process_by_title(&title)? {
                Some(process) => db.get_step(process.id, step_id)?,
                None => None,
            };
            let step = match (existing, catalog::find_by_id(step_id)) {
                (Some(step), _) => step,
                (None, Some(def)) => db.ensure_step(&title, &def.to_new_step())?,
                (None, None) => return Err(TrackerError::StepNotFound { id: step_id }.into()),
            };
            let execution = db.record_execution(
                step.process_id,
                step.id,
                status,
                &result,
                &logs,
                duration_ms,
            )?;
            let step = db
                .get_step(step.process_id, step.id)?
                .context("Step vanished after recording")?;
            Ok((execution, step))
        })
        .await?;

    let report = StepReport::from_execution(&step.title, &execution);
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}
