//! Status views: `status`, `step`, `latest`, `history`.

use anyhow::Result;

use migration_assistant::config::AssistantConfig;
use migration_assistant::errors::TrackerError;
use migration_assistant::migration::{MigrationDb, MigrationProcess, PhaseType, Step, StepReport};

use super::{open_db, print_json, styled_status, styled_status_padded};

/// The process named by the configured title.
fn current_process(db: &MigrationDb, config: &AssistantConfig) -> Result<MigrationProcess> {
    let title = config.process_title();
    Ok(db
        .get_process_by_title(&title)?
        .ok_or(TrackerError::ProcessNotFound { key: title })?)
}

fn find_step(db: &MigrationDb, process: &MigrationProcess, id: i64) -> Result<Step> {
    Ok(db
        .get_step(process.id, id)?
        .ok_or(TrackerError::StepNotFound { id })?)
}

pub fn print_report(report: &StepReport) {
    println!();
    println!(
        "Step {} · {} [{}]",
        report.step_id,
        report.title,
        styled_status(report.status)
    );
    println!(
        "  execution #{} took {}s",
        report.execution_id, report.execution_time
    );
    for line in &report.logs {
        println!("  {}", console::style(line).dim());
    }
    println!();
}

pub fn cmd_status(config: &AssistantConfig, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let process = current_process(&db, config)?;
    let detail = db
        .get_process_detail(process.id)?
        .ok_or(TrackerError::ProcessNotFound { key: process.title })?;

    if json {
        return print_json(&detail);
    }

    println!();
    println!(
        "{} [{}] {}%",
        console::style(&detail.process.title).bold(),
        styled_status(detail.process.status),
        detail.process.progress
    );
    println!("Started: {}", detail.process.started_at);
    if let Some(done) = &detail.process.completed_at {
        println!("Completed: {}", done);
    }
    println!();

    for phase_type in PhaseType::SEQUENCE {
        match detail.phases.iter().find(|p| p.phase.phase_type == phase_type) {
            Some(p) => {
                println!(
                    "{:<30} {} {}%",
                    p.phase.title,
                    styled_status(p.phase.status),
                    p.phase.progress
                );
                for step in &p.steps {
                    println!(
                        "  {:<4} {:<45} {}",
                        step.id,
                        step.title,
                        styled_status(step.status)
                    );
                }
            }
            None => println!(
                "{:<30} {}",
                phase_type.template().title,
                console::style("not started").dim()
            ),
        }
    }
    println!();
    Ok(())
}

pub fn cmd_step(config: &AssistantConfig, id: i64, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let process = current_process(&db, config)?;
    let step = find_step(&db, &process, id)?;
    let latest = db.get_latest_execution(process.id, id)?;

    if json {
        return print_json(&serde_json::json!({
            "step": step,
            "latest_execution": latest,
        }));
    }

    println!();
    println!("Step {} · {} [{}]", step.id, step.title, styled_status(step.status));
    if let Some(description) = &step.description {
        println!("  {}", description);
    }
    println!(
        "  {} · ~{} min{}",
        step.automation_type,
        step.estimated_minutes,
        if step.requires_confirmation {
            " · requires confirmation"
        } else {
            ""
        }
    );
    if let Some(notes) = &step.notes {
        println!("  notes: {}", notes);
    }
    if let Some(done) = &step.completed_at {
        println!("  completed at {}", done);
    }
    match latest {
        Some(e) => println!(
            "  latest execution #{} [{}] at {}",
            e.id,
            styled_status(e.status),
            e.created_at
        ),
        None => println!("  {}", console::style("never executed").dim()),
    }
    println!();
    Ok(())
}

pub fn cmd_latest(config: &AssistantConfig, id: i64, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let process = current_process(&db, config)?;
    let step = find_step(&db, &process, id)?;
    let execution = db
        .get_latest_execution(process.id, id)?
        .ok_or(TrackerError::NoExecutions { step_id: id })?;

    let report = StepReport::from_execution(&step.title, &execution);
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

pub fn cmd_history(
    config: &AssistantConfig,
    id: i64,
    limit: i64,
    offset: i64,
    json: bool,
) -> Result<()> {
    let db = open_db(config)?;
    let process = current_process(&db, config)?;
    let executions = db.get_execution_history(process.id, id, limit, offset)?;
    let title = find_step(&db, &process, id)?.title;

    let reports: Vec<StepReport> = executions
        .iter()
        .map(|e| StepReport::from_execution(&title, e))
        .collect();
    if json {
        return print_json(&reports);
    }

    println!();
    println!("History for step {} · {}", id, title);
    println!("{:<8} {:<16} {:<8} Recorded", "Run", "Status", "Secs");
    for (report, execution) in reports.iter().zip(&executions) {
        println!(
            "{:<8} {} {:<8} {}",
            report.execution_id,
            styled_status_padded(report.status, 16),
            report.execution_time,
            execution.created_at
        );
    }
    println!();
    Ok(())
}
