//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                      |
//! |-----------|---------------------------------------|
//! | `project` | `Init`, `Checks`                      |
//! | `run`     | `Run`, `Record`                       |
//! | `status`  | `Status`, `Step`, `Latest`, `History` |

pub mod project;
pub mod run;
pub mod status;

pub use project::{cmd_checks, cmd_init};
pub use run::{cmd_record, cmd_run};
pub use status::{cmd_history, cmd_latest, cmd_status, cmd_step};

use anyhow::{Context, Result};
use console::StyledObject;
use serde::Serialize;

use migration_assistant::config::AssistantConfig;
use migration_assistant::errors::TrackerError;
use migration_assistant::migration::{DbHandle, MigrationDb, StepStatus};

/// Open the configured database, creating its directory if needed.
pub fn open_db(config: &AssistantConfig) -> Result<MigrationDb> {
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    MigrationDb::new(&path).map_err(|e| TrackerError::Database(e).into())
}

pub fn open_handle(config: &AssistantConfig) -> Result<DbHandle> {
    Ok(DbHandle::new(open_db(config)?))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn paint<D>(status: StepStatus, value: D) -> StyledObject<D> {
    let styled = console::style(value);
    match status {
        StepStatus::Completed => styled.green(),
        StepStatus::Failed => styled.red(),
        StepStatus::InProgress => styled.yellow(),
        StepStatus::RequiresAction => styled.magenta(),
        StepStatus::Pending => styled.dim(),
    }
}

pub fn styled_status(status: StepStatus) -> StyledObject<&'static str> {
    paint(status, status.as_str())
}

/// Status left-aligned to `width` columns for tables.
///
/// Padding happens before styling so escape codes never eat into the column.
pub fn styled_status_padded(status: StepStatus, width: usize) -> StyledObject<String> {
    paint(status, format!("{:<width$}", status.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_status_width_ignores_escape_codes() {
        console::set_colors_enabled(true);
        for status in [StepStatus::Completed, StepStatus::Failed, StepStatus::Pending] {
            let cell = styled_status_padded(status, 16).to_string();
            assert!(cell.contains('\u{1b}'));
            let visible = console::strip_ansi_codes(&cell);
            assert_eq!(visible.chars().count(), 16);
            assert!(visible.starts_with(status.as_str()));
        }
    }
}
