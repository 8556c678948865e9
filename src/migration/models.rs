use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status shared by steps, phases, executions, and the process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RequiresAction,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresAction => "requires-action",
        }
    }

    /// Completed and failed are absorbing for reporting purposes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "requires-action" => Ok(Self::RequiresAction),
            _ => Err(format!("Invalid step status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationType {
    FullyAutomated,
    SemiAutomated,
    Manual,
}

impl AutomationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyAutomated => "fully-automated",
            Self::SemiAutomated => "semi-automated",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for AutomationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fully-automated" => Ok(Self::FullyAutomated),
            "semi-automated" => Ok(Self::SemiAutomated),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid automation type: {}", s)),
        }
    }
}

/// Display metadata used when a phase row is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// Stage of the migration. Variants are declared in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseType {
    AssessExisting,
    PrepareNew,
    Migration,
    VerifyNew,
    PostMigration,
}

impl PhaseType {
    pub const SEQUENCE: [PhaseType; 5] = [
        Self::AssessExisting,
        Self::PrepareNew,
        Self::Migration,
        Self::VerifyNew,
        Self::PostMigration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssessExisting => "assess-existing",
            Self::PrepareNew => "prepare-new",
            Self::Migration => "migration",
            Self::VerifyNew => "verify-new",
            Self::PostMigration => "post-migration",
        }
    }

    /// The phase that follows this one, or `None` for the last phase.
    pub fn next(self) -> Option<PhaseType> {
        match self {
            Self::AssessExisting => Some(Self::PrepareNew),
            Self::PrepareNew => Some(Self::Migration),
            Self::Migration => Some(Self::VerifyNew),
            Self::VerifyNew => Some(Self::PostMigration),
            Self::PostMigration => None,
        }
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn template(self) -> PhaseTemplate {
        match self {
            Self::AssessExisting => PhaseTemplate {
                title: "Assess Existing Environment",
                description: "Evaluate current AWS environment and identify migration requirements",
                icon: "Search",
            },
            Self::PrepareNew => PhaseTemplate {
                title: "Prepare New Environment",
                description: "Set up and configure the new AWS environment for migration",
                icon: "Settings",
            },
            Self::Migration => PhaseTemplate {
                title: "Migration",
                description: "Execute the migration of resources from existing to new environment",
                icon: "ArrowRight",
            },
            Self::VerifyNew => PhaseTemplate {
                title: "Verify New Environment",
                description: "Validate the migrated resources and ensure everything is working correctly",
                icon: "CheckCircle",
            },
            Self::PostMigration => PhaseTemplate {
                title: "Post Migration",
                description: "Perform cleanup and finalize the migration process",
                icon: "Flag",
            },
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseType {
    type Err = String;

    /// Accepts the canonical names plus the short route aliases
    /// `migrate` and `verify`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assess-existing" => Ok(Self::AssessExisting),
            "prepare-new" => Ok(Self::PrepareNew),
            "migration" | "migrate" => Ok(Self::Migration),
            "verify-new" | "verify" => Ok(Self::VerifyNew),
            "post-migration" => Ok(Self::PostMigration),
            _ => Err(format!("Invalid phase type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationProcess {
    pub id: i64,
    pub title: String,
    pub status: StepStatus,
    pub progress: i32,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: i64,
    pub process_id: i64,
    #[serde(rename = "type")]
    pub phase_type: PhaseType,
    pub title: String,
    pub description: Option<String>,
    pub status: StepStatus,
    pub progress: i32,
    pub icon: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A step is identified by `(process_id, id)`: catalog ids repeat across
/// processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub process_id: i64,
    pub id: i64,
    pub phase_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: StepStatus,
    pub automation_type: AutomationType,
    pub api_available: bool,
    pub estimated_minutes: i32,
    pub requires_confirmation: bool,
    pub notes: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One immutable run record of a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: i64,
    pub process_id: i64,
    pub step_id: i64,
    pub status: StepStatus,
    pub result: serde_json::Value,
    pub logs: Vec<String>,
    pub duration_ms: i64,
    pub created_at: String,
}

/// Arguments for `ensure_step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub automation_type: AutomationType,
    pub api_available: bool,
    pub estimated_minutes: i32,
    pub requires_confirmation: bool,
    pub notes: Option<String>,
    pub phase_type: PhaseType,
}

impl NewStep {
    pub fn new(id: i64, title: &str, phase_type: PhaseType) -> Self {
        Self {
            id,
            title: title.to_string(),
            description: None,
            automation_type: AutomationType::FullyAutomated,
            api_available: true,
            estimated_minutes: 5,
            requires_confirmation: false,
            notes: None,
            phase_type,
        }
    }
}

// Status consumer views

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDetail {
    #[serde(flatten)]
    pub phase: Phase,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub process: MigrationProcess,
    pub phases: Vec<PhaseDetail>,
}

/// A single execution as reported back to whoever ran the check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: i64,
    pub execution_id: i64,
    pub title: String,
    pub status: StepStatus,
    pub result: serde_json::Value,
    pub logs: Vec<String>,
    /// Whole seconds, rounded down.
    pub execution_time: i64,
}

impl StepReport {
    pub fn from_execution(title: &str, execution: &StepExecution) -> Self {
        Self {
            step_id: execution.step_id,
            execution_id: execution.id,
            title: title.to_string(),
            status: execution.status,
            result: execution.result.clone(),
            logs: execution.logs.clone(),
            execution_time: execution.duration_ms / 1000,
        }
    }
}
