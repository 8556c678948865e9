//! Built-in step catalog.
//!
//! Step ids are fixed: they are the primary keys the tracker stores, so a
//! definition must never be renumbered once shipped.

use crate::errors::TrackerError;
use crate::migration::models::{AutomationType, NewStep, PhaseType};

/// Static description of a check the assistant knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    pub slug: &'static str,
    pub id: i64,
    pub phase: PhaseType,
    pub title: &'static str,
    pub description: &'static str,
    pub automation_type: AutomationType,
    pub estimated_minutes: i32,
    pub notes: &'static str,
    /// Progress line written to the execution log while the check runs.
    pub activity: &'static str,
}

impl StepDefinition {
    pub fn to_new_step(&self) -> NewStep {
        NewStep {
            id: self.id,
            title: self.title.to_string(),
            description: Some(self.description.to_string()),
            automation_type: self.automation_type,
            api_available: true,
            estimated_minutes: self.estimated_minutes,
            requires_confirmation: false,
            notes: Some(self.notes.to_string()),
            phase_type: self.phase,
        }
    }
}

pub const CATALOG: [StepDefinition; 7] = [
    StepDefinition {
        slug: "check_ram",
        id: 1,
        phase: PhaseType::AssessExisting,
        title: "Check for resources shared via RAM",
        description: "Check for resources shared via RAM with the rest of the Org or OUs",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically scan for shared resources",
        activity: "Checking for resources shared via RAM...",
    },
    StepDefinition {
        slug: "check_admin_services",
        id: 2,
        phase: PhaseType::AssessExisting,
        title: "Check for delegated admin services",
        description: "Check if services like AWS Backups, GuardDuty, Inspector have delegated admin in old org",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 8,
        notes: "Agent will identify all delegated admin services",
        activity: "Checking for delegated admin accounts...",
    },
    StepDefinition {
        slug: "cost_explorer_data",
        id: 3,
        phase: PhaseType::AssessExisting,
        title: "Check Cost Explorer Data",
        description: "Cost explorer data in Payer2 will NOT have historical data from Payer1.",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically check Cost Explorer data",
        activity: "Checking Cost Explorer data...",
    },
    StepDefinition {
        slug: "check_savings",
        id: 4,
        phase: PhaseType::AssessExisting,
        title: "Check RI and Savings Plans",
        description: "Check RI and Savings Plans",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically check RI and Savings Plans",
        activity: "Checking RI and Savings Plans...",
    },
    StepDefinition {
        slug: "check_policies",
        id: 5,
        phase: PhaseType::AssessExisting,
        title: "Check for policy references",
        description: "Check for policy documents across various AWS services for Organization/OU references",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically check for policy references",
        activity: "Checking for policy references...",
    },
    StepDefinition {
        slug: "check_stacksets",
        id: 6,
        phase: PhaseType::AssessExisting,
        title: "Check for stacksets",
        description: "Check if CloudFormation StackSets use AWS Organizations",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically check for stacksets",
        activity: "Checking for stacksets using Organizations...",
    },
    StepDefinition {
        slug: "create_iam_admin",
        id: 8,
        phase: PhaseType::AssessExisting,
        title: "Create Fallback IAM Admin",
        description: "Create Admin for sso if fails",
        automation_type: AutomationType::FullyAutomated,
        estimated_minutes: 5,
        notes: "Agent will automatically create IAM Admin",
        activity: "Creating IAM Admin...",
    },
];

/// Accepts `check-ram` as well as `check_ram`.
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().replace('-', "_")
}

pub fn find(slug: &str) -> Option<&'static StepDefinition> {
    let slug = normalize_slug(slug);
    CATALOG.iter().find(|d| d.slug == slug)
}

pub fn find_by_id(id: i64) -> Option<&'static StepDefinition> {
    CATALOG.iter().find(|d| d.id == id)
}

/// Look a check up and require that it belongs to `phase`.
pub fn find_in_phase(phase: PhaseType, slug: &str) -> Result<&'static StepDefinition, TrackerError> {
    let def = find(slug).ok_or_else(|| TrackerError::UnknownCheck {
        slug: slug.to_string(),
    })?;
    if def.phase != phase {
        return Err(TrackerError::StepNotInPhase {
            slug: slug.to_string(),
            phase: phase.to_string(),
        });
    }
    Ok(def)
}

pub fn in_phase(phase: PhaseType) -> impl Iterator<Item = &'static StepDefinition> {
    CATALOG.iter().filter(move |d| d.phase == phase)
}
