//! Check execution seam.
//!
//! The tracker never knows how a check works. Anything implementing
//! [`CheckExecutor`] can be run and recorded; the shipped implementation
//! shells out to an external script and reads its JSON verdict from stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::debug;

use crate::config::AssistantConfig;
use crate::errors::TrackerError;

use super::catalog::normalize_slug;

/// Environment variable carrying the target account id into check commands.
pub const ACCOUNT_ENV: &str = "MIGRATION_ACCOUNT_ID";

/// The JSON verdict a check produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub payload: Value,
}

impl CheckOutcome {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Failure verdict with a message, in the same shape checks emit.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            payload: json!({ "success": false, "message": message.into() }),
        }
    }

    /// A missing or non-boolean `success` field counts as failure.
    pub fn success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}

/// Runs one check against one account.
///
/// `Err` means the check could not be carried out at all; callers record it
/// as a failed execution rather than aborting.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute(&self, account_id: &str) -> Result<CheckOutcome>;
}

/// Executes an external command and parses its stdout as the verdict.
///
/// The account id is passed as the final argument and in
/// `MIGRATION_ACCOUNT_ID`. No timeout is applied.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Check command must not be empty")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl CheckExecutor for CommandExecutor {
    async fn execute(&self, account_id: &str) -> Result<CheckOutcome> {
        debug!(program = %self.program, account_id, "spawning check command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(account_id)
            .env(ACCOUNT_ENV, account_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn check command: {}", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Ok(CheckOutcome::failure(format!(
                "Check command exited with {}: {}",
                code, detail
            )));
        }

        match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(payload) => Ok(CheckOutcome::new(payload)),
            Err(_) => Ok(CheckOutcome::failure(format!(
                "Check produced non-JSON output: {}",
                stdout.trim()
            ))),
        }
    }
}

/// Slug → executor map.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    executors: HashMap<String, Arc<dyn CheckExecutor>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `CommandExecutor` per `[checks.<slug>]` table.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let mut registry = Self::new();
        for (slug, check) in &config.toml.checks {
            let executor = CommandExecutor::new(&check.command)
                .with_context(|| format!("Invalid command for check '{}'", slug))?;
            registry.register(slug, Arc::new(executor));
        }
        Ok(registry)
    }

    pub fn register(&mut self, slug: &str, executor: Arc<dyn CheckExecutor>) {
        self.executors.insert(normalize_slug(slug), executor);
    }

    pub fn get(&self, slug: &str) -> Result<Arc<dyn CheckExecutor>, TrackerError> {
        let key = normalize_slug(slug);
        self.executors
            .get(&key)
            .cloned()
            .ok_or(TrackerError::NoExecutor { slug: key })
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.executors.contains_key(&normalize_slug(slug))
    }
}
