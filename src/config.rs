//! Configuration for the migration assistant.
//!
//! Settings are read from `.migration/assistant.toml` and layered
//! file → environment → CLI, with the CLI winning.
//!
//! # Configuration File Format
//!
//! ```toml
//! [database]
//! path = ".migration/assistant.db"
//!
//! [process]
//! title = "AWS Account Migration"
//!
//! [checks.check_ram]
//! command = ["python3", "scripts/check_ram_shares.py"]
//!
//! [checks.check_stacksets]
//! command = ["./bin/check-stacksets", "--region", "us-east-1"]
//! ```
//!
//! Check commands receive the target account id as their final argument and
//! in `MIGRATION_ACCOUNT_ID`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::checks::catalog;

pub const CONFIG_DIR: &str = ".migration";
pub const CONFIG_FILE: &str = "assistant.toml";
pub const DEFAULT_DB_FILE: &str = "assistant.db";
pub const DEFAULT_PROCESS_TITLE: &str = "AWS Account Migration";

pub const DB_PATH_ENV: &str = "MIGRATION_DB_PATH";
pub const PROCESS_TITLE_ENV: &str = "MIGRATION_PROCESS_TITLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, relative paths resolve against the project directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Title of the migration process being tracked
    #[serde(default)]
    pub title: Option<String>,
}

/// External command backing one check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckCommandConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

/// Parsed `assistant.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantToml {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckCommandConfig>,
}

impl AssistantToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse assistant.toml")
    }

    /// Load from `<config_dir>/assistant.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize assistant.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (slug, check) in &self.checks {
            if catalog::find(slug).is_none() {
                warnings.push(format!("[checks.{}] does not match any known check", slug));
            }
            if check.command.is_empty() {
                warnings.push(format!("[checks.{}] has an empty command", slug));
            }
        }
        if let Some(title) = &self.process.title
            && title.trim().is_empty()
        {
            warnings.push("[process] title is empty".to_string());
        }
        warnings
    }
}

/// Resolved configuration: the file plus environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: AssistantToml,
    /// CLI override for the database path
    pub cli_db_path: Option<PathBuf>,
    /// CLI override for the process title
    pub cli_process_title: Option<String>,
}

impl AssistantConfig {
    /// Load configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = AssistantToml::load_or_default(&config_dir)?;

        Ok(Self {
            project_dir,
            config_dir,
            toml,
            cli_db_path: None,
            cli_process_title: None,
        })
    }

    /// Load configuration with CLI overrides. An explicit `config_file` must exist.
    pub fn with_cli_args(
        project_dir: PathBuf,
        config_file: Option<PathBuf>,
        db_path: Option<PathBuf>,
        process_title: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        if let Some(path) = config_file {
            config.toml = AssistantToml::load(&path)?;
        }
        config.cli_db_path = db_path;
        config.cli_process_title = process_title;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Database path (CLI → env → file → default).
    pub fn db_path(&self) -> PathBuf {
        let path = resolve_db_path(
            self.cli_db_path.clone(),
            std::env::var(DB_PATH_ENV).ok(),
            self.toml.database.path.clone(),
        );
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    /// Process title (CLI → env → file → default).
    pub fn process_title(&self) -> String {
        resolve_process_title(
            self.cli_process_title.clone(),
            std::env::var(PROCESS_TITLE_ENV).ok(),
            self.toml.process.title.clone(),
        )
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

fn resolve_db_path(cli: Option<PathBuf>, env: Option<String>, file: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or(file)
        .unwrap_or_else(|| Path::new(CONFIG_DIR).join(DEFAULT_DB_FILE))
}

fn resolve_process_title(cli: Option<String>, env: Option<String>, file: Option<String>) -> String {
    cli.or_else(|| env.filter(|v| !v.trim().is_empty()))
        .or(file)
        .unwrap_or_else(|| DEFAULT_PROCESS_TITLE.to_string())
}
