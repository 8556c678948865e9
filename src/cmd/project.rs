//! Project setup and catalog listing: `init`, `checks`.

use anyhow::{Context, Result};
use serde::Serialize;

use migration_assistant::checks::{CATALOG, CheckRegistry};
use migration_assistant::config::{AssistantConfig, AssistantToml};
use migration_assistant::migration::{PhaseType, StepStatus};

use super::{open_db, print_json, styled_status};

pub fn cmd_init(config: &AssistantConfig) -> Result<()> {
    std::fs::create_dir_all(&config.config_dir)
        .with_context(|| format!("Failed to create {}", config.config_dir.display()))?;

    let config_file = config.config_file();
    let created_config = !config_file.exists();
    if created_config {
        let mut toml = AssistantToml::default();
        toml.process.title = Some(config.process_title());
        toml.save(&config_file)?;
    }

    let db = open_db(config)?;
    let process = db.ensure_process(&config.process_title())?;

    println!();
    println!(
        "Initialized migration assistant in {}",
        config.config_dir.display()
    );
    if created_config {
        println!("  config:   {} (new)", config_file.display());
    } else {
        println!("  config:   {}", config_file.display());
    }
    println!("  database: {}", config.db_path().display());
    println!("  process:  {} (#{})", process.title, process.id);
    println!();
    Ok(())
}

#[derive(Serialize)]
struct CheckRow {
    id: i64,
    slug: &'static str,
    title: &'static str,
    phase: PhaseType,
    configured: bool,
    status: Option<StepStatus>,
}

pub fn cmd_checks(config: &AssistantConfig, json: bool) -> Result<()> {
    for warning in config.validate() {
        eprintln!("{} {}", console::style("warning:").yellow(), warning);
    }

    let registry = CheckRegistry::from_config(config)?;
    let db = open_db(config)?;
    let process = db.get_process_by_title(&config.process_title())?;

    let mut rows = Vec::new();
    for def in CATALOG.iter() {
        let status = match &process {
            Some(p) => db.get_step(p.id, def.id)?.map(|s| s.status),
            None => None,
        };
        rows.push(CheckRow {
            id: def.id,
            slug: def.slug,
            title: def.title,
            phase: def.phase,
            configured: registry.contains(def.slug),
            status,
        });
    }

    if json {
        return print_json(&rows);
    }

    println!();
    println!(
        "{:<4} {:<22} {:<17} {:<11} Title",
        "ID", "Slug", "Phase", "Executor"
    );
    println!(
        "{:<4} {:<22} {:<17} {:<11} -----",
        "--", "----", "-----", "--------"
    );
    for row in &rows {
        let executor = if row.configured {
            console::style("configured").green()
        } else {
            console::style("missing").dim()
        };
        let status = match row.status {
            Some(s) => format!(" [{}]", styled_status(s)),
            None => String::new(),
        };
        println!(
            "{:<4} {:<22} {:<17} {:<11} {}{}",
            row.id,
            row.slug,
            row.phase.as_str(),
            executor,
            row.title,
            status
        );
    }
    println!();
    Ok(())
}
