use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::models::*;
use super::status;
use crate::errors::TrackerError;

/// Async-safe handle to the migration database.
///
/// Wraps `MigrationDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<MigrationDb>>,
}

impl DbHandle {
    pub fn new(db: MigrationDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&MigrationDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| TrackerError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, MigrationDb>> {
        self.inner
            .lock()
            .map_err(|_| TrackerError::LockPoisoned.into())
    }
}

pub struct MigrationDb {
    conn: Connection,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl MigrationDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS migration_processes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'pending',
                    progress INTEGER NOT NULL DEFAULT 0,
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS phases (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    process_id INTEGER NOT NULL REFERENCES migration_processes(id) ON DELETE CASCADE,
                    phase_type TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    progress INTEGER NOT NULL DEFAULT 0,
                    icon TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(process_id, phase_type)
                );

                CREATE TABLE IF NOT EXISTS steps (
                    process_id INTEGER NOT NULL REFERENCES migration_processes(id) ON DELETE CASCADE,
                    id INTEGER NOT NULL,
                    phase_id INTEGER NOT NULL REFERENCES phases(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    automation_type TEXT NOT NULL,
                    api_available INTEGER NOT NULL DEFAULT 0,
                    estimated_minutes INTEGER NOT NULL DEFAULT 0,
                    requires_confirmation INTEGER NOT NULL DEFAULT 0,
                    notes TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY(process_id, id)
                );

                CREATE TABLE IF NOT EXISTS step_executions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    process_id INTEGER NOT NULL,
                    step_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    result TEXT NOT NULL DEFAULT 'null',
                    logs TEXT NOT NULL DEFAULT '[]',
                    duration_ms INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY(process_id, step_id) REFERENCES steps(process_id, id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_phases_process ON phases(process_id);
                CREATE INDEX IF NOT EXISTS idx_steps_phase ON steps(phase_id);
                CREATE INDEX IF NOT EXISTS idx_step_executions_step
                    ON step_executions(process_id, step_id, created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Migration processes ───────────────────────────────────────────

    pub fn create_process(&self, title: &str) -> Result<MigrationProcess> {
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO migration_processes (title, status, progress, started_at, created_at, updated_at)
                 VALUES (?1, 'pending', 0, ?2, ?2, ?2)",
                params![title, ts],
            )
            .context("Failed to insert migration process")?;
        let id = self.conn.last_insert_rowid();
        self.get_process(id)?
            .context("Migration process not found after insert")
    }

    /// Get-or-create a process keyed by its title.
    pub fn ensure_process(&self, title: &str) -> Result<MigrationProcess> {
        ensure_process_in(&self.conn, title)
    }

    pub fn get_process(&self, id: i64) -> Result<Option<MigrationProcess>> {
        fetch_process(&self.conn, id)
    }

    pub fn get_process_by_title(&self, title: &str) -> Result<Option<MigrationProcess>> {
        fetch_process_by_title(&self.conn, title)
    }

    pub fn list_processes(&self) -> Result<Vec<MigrationProcess>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PROCESS_COLUMNS} FROM migration_processes ORDER BY id"
            ))
            .context("Failed to prepare list_processes")?;
        let rows = stmt
            .query_map([], ProcessRow::read)
            .context("Failed to query migration processes")?;
        let mut processes = Vec::new();
        for row in rows {
            let r = row.context("Failed to read migration process row")?;
            processes.push(r.into_process()?);
        }
        Ok(processes)
    }

    pub fn get_process_detail(&self, id: i64) -> Result<Option<ProcessDetail>> {
        let process = match self.get_process(id)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let mut phases = Vec::new();
        for phase in self.list_phases(id)? {
            let steps = self.list_steps(phase.id)?;
            phases.push(PhaseDetail { phase, steps });
        }
        Ok(Some(ProcessDetail { process, phases }))
    }

    // ── Phases ────────────────────────────────────────────────────────

    /// Get-or-create the phase of `phase_type` for a process, using the
    /// phase template for a new row.
    pub fn ensure_phase(&self, process_id: i64, phase_type: PhaseType) -> Result<Phase> {
        if fetch_process(&self.conn, process_id)?.is_none() {
            return Err(TrackerError::ProcessNotFound {
                key: process_id.to_string(),
            }
            .into());
        }
        ensure_phase_in(&self.conn, process_id, phase_type)
    }

    pub fn get_phase(&self, id: i64) -> Result<Option<Phase>> {
        fetch_phase(&self.conn, id)
    }

    pub fn get_phase_by_type(&self, process_id: i64, phase_type: PhaseType) -> Result<Option<Phase>> {
        fetch_phase_by_type(&self.conn, process_id, phase_type)
    }

    /// All phases of a process, in sequence order.
    pub fn list_phases(&self, process_id: i64) -> Result<Vec<Phase>> {
        list_phases_in(&self.conn, process_id)
    }

    pub fn get_phase_detail(&self, id: i64) -> Result<Option<PhaseDetail>> {
        let phase = match self.get_phase(id)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let steps = self.list_steps(phase.id)?;
        Ok(Some(PhaseDetail { phase, steps }))
    }

    /// Recompute a phase's status and progress from its steps.
    ///
    /// Returns `None` for an unknown phase. A phase without steps is returned
    /// unchanged.
    pub fn update_phase_status(&self, phase_id: i64) -> Result<Option<Phase>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let phase = rollup_phase_in(&tx, phase_id)?;
        tx.commit().context("Failed to commit phase status update")?;
        Ok(phase)
    }

    /// Create the phase that follows `completed` in the sequence, unless it
    /// already exists or `completed` is the last phase.
    pub fn create_next_phase_if_needed(&self, completed: &Phase) -> Result<Option<Phase>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let created = create_next_phase_in(&tx, completed)?;
        tx.commit().context("Failed to commit next phase")?;
        Ok(created)
    }

    // ── Steps ─────────────────────────────────────────────────────────

    /// Idempotent upsert of a step within the process titled `process_title`.
    ///
    /// Step ids are scoped to their process, so two processes may both own a
    /// step `1`. On first use this creates the process (by title) and the
    /// owning phase. An existing step keeps its identity, phase, and status;
    /// only its descriptive metadata is refreshed and no phase is created.
    pub fn ensure_step(&self, process_title: &str, step: &NewStep) -> Result<Step> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let process = ensure_process_in(&tx, process_title)?;
        let ts = now();

        if let Some(existing) = fetch_step(&tx, process.id, step.id)? {
            tx.execute(
                "UPDATE steps SET title = ?1, description = ?2, automation_type = ?3, api_available = ?4,
                    estimated_minutes = ?5, requires_confirmation = ?6, notes = ?7, updated_at = ?8
                 WHERE process_id = ?9 AND id = ?10",
                params![
                    step.title,
                    step.description,
                    step.automation_type.as_str(),
                    step.api_available,
                    step.estimated_minutes,
                    step.requires_confirmation,
                    step.notes,
                    ts,
                    process.id,
                    step.id
                ],
            )
            .context("Failed to update step")?;
            debug!(
                process_id = process.id,
                step_id = step.id,
                phase_id = existing.phase_id,
                "step metadata refreshed"
            );
        } else {
            let phase = ensure_phase_in(&tx, process.id, step.phase_type)?;
            tx.execute(
                "INSERT INTO steps (process_id, id, phase_id, title, description, status, automation_type,
                    api_available, estimated_minutes, requires_confirmation, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    process.id,
                    step.id,
                    phase.id,
                    step.title,
                    step.description,
                    step.automation_type.as_str(),
                    step.api_available,
                    step.estimated_minutes,
                    step.requires_confirmation,
                    step.notes,
                    ts
                ],
            )
            .context("Failed to insert step")?;
            info!(
                process_id = process.id,
                step_id = step.id,
                phase = %step.phase_type,
                "step created"
            );
        }

        let saved = fetch_step(&tx, process.id, step.id)?.context("Step not found after upsert")?;
        tx.commit().context("Failed to commit step upsert")?;
        Ok(saved)
    }

    pub fn get_step(&self, process_id: i64, id: i64) -> Result<Option<Step>> {
        fetch_step(&self.conn, process_id, id)
    }

    pub fn list_steps(&self, phase_id: i64) -> Result<Vec<Step>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {STEP_COLUMNS} FROM steps WHERE phase_id = ?1 ORDER BY id"
            ))
            .context("Failed to prepare list_steps")?;
        let rows = stmt
            .query_map(params![phase_id], StepRow::read)
            .context("Failed to query steps")?;
        let mut steps = Vec::new();
        for row in rows {
            let r = row.context("Failed to read step row")?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }

    /// Set a step's status and roll the change up through its phase.
    /// Returns `None` when the step does not exist.
    pub fn update_step_status(
        &self,
        process_id: i64,
        step_id: i64,
        status: StepStatus,
    ) -> Result<Option<Step>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let step = apply_step_status(&tx, process_id, step_id, status)?;
        tx.commit().context("Failed to commit step status update")?;
        Ok(step)
    }

    // ── Step executions ───────────────────────────────────────────────

    /// Append an execution record and propagate its status upward.
    ///
    /// The execution insert, the step update, the phase roll-up, next-phase
    /// creation, and the process roll-up share one transaction: a failure at
    /// any point leaves the database untouched.
    pub fn record_execution(
        &self,
        process_id: i64,
        step_id: i64,
        status: StepStatus,
        result: &serde_json::Value,
        logs: &[String],
        duration_ms: i64,
    ) -> Result<StepExecution> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if fetch_step(&tx, process_id, step_id)?.is_none() {
            return Err(TrackerError::StepNotFound { id: step_id }.into());
        }

        let result_json = serde_json::to_string(result).context("Failed to serialize result")?;
        let logs_json = serde_json::to_string(logs).context("Failed to serialize logs")?;
        tx.execute(
            "INSERT INTO step_executions (process_id, step_id, status, result, logs, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                process_id,
                step_id,
                status.as_str(),
                result_json,
                logs_json,
                duration_ms,
                now()
            ],
        )
        .context("Failed to insert step execution")?;
        let id = tx.last_insert_rowid();
        info!(process_id, step_id, execution_id = id, %status, "step execution recorded");

        apply_step_status(&tx, process_id, step_id, status)?;

        let execution = fetch_execution(&tx, id)?.context("Step execution not found after insert")?;
        tx.commit().context("Failed to commit step execution")?;
        Ok(execution)
    }

    pub fn get_execution(&self, id: i64) -> Result<Option<StepExecution>> {
        fetch_execution(&self.conn, id)
    }

    /// The authoritative (most recent) execution of a step.
    pub fn get_latest_execution(
        &self,
        process_id: i64,
        step_id: i64,
    ) -> Result<Option<StepExecution>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {EXECUTION_COLUMNS} FROM step_executions
                     WHERE process_id = ?1 AND step_id = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![process_id, step_id],
                ExecutionRow::read,
            )
            .optional()
            .context("Failed to query latest step execution")?;
        row.map(ExecutionRow::into_execution).transpose()
    }

    /// Execution history of a step, newest first.
    ///
    /// An unknown step yields `StepNotFound`; a step that has never run
    /// yields `NoExecutions` rather than an empty list.
    pub fn get_execution_history(
        &self,
        process_id: i64,
        step_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StepExecution>> {
        if fetch_step(&self.conn, process_id, step_id)?.is_none() {
            return Err(TrackerError::StepNotFound { id: step_id }.into());
        }
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM step_executions WHERE process_id = ?1 AND step_id = ?2",
                params![process_id, step_id],
                |row| row.get(0),
            )
            .context("Failed to count step executions")?;
        if total == 0 {
            return Err(TrackerError::NoExecutions { step_id }.into());
        }

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM step_executions
                 WHERE process_id = ?1 AND step_id = ?2
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
            ))
            .context("Failed to prepare get_execution_history")?;
        let rows = stmt
            .query_map(params![process_id, step_id, limit, offset], ExecutionRow::read)
            .context("Failed to query step executions")?;
        let mut executions = Vec::new();
        for row in rows {
            let r = row.context("Failed to read step execution row")?;
            executions.push(r.into_execution()?);
        }
        Ok(executions)
    }
}

// ── Cascade ───────────────────────────────────────────────────────────
//
// These run against a borrowed connection so the public entry points can
// wrap the whole chain in a single transaction.

fn apply_step_status(
    conn: &Connection,
    process_id: i64,
    step_id: i64,
    status: StepStatus,
) -> Result<Option<Step>> {
    let ts = now();
    let completed_at = (status == StepStatus::Completed).then(|| ts.clone());
    let changed = conn
        .execute(
            "UPDATE steps SET status = ?1, updated_at = ?2, completed_at = COALESCE(?3, completed_at)
             WHERE process_id = ?4 AND id = ?5",
            params![status.as_str(), ts, completed_at, process_id, step_id],
        )
        .context("Failed to update step status")?;
    if changed == 0 {
        debug!(process_id, step_id, "status update for unknown step ignored");
        return Ok(None);
    }

    let step =
        fetch_step(conn, process_id, step_id)?.context("Step not found after status update")?;
    debug!(process_id, step_id, %status, "step status set");
    rollup_phase_in(conn, step.phase_id)?;
    Ok(Some(step))
}

fn rollup_phase_in(conn: &Connection, phase_id: i64) -> Result<Option<Phase>> {
    let phase = match fetch_phase(conn, phase_id)? {
        Some(p) => p,
        None => return Ok(None),
    };

    let statuses = step_statuses(conn, phase_id)?;
    let rollup = match status::rollup_phase(&statuses) {
        Some(r) => r,
        None => return Ok(Some(phase)),
    };

    conn.execute(
        "UPDATE phases SET status = ?1, progress = ?2, updated_at = ?3 WHERE id = ?4",
        params![rollup.status.as_str(), rollup.progress, now(), phase_id],
    )
    .context("Failed to update phase status")?;
    let phase = fetch_phase(conn, phase_id)?.context("Phase not found after status update")?;
    debug!(
        phase_id,
        status = %phase.status,
        progress = phase.progress,
        "phase rolled up"
    );

    if phase.status == StepStatus::Completed {
        create_next_phase_in(conn, &phase)?;
    }
    refresh_process_in(conn, phase.process_id)?;
    Ok(Some(phase))
}

fn create_next_phase_in(conn: &Connection, completed: &Phase) -> Result<Option<Phase>> {
    let next_type = match completed.phase_type.next() {
        Some(t) => t,
        None => return Ok(None),
    };
    if fetch_phase_by_type(conn, completed.process_id, next_type)?.is_some() {
        return Ok(None);
    }
    let next = ensure_phase_in(conn, completed.process_id, next_type)?;
    info!(
        process_id = completed.process_id,
        from = %completed.phase_type,
        to = %next_type,
        "next phase created"
    );
    Ok(Some(next))
}

fn refresh_process_in(conn: &Connection, process_id: i64) -> Result<()> {
    let phases: Vec<(PhaseType, StepStatus)> = list_phases_in(conn, process_id)?
        .into_iter()
        .map(|p| (p.phase_type, p.status))
        .collect();

    let mut stmt = conn
        .prepare("SELECT status FROM steps WHERE process_id = ?1")
        .context("Failed to prepare process step statuses")?;
    let rows = stmt
        .query_map(params![process_id], |row| row.get::<_, String>(0))
        .context("Failed to query process step statuses")?;
    let mut steps = Vec::new();
    for row in rows {
        steps.push(parse_status(&row.context("Failed to read step status")?)?);
    }

    let rollup = status::rollup_process(&phases, &steps);
    let ts = now();
    conn.execute(
        "UPDATE migration_processes SET status = ?1, progress = ?2, updated_at = ?3,
            completed_at = CASE WHEN ?1 = 'completed' THEN COALESCE(completed_at, ?3) ELSE completed_at END
         WHERE id = ?4",
        params![rollup.status.as_str(), rollup.progress, ts, process_id],
    )
    .context("Failed to update migration process")?;
    Ok(())
}

fn step_statuses(conn: &Connection, phase_id: i64) -> Result<Vec<StepStatus>> {
    let mut stmt = conn
        .prepare("SELECT status FROM steps WHERE phase_id = ?1")
        .context("Failed to prepare step statuses")?;
    let rows = stmt
        .query_map(params![phase_id], |row| row.get::<_, String>(0))
        .context("Failed to query step statuses")?;
    let mut statuses = Vec::new();
    for row in rows {
        statuses.push(parse_status(&row.context("Failed to read step status")?)?);
    }
    Ok(statuses)
}

fn ensure_process_in(conn: &Connection, title: &str) -> Result<MigrationProcess> {
    if let Some(process) = fetch_process_by_title(conn, title)? {
        return Ok(process);
    }
    let ts = now();
    conn.execute(
        "INSERT INTO migration_processes (title, status, progress, started_at, created_at, updated_at)
         VALUES (?1, 'pending', 0, ?2, ?2, ?2)",
        params![title, ts],
    )
    .context("Failed to insert migration process")?;
    info!(title, "migration process created");
    fetch_process_by_title(conn, title)?.context("Migration process not found after insert")
}

fn ensure_phase_in(conn: &Connection, process_id: i64, phase_type: PhaseType) -> Result<Phase> {
    let template = phase_type.template();
    let ts = now();
    conn.execute(
        "INSERT INTO phases (process_id, phase_type, title, description, status, progress, icon, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?6)
         ON CONFLICT(process_id, phase_type) DO NOTHING",
        params![
            process_id,
            phase_type.as_str(),
            template.title,
            template.description,
            template.icon,
            ts
        ],
    )
    .context("Failed to insert phase")?;
    fetch_phase_by_type(conn, process_id, phase_type)?.context("Phase not found after insert")
}

fn list_phases_in(conn: &Connection, process_id: i64) -> Result<Vec<Phase>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PHASE_COLUMNS} FROM phases WHERE process_id = ?1"
        ))
        .context("Failed to prepare list_phases")?;
    let rows = stmt
        .query_map(params![process_id], PhaseRow::read)
        .context("Failed to query phases")?;
    let mut phases = Vec::new();
    for row in rows {
        let r = row.context("Failed to read phase row")?;
        phases.push(r.into_phase()?);
    }
    phases.sort_by_key(|p| p.phase_type);
    Ok(phases)
}

// ── Row access ────────────────────────────────────────────────────────

const PROCESS_COLUMNS: &str =
    "id, title, status, progress, started_at, completed_at, created_at, updated_at";
const PHASE_COLUMNS: &str =
    "id, process_id, phase_type, title, description, status, progress, icon, created_at, updated_at";
const STEP_COLUMNS: &str = "process_id, id, phase_id, title, description, status, automation_type, \
     api_available, estimated_minutes, requires_confirmation, notes, completed_at, created_at, updated_at";
const EXECUTION_COLUMNS: &str =
    "id, process_id, step_id, status, result, logs, duration_ms, created_at";

fn parse_status(s: &str) -> Result<StepStatus> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("invalid status in database: '{}'", s))
}

fn fetch_process(conn: &Connection, id: i64) -> Result<Option<MigrationProcess>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROCESS_COLUMNS} FROM migration_processes WHERE id = ?1"),
            params![id],
            ProcessRow::read,
        )
        .optional()
        .context("Failed to query migration process")?;
    row.map(ProcessRow::into_process).transpose()
}

fn fetch_process_by_title(conn: &Connection, title: &str) -> Result<Option<MigrationProcess>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROCESS_COLUMNS} FROM migration_processes WHERE title = ?1"),
            params![title],
            ProcessRow::read,
        )
        .optional()
        .context("Failed to query migration process by title")?;
    row.map(ProcessRow::into_process).transpose()
}

fn fetch_phase(conn: &Connection, id: i64) -> Result<Option<Phase>> {
    let row = conn
        .query_row(
            &format!("SELECT {PHASE_COLUMNS} FROM phases WHERE id = ?1"),
            params![id],
            PhaseRow::read,
        )
        .optional()
        .context("Failed to query phase")?;
    row.map(PhaseRow::into_phase).transpose()
}

fn fetch_phase_by_type(
    conn: &Connection,
    process_id: i64,
    phase_type: PhaseType,
) -> Result<Option<Phase>> {
    let row = conn
        .query_row(
            &format!("SELECT {PHASE_COLUMNS} FROM phases WHERE process_id = ?1 AND phase_type = ?2"),
            params![process_id, phase_type.as_str()],
            PhaseRow::read,
        )
        .optional()
        .context("Failed to query phase by type")?;
    row.map(PhaseRow::into_phase).transpose()
}

fn fetch_step(conn: &Connection, process_id: i64, id: i64) -> Result<Option<Step>> {
    let row = conn
        .query_row(
            &format!("SELECT {STEP_COLUMNS} FROM steps WHERE process_id = ?1 AND id = ?2"),
            params![process_id, id],
            StepRow::read,
        )
        .optional()
        .context("Failed to query step")?;
    row.map(StepRow::into_step).transpose()
}

fn fetch_execution(conn: &Connection, id: i64) -> Result<Option<StepExecution>> {
    let row = conn
        .query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM step_executions WHERE id = ?1"),
            params![id],
            ExecutionRow::read,
        )
        .optional()
        .context("Failed to query step execution")?;
    row.map(ExecutionRow::into_execution).transpose()
}

struct ProcessRow {
    id: i64,
    title: String,
    status: String,
    progress: i32,
    started_at: String,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ProcessRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            progress: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_process(self) -> Result<MigrationProcess> {
        Ok(MigrationProcess {
            id: self.id,
            title: self.title,
            status: parse_status(&self.status)?,
            progress: self.progress,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct PhaseRow {
    id: i64,
    process_id: i64,
    phase_type: String,
    title: String,
    description: Option<String>,
    status: String,
    progress: i32,
    icon: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PhaseRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            process_id: row.get(1)?,
            phase_type: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            progress: row.get(6)?,
            icon: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_phase(self) -> Result<Phase> {
        Ok(Phase {
            id: self.id,
            process_id: self.process_id,
            phase_type: self
                .phase_type
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid phase_type in database: '{}'", self.phase_type))?,
            title: self.title,
            description: self.description,
            status: parse_status(&self.status)?,
            progress: self.progress,
            icon: self.icon,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct StepRow {
    process_id: i64,
    id: i64,
    phase_id: i64,
    title: String,
    description: Option<String>,
    status: String,
    automation_type: String,
    api_available: bool,
    estimated_minutes: i32,
    requires_confirmation: bool,
    notes: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StepRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            process_id: row.get(0)?,
            id: row.get(1)?,
            phase_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            automation_type: row.get(6)?,
            api_available: row.get(7)?,
            estimated_minutes: row.get(8)?,
            requires_confirmation: row.get(9)?,
            notes: row.get(10)?,
            completed_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_step(self) -> Result<Step> {
        Ok(Step {
            process_id: self.process_id,
            id: self.id,
            phase_id: self.phase_id,
            title: self.title,
            description: self.description,
            status: parse_status(&self.status)?,
            automation_type: self.automation_type.parse().map_err(|_| {
                anyhow::anyhow!("invalid automation_type in database: '{}'", self.automation_type)
            })?,
            api_available: self.api_available,
            estimated_minutes: self.estimated_minutes,
            requires_confirmation: self.requires_confirmation,
            notes: self.notes,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct ExecutionRow {
    id: i64,
    process_id: i64,
    step_id: i64,
    status: String,
    result: String,
    logs: String,
    duration_ms: i64,
    created_at: String,
}

impl ExecutionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            process_id: row.get(1)?,
            step_id: row.get(2)?,
            status: row.get(3)?,
            result: row.get(4)?,
            logs: row.get(5)?,
            duration_ms: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_execution(self) -> Result<StepExecution> {
        let result = serde_json::from_str(&self.result)
            .map_err(|e| anyhow::anyhow!("corrupt result JSON for execution {}: {}", self.id, e))?;
        let logs = serde_json::from_str(&self.logs)
            .map_err(|e| anyhow::anyhow!("corrupt logs JSON for execution {}: {}", self.id, e))?;
        Ok(StepExecution {
            id: self.id,
            process_id: self.process_id,
            step_id: self.step_id,
            status: parse_status(&self.status)?,
            result,
            logs,
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_not_found;

    const TITLE: &str = "AWS Account Migration";

    fn assess_step(id: i64) -> NewStep {
        NewStep::new(id, &format!("Check {}", id), PhaseType::AssessExisting)
    }

    fn record(
        db: &MigrationDb,
        process_id: i64,
        step_id: i64,
        status: StepStatus,
    ) -> Result<StepExecution> {
        db.record_execution(
            process_id,
            step_id,
            status,
            &serde_json::json!({"success": status == StepStatus::Completed}),
            &["ran".to_string()],
            1200,
        )
    }

    fn execution_count(db: &MigrationDb) -> Result<i64> {
        Ok(db
            .conn
            .query_row("SELECT COUNT(*) FROM step_executions", [], |r| r.get(0))?)
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            names
        };
        for expected in ["migration_processes", "phases", "steps", "step_executions"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
        // Migrations are idempotent
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_file_backed_database_persists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("assistant.db");
        let process_id = {
            let db = MigrationDb::new(&path)?;
            db.ensure_step(TITLE, &assess_step(1))?.process_id
        };
        let db = MigrationDb::new(&path)?;
        assert!(db.get_step(process_id, 1)?.is_some());
        Ok(())
    }

    #[test]
    fn test_ensure_step_creates_process_and_phase_lazily() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        assert!(db.list_processes()?.is_empty());

        let step = db.ensure_step(TITLE, &assess_step(1))?;
        assert_eq!(step.id, 1);
        assert_eq!(step.status, StepStatus::Pending);

        let process = db.get_process_by_title(TITLE)?.expect("process should exist");
        assert_eq!(process.status, StepStatus::Pending);
        assert_eq!(step.process_id, process.id);
        let phases = db.list_phases(process.id)?;
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].phase_type, PhaseType::AssessExisting);
        assert_eq!(phases[0].title, "Assess Existing Environment");
        assert_eq!(phases[0].icon.as_deref(), Some("Search"));
        assert_eq!(step.phase_id, phases[0].id);
        Ok(())
    }

    #[test]
    fn test_ensure_step_is_idempotent() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let first = db.ensure_step(TITLE, &assess_step(1))?;
        let second = db.ensure_step(TITLE, &assess_step(1))?;
        assert_eq!(first.id, second.id);
        assert_eq!(db.list_steps(first.phase_id)?.len(), 1);
        assert_eq!(db.list_processes()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_ensure_step_refreshes_metadata_but_keeps_status() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let first = db.ensure_step(TITLE, &assess_step(1))?;
        db.ensure_step(TITLE, &assess_step(2))?;
        record(&db, first.process_id, 1, StepStatus::Failed)?;

        let mut updated = assess_step(1);
        updated.title = "Check RAM shares".into();
        updated.automation_type = AutomationType::Manual;
        updated.requires_confirmation = true;
        let step = db.ensure_step(TITLE, &updated)?;

        assert_eq!(step.title, "Check RAM shares");
        assert_eq!(step.automation_type, AutomationType::Manual);
        assert!(step.requires_confirmation);
        assert_eq!(step.status, StepStatus::Failed);
        Ok(())
    }

    #[test]
    fn test_ensure_step_with_other_phase_type_keeps_phase() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let original = db.ensure_step(TITLE, &assess_step(1))?;

        let moved = db.ensure_step(TITLE, &NewStep::new(1, "Check 1", PhaseType::Migration))?;
        assert_eq!(moved.phase_id, original.phase_id);

        let phases = db.list_phases(original.process_id)?;
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].phase_type, PhaseType::AssessExisting);
        Ok(())
    }

    #[test]
    fn test_same_step_id_is_scoped_per_process() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step_a = db.ensure_step("Org A", &assess_step(1))?;
        let step_b = db.ensure_step("Org B", &assess_step(1))?;

        assert_ne!(step_a.process_id, step_b.process_id);
        assert_ne!(step_a.phase_id, step_b.phase_id);
        assert_eq!(db.list_steps(step_a.phase_id)?.len(), 1);
        assert_eq!(db.list_steps(step_b.phase_id)?.len(), 1);

        record(&db, step_b.process_id, 1, StepStatus::Completed)?;

        assert_eq!(db.list_phases(step_a.process_id)?.len(), 1);
        let a = db.get_step(step_a.process_id, 1)?.unwrap();
        assert_eq!(a.status, StepStatus::Pending);
        assert!(db.get_latest_execution(step_a.process_id, 1)?.is_none());

        let b_phases = db.list_phases(step_b.process_id)?;
        assert_eq!(b_phases.len(), 2);
        assert_eq!(b_phases[0].status, StepStatus::Completed);
        assert_eq!(b_phases[1].phase_type, PhaseType::PrepareNew);
        let org_a = db.get_process_by_title("Org A")?.unwrap();
        assert_eq!(org_a.status, StepStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_record_execution_checks_step_owner() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        db.ensure_step("Org A", &assess_step(1))?;
        let other = db.create_process("Org B")?;

        let err = record(&db, other.id, 1, StepStatus::Completed).unwrap_err();
        assert!(is_not_found(&err));
        assert_eq!(execution_count(&db)?, 0);
        Ok(())
    }

    #[test]
    fn test_single_step_completion_creates_next_phase() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        record(&db, step.process_id, 1, StepStatus::Completed)?;

        let phase = db.get_phase(step.phase_id)?.unwrap();
        assert_eq!(phase.status, StepStatus::Completed);
        assert_eq!(phase.progress, 100);

        let next = db
            .get_phase_by_type(phase.process_id, PhaseType::PrepareNew)?
            .expect("next phase should be created");
        assert_eq!(next.status, StepStatus::Pending);
        assert_eq!(next.progress, 0);
        assert_eq!(next.title, "Prepare New Environment");

        let step = db.get_step(step.process_id, 1)?.unwrap();
        assert!(step.completed_at.is_some());
        Ok(())
    }

    #[test]
    fn test_mixed_statuses_fail_the_phase() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let mut process_id = 0;
        for id in 1..=3 {
            process_id = db.ensure_step(TITLE, &assess_step(id))?.process_id;
        }
        record(&db, process_id, 1, StepStatus::Completed)?;
        record(&db, process_id, 2, StepStatus::Failed)?;

        let step = db.get_step(process_id, 3)?.unwrap();
        assert_eq!(step.status, StepStatus::Pending);
        let phase = db.get_phase(step.phase_id)?.unwrap();
        assert_eq!(phase.status, StepStatus::Failed);
        assert_eq!(phase.progress, 33);
        assert!(
            db.get_phase_by_type(phase.process_id, PhaseType::PrepareNew)?
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn test_failed_step_can_recover() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        record(&db, step.process_id, 1, StepStatus::Failed)?;
        assert_eq!(db.get_phase(step.phase_id)?.unwrap().status, StepStatus::Failed);

        record(&db, step.process_id, 1, StepStatus::Completed)?;
        let phase = db.get_phase(step.phase_id)?.unwrap();
        assert_eq!(phase.status, StepStatus::Completed);
        assert_eq!(phase.progress, 100);
        Ok(())
    }

    #[test]
    fn test_phase_without_steps_is_left_unchanged() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let process = db.create_process(TITLE)?;
        let phase = db.ensure_phase(process.id, PhaseType::Migration)?;

        let after = db.update_phase_status(phase.id)?.unwrap();
        assert_eq!(after.status, StepStatus::Pending);
        assert_eq!(after.progress, 0);
        assert_eq!(after.updated_at, phase.updated_at);
        Ok(())
    }

    #[test]
    fn test_unexecuted_steps_keep_phase_pending() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        db.ensure_step(TITLE, &assess_step(2))?;

        let phase = db.update_phase_status(step.phase_id)?.unwrap();
        assert_eq!(phase.status, StepStatus::Pending);
        assert_eq!(phase.progress, 0);
        Ok(())
    }

    #[test]
    fn test_update_phase_status_unknown_phase() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        assert!(db.update_phase_status(404)?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_step_status_unknown_step_is_noop() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let process = db.create_process(TITLE)?;
        assert!(
            db.update_step_status(process.id, 99, StepStatus::Completed)?
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn test_update_step_status_only_stamps_completion_when_completed() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let first = db.ensure_step(TITLE, &assess_step(1))?;
        db.ensure_step(TITLE, &assess_step(2))?;

        let step = db
            .update_step_status(first.process_id, 1, StepStatus::InProgress)?
            .unwrap();
        assert!(step.completed_at.is_none());
        let phase = db.get_phase(step.phase_id)?.unwrap();
        assert_eq!(phase.status, StepStatus::InProgress);

        let step = db
            .update_step_status(first.process_id, 1, StepStatus::Completed)?
            .unwrap();
        assert!(step.completed_at.is_some());
        Ok(())
    }

    #[test]
    fn test_next_phase_creation_is_idempotent() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        record(&db, step.process_id, 1, StepStatus::Completed)?;
        record(&db, step.process_id, 1, StepStatus::Completed)?;

        let phase = db.get_phase(step.phase_id)?.unwrap();
        assert!(db.create_next_phase_if_needed(&phase)?.is_none());

        let phases = db.list_phases(phase.process_id)?;
        let prepare = phases
            .iter()
            .filter(|p| p.phase_type == PhaseType::PrepareNew)
            .count();
        assert_eq!(prepare, 1);
        assert_eq!(phases.len(), 2);
        Ok(())
    }

    #[test]
    fn test_last_phase_has_no_successor() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let process = db.create_process(TITLE)?;
        let last = db.ensure_phase(process.id, PhaseType::PostMigration)?;
        assert!(db.create_next_phase_if_needed(&last)?.is_none());
        assert_eq!(db.list_phases(process.id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_phases_listed_in_sequence_order() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let process = db.create_process(TITLE)?;
        db.ensure_phase(process.id, PhaseType::VerifyNew)?;
        db.ensure_phase(process.id, PhaseType::AssessExisting)?;
        db.ensure_phase(process.id, PhaseType::Migration)?;
        let types: Vec<PhaseType> = db
            .list_phases(process.id)?
            .into_iter()
            .map(|p| p.phase_type)
            .collect();
        assert_eq!(
            types,
            vec![
                PhaseType::AssessExisting,
                PhaseType::Migration,
                PhaseType::VerifyNew
            ]
        );
        Ok(())
    }

    #[test]
    fn test_ensure_phase_unknown_process() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let err = db.ensure_phase(12, PhaseType::AssessExisting).unwrap_err();
        assert!(is_not_found(&err));
        Ok(())
    }

    #[test]
    fn test_processes_are_independent() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let a = db.ensure_step("Org A", &assess_step(1))?;
        let b = db.ensure_step("Org B", &assess_step(2))?;
        record(&db, a.process_id, 1, StepStatus::Completed)?;

        assert_eq!(db.list_phases(a.process_id)?.len(), 2);
        assert_eq!(db.list_phases(b.process_id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_record_execution_unknown_step_writes_nothing() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let process = db.create_process(TITLE)?;
        let err = record(&db, process.id, 77, StepStatus::Completed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::StepNotFound { id: 77 })
        ));
        assert_eq!(execution_count(&db)?, 0);
        Ok(())
    }

    #[test]
    fn test_cascade_rolls_back_on_storage_fault() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        // Make the phase update fail halfway through the cascade.
        db.conn.execute_batch(
            "CREATE TRIGGER reject_phase_update BEFORE UPDATE ON phases
             BEGIN SELECT RAISE(ABORT, 'phase writes disabled'); END;",
        )?;

        assert!(record(&db, step.process_id, 1, StepStatus::Completed).is_err());

        assert_eq!(execution_count(&db)?, 0);
        let unchanged = db.get_step(step.process_id, step.id)?.unwrap();
        assert_eq!(unchanged.status, StepStatus::Pending);
        assert!(unchanged.completed_at.is_none());
        Ok(())
    }

    #[test]
    fn test_execution_payload_roundtrips_opaquely() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        let payload = serde_json::json!({
            "success": true,
            "message": "2 shares found",
            "shares": [{"arn": "arn:aws:ram::1:share/a"}, {"arn": "arn:aws:ram::1:share/b"}]
        });
        let logs = vec!["one".to_string(), "two".to_string()];
        let execution =
            db.record_execution(step.process_id, 1, StepStatus::Completed, &payload, &logs, 4200)?;
        let fetched = db.get_execution(execution.id)?.unwrap();
        assert_eq!(fetched.process_id, step.process_id);
        assert_eq!(fetched.result, payload);
        assert_eq!(fetched.logs, logs);
        assert_eq!(fetched.duration_ms, 4200);
        Ok(())
    }

    #[test]
    fn test_latest_execution_is_most_recent() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(1))?;
        assert!(db.get_latest_execution(step.process_id, 1)?.is_none());

        record(&db, step.process_id, 1, StepStatus::Failed)?;
        let second = record(&db, step.process_id, 1, StepStatus::Completed)?;
        let latest = db.get_latest_execution(step.process_id, 1)?.unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.status, StepStatus::Completed);
        Ok(())
    }

    #[test]
    fn test_history_newest_first_with_paging() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let pid = db.ensure_step(TITLE, &assess_step(1))?.process_id;
        let a = record(&db, pid, 1, StepStatus::Failed)?;
        let b = record(&db, pid, 1, StepStatus::Failed)?;
        let c = record(&db, pid, 1, StepStatus::Completed)?;

        let all = db.get_execution_history(pid, 1, 100, 0)?;
        let ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let page = db.get_execution_history(pid, 1, 1, 1)?;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, b.id);
        Ok(())
    }

    #[test]
    fn test_history_without_executions_is_not_found() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let pid = db.ensure_step(TITLE, &assess_step(1))?.process_id;
        let err = db.get_execution_history(pid, 1, 100, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::NoExecutions { step_id: 1 })
        ));

        let err = db.get_execution_history(pid, 5, 100, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::StepNotFound { id: 5 })
        ));
        Ok(())
    }

    #[test]
    fn test_process_rollup_follows_steps() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let pid = db.ensure_step(TITLE, &assess_step(1))?.process_id;
        db.ensure_step(TITLE, &assess_step(2))?;

        record(&db, pid, 1, StepStatus::Completed)?;
        let process = db.get_process_by_title(TITLE)?.unwrap();
        assert_eq!(process.status, StepStatus::InProgress);
        assert_eq!(process.progress, 50);
        assert!(process.completed_at.is_none());
        Ok(())
    }

    #[test]
    fn test_full_sequence_completes_process() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        for (id, phase_type) in PhaseType::SEQUENCE.iter().enumerate() {
            let id = id as i64 + 1;
            let step = db.ensure_step(TITLE, &NewStep::new(id, "step", *phase_type))?;
            record(&db, step.process_id, id, StepStatus::Completed)?;
        }
        let process = db.get_process_by_title(TITLE)?.unwrap();
        assert_eq!(process.status, StepStatus::Completed);
        assert_eq!(process.progress, 100);
        assert!(process.completed_at.is_some());

        let detail = db.get_process_detail(process.id)?.unwrap();
        assert_eq!(detail.phases.len(), 5);
        assert!(detail.phases.iter().all(|p| p.phase.status == StepStatus::Completed));
        Ok(())
    }

    #[test]
    fn test_phase_detail_lists_steps() -> Result<()> {
        let db = MigrationDb::new_in_memory()?;
        let step = db.ensure_step(TITLE, &assess_step(2))?;
        db.ensure_step(TITLE, &assess_step(1))?;
        let detail = db.get_phase_detail(step.phase_id)?.unwrap();
        let ids: Vec<i64> = detail.steps.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(db.get_phase_detail(999)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(MigrationDb::new_in_memory()?);
        let step = handle
            .call(|db| db.ensure_step(TITLE, &NewStep::new(1, "Check", PhaseType::AssessExisting)))
            .await?;
        assert_eq!(step.id, 1);
        let fetched = handle.lock_sync()?.get_step(step.process_id, 1)?;
        assert!(fetched.is_some());
        Ok(())
    }
}
