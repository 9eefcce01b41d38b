//! TriggerStore implementation with JSONL append log and SQLite index.
//!
//! Trigger records use a dual-storage approach:
//! - **JSONL file**: Append-only log of all trigger changes (source of truth)
//! - **SQLite database**: Query index for fast lookups (rebuilt from JSONL on
//!   startup)
//!
//! Task results, per-day completion keys, meeting warning marks, and alert
//! snooze counters live in SQLite directly; losing them costs at most a
//! duplicate notification, while the trigger log survives any index damage.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::domain::{TaskResult, Trigger, TriggerStatus};
use crate::error::{RemindrError, Result};

/// TriggerStore manages scheduler persistence.
pub struct TriggerStore {
    /// Path to the trigger JSONL file
    jsonl_path: PathBuf,

    /// SQLite connection for queries
    db: Connection,
}

impl TriggerStore {
    /// Open or create a TriggerStore at the specified directory.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        let store_dir = base_dir.join(".triggerstore");
        fs::create_dir_all(&store_dir)?;

        let jsonl_path = store_dir.join("triggers.jsonl");
        let db_path = store_dir.join("triggerstore.db");

        let db = Connection::open(&db_path)?;
        Self::init_schema(&db)?;

        let mut store = Self { jsonl_path, db };

        store.rebuild_index_if_needed()?;

        Ok(store)
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS triggers (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                next_run_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_triggers_kind ON triggers(kind);
            CREATE INDEX IF NOT EXISTS idx_triggers_status ON triggers(status);
            CREATE INDEX IF NOT EXISTS idx_triggers_next_run ON triggers(next_run_at);

            CREATE TABLE IF NOT EXISTS results (
                id TEXT PRIMARY KEY,
                trigger_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_results_trigger ON results(trigger_id);
            CREATE INDEX IF NOT EXISTS idx_results_timestamp ON results(timestamp);

            CREATE TABLE IF NOT EXISTS daily_completions (
                trigger_id TEXT NOT NULL,
                completed_on TEXT NOT NULL,
                PRIMARY KEY (trigger_id, completed_on)
            );

            CREATE TABLE IF NOT EXISTS warning_marks (
                event_id TEXT NOT NULL,
                lead_minutes INTEGER NOT NULL,
                marked_on TEXT NOT NULL,
                PRIMARY KEY (event_id, lead_minutes, marked_on)
            );

            CREATE TABLE IF NOT EXISTS alert_snoozes (
                alert_id TEXT PRIMARY KEY,
                snooze_count INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Rebuild the SQLite trigger index from the JSONL file if needed.
    fn rebuild_index_if_needed(&mut self) -> Result<()> {
        if !self.jsonl_path.exists() {
            return Ok(());
        }

        let jsonl_lines = self.count_jsonl_lines()?;
        let db_count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM triggers", [], |row| row.get(0))
            .unwrap_or(0);

        // Simple heuristic: if the log has more entries than the index,
        // the index is stale or missing
        if jsonl_lines as i64 > db_count || db_count == 0 {
            self.rebuild_index()?;
        }

        Ok(())
    }

    /// Count lines in the JSONL file.
    fn count_jsonl_lines(&self) -> Result<usize> {
        let file = File::open(&self.jsonl_path)?;
        let reader = BufReader::new(file);
        Ok(reader.lines().count())
    }

    /// Rebuild the trigger index from the JSONL file.
    fn rebuild_index(&mut self) -> Result<()> {
        self.db.execute("DELETE FROM triggers", [])?;

        if !self.jsonl_path.exists() {
            return Ok(());
        }

        let file = File::open(&self.jsonl_path)?;
        let reader = BufReader::new(file);

        // Track the latest version of each record; the log is append-only
        let mut records: HashMap<String, Trigger> = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let trigger: Trigger = serde_json::from_str(&line)?;
            records.insert(trigger.id.clone(), trigger);
        }

        let tx = self.db.transaction()?;
        for trigger in records.values() {
            Self::insert_trigger_into_db(&tx, trigger)?;
        }
        tx.commit()?;

        Ok(())
    }

    /// Insert a trigger into the SQLite index.
    fn insert_trigger_into_db(db: &Connection, trigger: &Trigger) -> Result<()> {
        let json_data = serde_json::to_string(trigger)?;

        db.execute(
            r#"
            INSERT OR REPLACE INTO triggers
            (id, kind, status, next_run_at, created_at, updated_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                trigger.id,
                trigger.kind.as_str(),
                trigger.status.as_str(),
                trigger.next_run_at.map(|t| t.timestamp_millis()),
                trigger.created_at,
                trigger.updated_at,
                json_data,
            ],
        )?;

        Ok(())
    }

    /// Save a new or updated trigger record.
    pub fn save_trigger(&mut self, trigger: &Trigger) -> Result<()> {
        // Append to JSONL first (source of truth)
        let json = serde_json::to_string(trigger)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.jsonl_path)?;
        writeln!(file, "{}", json)?;

        // Then update the SQLite index
        Self::insert_trigger_into_db(&self.db, trigger)?;

        Ok(())
    }

    /// Get a trigger by ID.
    pub fn get_trigger(&self, id: &str) -> Result<Option<Trigger>> {
        let result = self
            .db
            .query_row("SELECT json_data FROM triggers WHERE id = ?1", [id], |row| {
                let json: String = row.get(0)?;
                Ok(json)
            });

        match result {
            Ok(json) => {
                let trigger: Trigger = serde_json::from_str(&json)?;
                Ok(Some(trigger))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all triggers.
    pub fn list_triggers(&self) -> Result<Vec<Trigger>> {
        let mut stmt = self
            .db
            .prepare("SELECT json_data FROM triggers ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut triggers = Vec::new();
        for row in rows {
            let json = row?;
            let trigger: Trigger = serde_json::from_str(&json)?;
            triggers.push(trigger);
        }

        Ok(triggers)
    }

    /// List triggers by status.
    pub fn list_triggers_by_status(&self, status: TriggerStatus) -> Result<Vec<Trigger>> {
        let mut stmt = self
            .db
            .prepare("SELECT json_data FROM triggers WHERE status = ?1 ORDER BY created_at")?;
        let rows = stmt.query_map([status.as_str()], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut triggers = Vec::new();
        for row in rows {
            let json = row?;
            let trigger: Trigger = serde_json::from_str(&json)?;
            triggers.push(trigger);
        }

        Ok(triggers)
    }

    /// Delete a trigger and compact the log.
    ///
    /// The JSONL log is rewritten without the deleted record so a later
    /// rebuild cannot resurrect it.
    pub fn delete_trigger(&mut self, id: &str) -> Result<()> {
        let affected = self
            .db
            .execute("DELETE FROM triggers WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(RemindrError::TriggerNotFound(id.to_string()));
        }

        self.rewrite_jsonl()?;
        Ok(())
    }

    /// Rewrite the JSONL log from the current index contents.
    fn rewrite_jsonl(&self) -> Result<()> {
        let triggers = self.list_triggers()?;
        let mut file = File::create(&self.jsonl_path)?;
        for trigger in &triggers {
            writeln!(file, "{}", serde_json::to_string(trigger)?)?;
        }
        Ok(())
    }

    /// Save a task result record.
    pub fn save_result(&mut self, result: &TaskResult) -> Result<()> {
        let json_data = serde_json::to_string(result)?;
        self.db.execute(
            r#"
            INSERT OR REPLACE INTO results (id, trigger_id, timestamp, status, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                result.id,
                result.trigger_id,
                result.timestamp,
                result.status.as_str(),
                json_data,
            ],
        )?;
        Ok(())
    }

    /// List results for a trigger, newest first.
    pub fn list_results(&self, trigger_id: &str, limit: usize) -> Result<Vec<TaskResult>> {
        let mut stmt = self.db.prepare(
            "SELECT json_data FROM results WHERE trigger_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![trigger_id, limit as i64], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut results = Vec::new();
        for row in rows {
            let json = row?;
            let result: TaskResult = serde_json::from_str(&json)?;
            results.push(result);
        }

        Ok(results)
    }

    /// Record a successful completion for (trigger, local date).
    pub fn record_completion(&mut self, trigger_id: &str, date: NaiveDate) -> Result<()> {
        self.db.execute(
            "INSERT OR IGNORE INTO daily_completions (trigger_id, completed_on) VALUES (?1, ?2)",
            params![trigger_id, date.to_string()],
        )?;
        Ok(())
    }

    /// Check whether a trigger already completed on the given local date.
    pub fn has_completion(&self, trigger_id: &str, date: NaiveDate) -> Result<bool> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM daily_completions WHERE trigger_id = ?1 AND completed_on = ?2",
            params![trigger_id, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Record that a meeting warning fired for (event, lead, local date).
    pub fn record_warning_mark(
        &mut self,
        event_id: &str,
        lead_minutes: i64,
        date: NaiveDate,
    ) -> Result<()> {
        self.db.execute(
            "INSERT OR IGNORE INTO warning_marks (event_id, lead_minutes, marked_on) VALUES (?1, ?2, ?3)",
            params![event_id, lead_minutes, date.to_string()],
        )?;
        Ok(())
    }

    /// Check whether a meeting warning already fired today.
    pub fn has_warning_mark(
        &self,
        event_id: &str,
        lead_minutes: i64,
        date: NaiveDate,
    ) -> Result<bool> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM warning_marks WHERE event_id = ?1 AND lead_minutes = ?2 AND marked_on = ?3",
            params![event_id, lead_minutes, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Persist an alert's snooze counter.
    pub fn save_snooze_count(&mut self, alert_id: &str, count: u32) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO alert_snoozes (alert_id, snooze_count, updated_at) VALUES (?1, ?2, ?3)",
            params![alert_id, count, crate::id::now_ms()],
        )?;
        Ok(())
    }

    /// Read back an alert's snooze counter (0 if never snoozed).
    pub fn get_snooze_count(&self, alert_id: &str) -> Result<u32> {
        let result = self.db.query_row(
            "SELECT snooze_count FROM alert_snoozes WHERE alert_id = ?1",
            [alert_id],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(count) => Ok(count as u32),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
