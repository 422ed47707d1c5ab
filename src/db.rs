//! Run ledger: one row per processed link, per run. Write-only from the
//! pipeline's point of view; nothing here is read back to skip work.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::batch::{CohortReport, ItemOutcome};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id          TEXT PRIMARY KEY,
            model       TEXT NOT NULL,
            started_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS items (
            id          INTEGER PRIMARY KEY,
            run_id      TEXT NOT NULL REFERENCES runs(id),
            gene        TEXT NOT NULL,
            outcome     TEXT NOT NULL
                        CHECK(outcome IN ('written','fetch_failed','malformed','sink_failed')),
            link        TEXT NOT NULL,
            trial_id    TEXT,
            doc_index   INTEGER,
            title       TEXT,
            path        TEXT,
            answered    BOOLEAN,
            attempts    INTEGER,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_items_run ON items(run_id);
        CREATE INDEX IF NOT EXISTS idx_items_gene ON items(gene);
        ",
    )?;
    Ok(())
}

pub fn new_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}

pub fn insert_run(conn: &Connection, run_id: &str, model: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (id, model) VALUES (?1, ?2)",
        rusqlite::params![run_id, model],
    )?;
    Ok(())
}

/// Flat row for the `items` table.
#[derive(Default)]
struct ItemRow<'a> {
    outcome: &'a str,
    link: &'a str,
    trial_id: Option<&'a str>,
    doc_index: Option<i64>,
    title: Option<&'a str>,
    path: Option<String>,
    answered: Option<bool>,
    attempts: Option<u32>,
    status: Option<u16>,
    error: Option<&'a str>,
    latency_ms: Option<i64>,
}

fn to_row(outcome: &ItemOutcome) -> ItemRow<'_> {
    match outcome {
        ItemOutcome::Malformed { link, error } => ItemRow {
            outcome: "malformed",
            link,
            error: Some(error.as_str()),
            ..Default::default()
        },
        ItemOutcome::FetchFailed {
            link,
            trial_id,
            status,
            error,
            latency_ms,
        } => ItemRow {
            outcome: "fetch_failed",
            link,
            trial_id: Some(trial_id.as_str()),
            status: *status,
            error: Some(error.as_str()),
            latency_ms: Some(*latency_ms),
            ..Default::default()
        },
        ItemOutcome::Written {
            index,
            link,
            trial_id,
            title,
            path,
            answered,
            attempts,
            latency_ms,
        } => ItemRow {
            outcome: "written",
            link,
            trial_id: Some(trial_id.as_str()),
            doc_index: Some(*index as i64),
            title: Some(title.as_str()),
            path: Some(path.display().to_string()),
            answered: Some(*answered),
            attempts: Some(*attempts),
            latency_ms: Some(*latency_ms),
            ..Default::default()
        },
        ItemOutcome::SinkFailed {
            index,
            link,
            trial_id,
            error,
        } => ItemRow {
            outcome: "sink_failed",
            link,
            trial_id: Some(trial_id.as_str()),
            doc_index: Some(*index as i64),
            error: Some(error.as_str()),
            ..Default::default()
        },
    }
}

pub fn save_report(conn: &Connection, run_id: &str, report: &CohortReport) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO items
             (run_id, gene, outcome, link, trial_id, doc_index, title, path,
              answered, attempts, status, error, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for outcome in &report.outcomes {
            let r = to_row(outcome);
            stmt.execute(rusqlite::params![
                run_id, report.gene, r.outcome, r.link, r.trial_id, r.doc_index, r.title,
                r.path, r.answered, r.attempts, r.status, r.error, r.latency_ms,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub struct Stats {
    pub runs: i64,
    pub written: i64,
    pub unanswered: i64,
    pub fetch_failed: i64,
    pub malformed: i64,
    pub sink_failed: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let count = |outcome: &str| -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM items WHERE outcome = ?1",
            [outcome],
            |r| r.get(0),
        )?)
    };
    let unanswered: i64 = conn.query_row(
        "SELECT COUNT(*) FROM items WHERE outcome = 'written' AND answered = 0",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        runs,
        written: count("written")?,
        unanswered,
        fetch_failed: count("fetch_failed")?,
        malformed: count("malformed")?,
        sink_failed: count("sink_failed")?,
    })
}

/// Per-gene documents written, for the stats table.
pub fn written_by_gene(conn: &Connection) -> Result<Vec<(String, i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT gene,
                SUM(outcome = 'written'),
                SUM(outcome = 'fetch_failed')
         FROM items GROUP BY gene ORDER BY gene",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
