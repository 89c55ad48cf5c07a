//! Run audit trail in the `run_records` table.

use chrono::{DateTime, Utc};
use daybreak_core::db::Database;
use daybreak_core::error::Result;
use daybreak_core::traits::RunRecorder;
use daybreak_core::types::{RunRecord, RunStatus};

#[derive(Clone)]
pub struct SqliteRunRecorder {
    db: Database,
}

impl SqliteRunRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn insert(&self, record: &RunRecord) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO run_records (timestamp, status, content_summary, error_message)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    record.timestamp.to_rfc3339(),
                    record.status.as_str(),
                    record.content_summary,
                    record.error_message,
                ],
            )
        })?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, status, content_summary, error_message
                 FROM run_records ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], |row| {
                let timestamp: String = row.get(0)?;
                let status: String = row.get(1)?;
                Ok(RunRecord {
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                    status: RunStatus::parse(&status),
                    content_summary: row.get(2)?,
                    error_message: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }
}

impl RunRecorder for SqliteRunRecorder {
    fn record(&self, record: RunRecord) {
        match self.insert(&record) {
            Ok(()) => tracing::info!(
                "🗒️ Run recorded: {} ({})",
                record.status,
                record.content_summary
            ),
            Err(e) => tracing::error!(
                "❌ Failed to record {} run: {e} (summary: {}, error: {:?})",
                record.status,
                record.content_summary,
                record.error_message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let recorder = SqliteRunRecorder::new(Database::open_in_memory().unwrap());
        recorder.record(RunRecord::success("5 sections, errors: []"));
        recorder.record(RunRecord::error("4 sections, errors: [weather: down]", "discord webhook error 401"));

        let runs = recorder.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert_eq!(runs[0].error_message.as_deref(), Some("discord webhook error 401"));
        assert_eq!(runs[1].status, RunStatus::Success);
        assert_eq!(runs[1].error_message, None);
    }

    #[test]
    fn test_recent_runs_limit() {
        let recorder = SqliteRunRecorder::new(Database::open_in_memory().unwrap());
        for i in 0..5 {
            recorder.record(RunRecord::success(format!("run {i}")));
        }
        let runs = recorder.recent_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].content_summary, "run 4");
    }

    #[test]
    fn test_timestamp_round_trips() {
        let recorder = SqliteRunRecorder::new(Database::open_in_memory().unwrap());
        let record = RunRecord::success("x");
        let at = record.timestamp;
        recorder.record(record);
        assert_eq!(recorder.recent_runs(1).unwrap()[0].timestamp, at);
    }
}
