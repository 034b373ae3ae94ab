//! SQLite-backed audit log for running without warehouse write access

use analyst::{AnalystError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{AuditSink, FeedbackRecord, QueryLogRecord};

pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

fn logging_error(what: &str, e: rusqlite::Error) -> AnalystError {
    AnalystError::logging(format!("Failed to log {}: {}", what, e))
}

impl SqliteAuditSink {
    /// Open or create the audit database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| logging_error("setup", e))?;
        let sink = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    /// In-memory database (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| logging_error("setup", e))?;
        let sink = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // Timestamps are RFC 3339 text in UTC
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_log (
                request_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                user_question TEXT NOT NULL,
                sql_query TEXT NOT NULL,
                result_summary TEXT NOT NULL,
                user_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS query_feedback (
                request_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                positive INTEGER NOT NULL,
                feedback_message TEXT NOT NULL,
                user_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_query_log_request ON query_log(request_id);
            CREATE INDEX IF NOT EXISTS idx_query_feedback_request ON query_feedback(request_id);
            "#,
        )
        .map_err(|e| logging_error("setup", e))
    }

    pub fn query_count(&self) -> Result<usize> {
        self.count("query_log")
    }

    pub fn feedback_count(&self) -> Result<usize> {
        self.count("query_feedback")
    }

    fn count(&self, table: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .map_err(|e| logging_error("count", e))
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn log_query(&self, record: &QueryLogRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO query_log (request_id, timestamp, user_question, sql_query, result_summary, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.request_id,
                record.timestamp.to_rfc3339(),
                record.user_question,
                record.sql_query,
                record.result_summary,
                record.user_id,
            ],
        )
        .map_err(|e| logging_error("query", e))?;
        Ok(())
    }

    async fn log_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO query_feedback (request_id, timestamp, positive, feedback_message, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.request_id,
                record.timestamp.to_rfc3339(),
                record.positive,
                record.feedback_message,
                record.user_id,
            ],
        )
        .map_err(|e| logging_error("feedback", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sqlite_sink_writes_with_bound_params() {
        let sink = SqliteAuditSink::in_memory().unwrap();
        sink.log_query(&QueryLogRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            user_question: "O'Brien's total?".into(),
            sql_query: "SELECT 1".into(),
            result_summary: "one".into(),
            user_id: "unknown".into(),
        })
        .await
        .unwrap();
        sink.log_feedback(&FeedbackRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            positive: true,
            feedback_message: String::new(),
            user_id: "unknown".into(),
        })
        .await
        .unwrap();

        assert_eq!(sink.query_count().unwrap(), 1);
        assert_eq!(sink.feedback_count().unwrap(), 1);

        let conn = sink.conn.lock().unwrap();
        let question: String = conn
            .query_row("SELECT user_question FROM query_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(question, "O'Brien's total?");
    }
}
