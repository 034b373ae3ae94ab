//! Append-only audit trail of executed queries and submitted feedback
//!
//! Sinks only write. Deduplication per request id is the session's job;
//! a sink asked to write twice writes twice.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;
mod warehouse;

pub use memory::MemoryAuditSink;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditSink;
pub use warehouse::WarehouseAuditSink;

use analyst::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_question: String,
    pub sql_query: String,
    pub result_summary: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub positive: bool,
    pub feedback_message: String,
    pub user_id: String,
}

/// Durable destination for audit records.
///
/// Failures come back as `AnalystError::Logging`; callers downgrade them to
/// a notification and carry on with the turn.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_query(&self, record: &QueryLogRecord) -> Result<()>;

    async fn log_feedback(&self, record: &FeedbackRecord) -> Result<()>;
}

#[async_trait]
impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    async fn log_query(&self, record: &QueryLogRecord) -> Result<()> {
        (**self).log_query(record).await
    }

    async fn log_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        (**self).log_feedback(record).await
    }
}

/// Auditing disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn log_query(&self, _record: &QueryLogRecord) -> Result<()> {
        Ok(())
    }

    async fn log_feedback(&self, _record: &FeedbackRecord) -> Result<()> {
        Ok(())
    }
}

/// Quote a value as a SQL string literal. Single quotes are doubled and
/// backslashes escaped, since the warehouse treats `\` as an escape in
/// single-quoted strings.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}
