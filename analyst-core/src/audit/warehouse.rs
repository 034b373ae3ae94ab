use analyst::{AnalystError, Result, Warehouse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::{sql_literal, AuditSink, FeedbackRecord, QueryLogRecord};

/// Writes audit records into warehouse tables with INSERT statements.
///
/// Give it the uncached warehouse: inserts must always run.
pub struct WarehouseAuditSink {
    warehouse: Arc<dyn Warehouse>,
    query_log_table: String,
    feedback_table: String,
}

fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    format!("TO_TIMESTAMP_NTZ('{}')", ts.format("%Y-%m-%d %H:%M:%S%.3f"))
}

impl WarehouseAuditSink {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        query_log_table: impl Into<String>,
        feedback_table: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            query_log_table: query_log_table.into(),
            feedback_table: feedback_table.into(),
        }
    }

    pub fn query_insert(&self, record: &QueryLogRecord) -> String {
        format!(
            "INSERT INTO {} (request_id, timestamp, user_question, sql_query, result_summary, user_id) \
             VALUES ({}, {}, {}, {}, {}, {})",
            self.query_log_table,
            sql_literal(&record.request_id),
            timestamp_literal(&record.timestamp),
            sql_literal(&record.user_question),
            sql_literal(&record.sql_query),
            sql_literal(&record.result_summary),
            sql_literal(&record.user_id),
        )
    }

    pub fn feedback_insert(&self, record: &FeedbackRecord) -> String {
        format!(
            "INSERT INTO {} (request_id, timestamp, positive, feedback_message, user_id) \
             VALUES ({}, {}, {}, {}, {})",
            self.feedback_table,
            sql_literal(&record.request_id),
            timestamp_literal(&record.timestamp),
            if record.positive { "TRUE" } else { "FALSE" },
            sql_literal(&record.feedback_message),
            sql_literal(&record.user_id),
        )
    }

    async fn run(&self, statement: &str, what: &str) -> Result<()> {
        debug!(table = what, "writing audit record");
        self.warehouse
            .execute(statement)
            .await
            .map(|_| ())
            .map_err(|e| AnalystError::logging(format!("Failed to log {}: {}", what, e)))
    }
}

#[async_trait]
impl AuditSink for WarehouseAuditSink {
    async fn log_query(&self, record: &QueryLogRecord) -> Result<()> {
        self.run(&self.query_insert(record), "query").await
    }

    async fn log_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        self.run(&self.feedback_insert(record), "feedback").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWarehouse;
    use chrono::TimeZone;

    fn query_record() -> QueryLogRecord {
        QueryLogRecord {
            request_id: "r1".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            user_question: "What's the top region?".into(),
            sql_query: "SELECT region FROM sales WHERE name = 'x'".into(),
            result_summary: "East leads".into(),
            user_id: "JDOE".into(),
        }
    }

    #[tokio::test]
    async fn test_query_insert_is_escaped() {
        let warehouse = Arc::new(MockWarehouse::new());
        let sink = WarehouseAuditSink::new(warehouse.clone(), "DB.S.QUERY_LOG", "DB.S.QUERY_FEEDBACK");
        sink.log_query(&query_record()).await.unwrap();

        let executed = warehouse.executed();
        assert_eq!(executed.len(), 1);
        let stmt = &executed[0];
        assert!(stmt.starts_with("INSERT INTO DB.S.QUERY_LOG "));
        assert!(stmt.contains("'What''s the top region?'"));
        assert!(stmt.contains("'SELECT region FROM sales WHERE name = ''x'''"));
        assert!(stmt.contains("TO_TIMESTAMP_NTZ('2024-05-01 09:30:00.000')"));
    }

    #[tokio::test]
    async fn test_feedback_insert_uses_boolean() {
        let warehouse = Arc::new(MockWarehouse::new());
        let sink = WarehouseAuditSink::new(warehouse.clone(), "Q", "F");
        sink.log_feedback(&FeedbackRecord {
            request_id: "r1".into(),
            timestamp: Utc::now(),
            positive: false,
            feedback_message: "wrong join".into(),
            user_id: "JDOE".into(),
        })
        .await
        .unwrap();

        let stmt = &warehouse.executed()[0];
        assert!(stmt.starts_with("INSERT INTO F "));
        assert!(stmt.contains(", FALSE, 'wrong join', 'JDOE')"));
    }

    #[tokio::test]
    async fn test_failure_becomes_logging_error() {
        let warehouse = Arc::new(MockWarehouse::new().with_prefix_error("INSERT INTO", "insufficient privileges"));
        let sink = WarehouseAuditSink::new(warehouse, "Q", "F");
        let err = sink.log_query(&query_record()).await.unwrap_err();
        assert!(matches!(err, AnalystError::Logging { .. }));
        assert_eq!(err.to_string(), "Failed to log query: insufficient privileges");
    }
}
