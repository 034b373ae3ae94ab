use analyst::{AnalystError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{AuditSink, FeedbackRecord, QueryLogRecord};

/// In-process audit sink; records are kept in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    queries: Mutex<Vec<QueryLogRecord>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with a logging error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<QueryLogRecord> {
        self.queries.lock().unwrap().clone()
    }

    pub fn feedback(&self) -> Vec<FeedbackRecord> {
        self.feedback.lock().unwrap().clone()
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnalystError::logging(format!("Failed to log {}: sink unavailable", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_query(&self, record: &QueryLogRecord) -> Result<()> {
        self.check("query")?;
        self.queries.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn log_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        self.check("feedback")?;
        self.feedback.lock().unwrap().push(record.clone());
        Ok(())
    }
}
