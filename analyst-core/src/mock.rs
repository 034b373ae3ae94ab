//! Scripted stand-ins for the analyst service and the warehouse
//!
//! Used by the unit and integration tests; no network access.

use analyst::{
    AnalystApi, AnalystError, AnalystResponse, ContentBlock, Endpoint, Message, RemoteApiError,
    ResponseMessage, Result, SummaryRequest, Table, Warehouse, Warning,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A recorded feedback submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCall {
    pub request_id: String,
    pub positive: bool,
    pub feedback_message: String,
}

/// Analyst service replaying queued responses.
///
/// With nothing queued, messages get a plain text reply, feedback succeeds
/// and summaries are unavailable.
#[derive(Default)]
pub struct MockAnalyst {
    replies: Mutex<VecDeque<Result<AnalystResponse>>>,
    feedback_results: Mutex<VecDeque<Result<()>>>,
    summaries: Mutex<VecDeque<Result<String>>>,
    sent: Mutex<Vec<(Vec<Message>, String)>>,
    feedback_calls: Mutex<Vec<FeedbackCall>>,
    summary_calls: Mutex<Vec<SummaryRequest>>,
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    /// A successful response body
    pub fn reply(content: Vec<ContentBlock>, request_id: &str) -> AnalystResponse {
        AnalystResponse {
            message: ResponseMessage { content },
            request_id: Some(request_id.to_string()),
            warnings: Vec::new(),
        }
    }

    pub fn reply_with_warnings(content: Vec<ContentBlock>, request_id: &str, warnings: &[&str]) -> AnalystResponse {
        AnalystResponse {
            warnings: warnings
                .iter()
                .map(|w| Warning {
                    message: w.to_string(),
                })
                .collect(),
            ..Self::reply(content, request_id)
        }
    }

    /// An error status from the given endpoint
    pub fn api_error(endpoint: Endpoint, status: u16, request_id: &str, error_code: &str, message: &str) -> AnalystError {
        AnalystError::RemoteApi(RemoteApiError {
            endpoint,
            status,
            request_id: Some(request_id.to_string()),
            error_code: Some(error_code.to_string()),
            message: Some(message.to_string()),
        })
    }

    pub fn push_reply(&self, reply: Result<AnalystResponse>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_feedback(&self, result: Result<()>) {
        self.feedback_results.lock().unwrap().push_back(result);
    }

    pub fn push_summary(&self, summary: Result<String>) {
        self.summaries.lock().unwrap().push_back(summary);
    }

    /// Every history sent to the message endpoint, with its model path
    pub fn sent(&self) -> Vec<(Vec<Message>, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn feedback_calls(&self) -> Vec<FeedbackCall> {
        self.feedback_calls.lock().unwrap().clone()
    }

    pub fn summary_calls(&self) -> Vec<SummaryRequest> {
        self.summary_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalystApi for MockAnalyst {
    async fn send_message(&self, history: &[Message], model_path: &str) -> Result<AnalystResponse> {
        let turn = {
            let mut sent = self.sent.lock().unwrap();
            sent.push((history.to_vec(), model_path.to_string()));
            sent.len()
        };
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Self::reply(
                vec![ContentBlock::text(format!("reply {}", turn))],
                &format!("req-{}", turn),
            ))
        })
    }

    async fn submit_feedback(&self, request_id: &str, positive: bool, feedback_message: &str) -> Result<()> {
        self.feedback_calls.lock().unwrap().push(FeedbackCall {
            request_id: request_id.to_string(),
            positive,
            feedback_message: feedback_message.to_string(),
        });
        self.feedback_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        self.summary_calls.lock().unwrap().push(request.clone());
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AnalystError::SummarizationUnavailable))
    }
}

enum Matcher {
    Exact(String),
    Prefix(String),
}

impl Matcher {
    fn matches(&self, sql: &str) -> bool {
        match self {
            Matcher::Exact(s) => sql == s,
            Matcher::Prefix(p) => sql.starts_with(p.as_str()),
        }
    }
}

enum Outcome {
    Table(Table),
    Error(String),
}

/// Warehouse answering statements from a rule list; the first matching rule
/// wins and unmatched statements return an empty table
#[derive(Default)]
pub struct MockWarehouse {
    rules: Vec<(Matcher, Outcome)>,
    executed: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, sql: &str, table: Table) -> Self {
        self.rules.push((Matcher::Exact(sql.to_string()), Outcome::Table(table)));
        self
    }

    pub fn with_error(mut self, sql: &str, message: &str) -> Self {
        self.rules
            .push((Matcher::Exact(sql.to_string()), Outcome::Error(message.to_string())));
        self
    }

    pub fn with_prefix(mut self, prefix: &str, table: Table) -> Self {
        self.rules.push((Matcher::Prefix(prefix.to_string()), Outcome::Table(table)));
        self
    }

    pub fn with_prefix_error(mut self, prefix: &str, message: &str) -> Self {
        self.rules
            .push((Matcher::Prefix(prefix.to_string()), Outcome::Error(message.to_string())));
        self
    }

    /// Statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, sql: &str) -> Result<Table> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.rules.iter().find(|(m, _)| m.matches(sql)) {
            Some((_, Outcome::Table(table))) => Ok(table.clone()),
            Some((_, Outcome::Error(message))) => Err(AnalystError::sql(message.clone())),
            None => Ok(Table::default()),
        }
    }
}
