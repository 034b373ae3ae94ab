//! Remote client for the hosted analyst service

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::api::{
    AnalystResponse, ApiErrorBody, FeedbackRequest, Message, MessageRequest, SummaryRequest,
    SummaryResponse,
};
use crate::client::{Client, RawResponse};
use crate::error::{AnalystError, Endpoint, RemoteApiError, Result};
use crate::AnalystApi;

pub const MESSAGE_ENDPOINT: &str = "/api/v2/cortex/analyst/message";
pub const FEEDBACK_ENDPOINT: &str = "/api/v2/cortex/analyst/feedback";
pub const SUMMARY_ENDPOINT: &str = "/api/v2/cortex/analyst/llm_summary";

/// Fixed timeout applied to every analyst endpoint call
pub const API_TIMEOUT: Duration = Duration::from_secs(50);

/// Convert a non-success exchange into a `RemoteApiError`.
/// A body that is not the documented error JSON becomes the message verbatim.
fn api_error(endpoint: Endpoint, raw: &RawResponse) -> AnalystError {
    let body = raw.json::<ApiErrorBody>().unwrap_or_else(|_| ApiErrorBody {
        message: Some(raw.body.clone()),
        ..ApiErrorBody::default()
    });
    AnalystError::RemoteApi(RemoteApiError {
        endpoint,
        status: raw.status,
        request_id: body.request_id,
        error_code: body.error_code,
        message: body.message,
    })
}

/// Classify a message endpoint exchange: status < 400 is success
pub fn interpret_message_response(raw: &RawResponse) -> Result<AnalystResponse> {
    if raw.is_success() {
        raw.json()
    } else {
        Err(api_error(Endpoint::Message, raw))
    }
}

/// Classify a feedback endpoint exchange: only HTTP 200 is success
pub fn interpret_feedback_response(raw: &RawResponse) -> Result<()> {
    if raw.status == 200 {
        Ok(())
    } else {
        Err(api_error(Endpoint::Feedback, raw))
    }
}

/// Classify a summary endpoint exchange; an absent or blank `summary` is unavailable
pub fn interpret_summary_response(raw: &RawResponse) -> Result<String> {
    if !raw.is_success() {
        return Err(api_error(Endpoint::Summary, raw));
    }
    let parsed: SummaryResponse = raw.json()?;
    parsed
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(AnalystError::SummarizationUnavailable)
}

/// HTTP implementation of [`AnalystApi`]. Every call is a single attempt.
#[derive(Clone)]
pub struct CortexClient {
    client: Client,
    timeout: Duration,
}

impl CortexClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: API_TIMEOUT,
        }
    }
}

#[async_trait]
impl AnalystApi for CortexClient {
    #[instrument(level = "debug", skip(self, history), fields(turns = history.len()))]
    async fn send_message(&self, history: &[Message], model_path: &str) -> Result<AnalystResponse> {
        let request = MessageRequest::new(history, model_path);
        let raw = self
            .client
            .post(MESSAGE_ENDPOINT, &request, Some(self.timeout))
            .await?;
        let result = interpret_message_response(&raw);
        match &result {
            Ok(response) => debug!(request_id = ?response.request_id, blocks = response.message.content.len(), "analyst replied"),
            Err(e) => warn!(status = raw.status, "analyst message failed: {}", e),
        }
        result
    }

    #[instrument(level = "debug", skip(self, feedback_message))]
    async fn submit_feedback(&self, request_id: &str, positive: bool, feedback_message: &str) -> Result<()> {
        let request = FeedbackRequest {
            request_id: request_id.to_string(),
            positive,
            feedback_message: feedback_message.to_string(),
        };
        let raw = self
            .client
            .post(FEEDBACK_ENDPOINT, &request, Some(self.timeout))
            .await?;
        interpret_feedback_response(&raw)
    }

    #[instrument(level = "debug", skip(self, request))]
    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        let raw = self
            .client
            .post(SUMMARY_ENDPOINT, request, Some(self.timeout))
            .await?;
        interpret_summary_response(&raw)
    }
}
