//! Turn orchestration for one user session
//!
//! `AnalystSession` owns the session state and drives each turn to
//! completion: append the question, call the analyst service, append the
//! reply, render it. Feedback submission and model selection live here too.

use analyst::{AnalystApi, ContentBlock, Message, Warning};
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditSink, FeedbackRecord};
use crate::events::Notification;
use crate::feedback::FeedbackOutcome;
use crate::render::{render_message, RenderedMessage};
use crate::session::SessionState;
use crate::summarize::SqlPipeline;

/// Synthetic first question asked when a conversation is empty
pub const WELCOME_PROMPT: &str = "What questions can I ask?";

pub struct AnalystSession {
    api: Arc<dyn AnalystApi>,
    pipeline: SqlPipeline,
    audit: Arc<dyn AuditSink>,
    models: Vec<String>,
    state: SessionState,
}

impl AnalystSession {
    /// Start on the first of `models`, which must not be empty
    pub fn new(
        api: Arc<dyn AnalystApi>,
        pipeline: SqlPipeline,
        audit: Arc<dyn AuditSink>,
        models: Vec<String>,
    ) -> Result<Self> {
        let Some(first) = models.first().cloned() else {
            bail!("at least one semantic model is required");
        };
        Ok(Self {
            api,
            pipeline,
            audit,
            models,
            state: SessionState::new(first),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn semantic_model(&self) -> &str {
        self.state.semantic_model()
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.state.set_user_id(user_id);
    }

    pub fn warnings(&self) -> &[Warning] {
        self.state.warnings()
    }

    /// Ask the welcome question if the conversation is empty
    pub async fn start(&mut self) -> Vec<RenderedMessage> {
        if !self.state.is_empty() {
            return Vec::new();
        }
        self.process_user_input(WELCOME_PROMPT).await
    }

    /// Run one full turn for `prompt`; returns the rendered user and analyst messages
    #[instrument(level = "info", skip(self), fields(model = %self.state.semantic_model()))]
    pub async fn process_user_input(&mut self, prompt: &str) -> Vec<RenderedMessage> {
        self.state.clear_warnings();
        self.state.append(Message::user(prompt));
        let user_index = self.state.len() - 1;

        let result = self
            .api
            .send_message(self.state.messages(), self.state.semantic_model())
            .await;

        let reply = match result {
            Ok(response) => {
                debug!(request_id = ?response.request_id, blocks = response.message.content.len(), "analyst replied");
                self.state.set_warnings(response.warnings);
                Message::analyst(response.message.content, response.request_id)
            }
            Err(e) => {
                warn!("analyst request failed: {}", e);
                let request_id = e.remote().and_then(|r| r.request_id.clone());
                self.state.events().push(Notification::ApiError);
                Message::analyst(vec![ContentBlock::text(e.to_string())], request_id)
            }
        };
        self.state.append(reply);
        self.state.set_active_suggestion(None);

        let mut rendered = Vec::with_capacity(2);
        for index in [user_index, user_index + 1] {
            if let Some(message) = self.render(index).await {
                rendered.push(message);
            }
        }
        rendered
    }

    /// Process typed input if there is any, otherwise the pending suggestion.
    /// The suggestion is cleared before its turn runs.
    pub async fn handle_input(&mut self, typed: Option<&str>) -> Vec<RenderedMessage> {
        let typed = typed.map(str::trim).filter(|t| !t.is_empty());
        if let Some(prompt) = typed {
            return self.process_user_input(prompt).await;
        }
        match self.state.take_active_suggestion() {
            Some(suggestion) => self.process_user_input(&suggestion).await,
            None => Vec::new(),
        }
    }

    /// Pick suggestion `option` from the message at `message_index` and ask it
    pub async fn choose_suggestion(&mut self, message_index: usize, option: usize) -> Result<Vec<RenderedMessage>> {
        let Some(message) = self.state.messages().get(message_index) else {
            bail!("no message at index {}", message_index);
        };
        let suggestion = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Suggestions { suggestions } => Some(suggestions),
                _ => None,
            })
            .flatten()
            .nth(option)
            .cloned();
        let Some(suggestion) = suggestion else {
            bail!("message {} has no suggestion {}", message_index, option);
        };

        self.state.set_active_suggestion(Some(suggestion));
        Ok(self.handle_input(None).await)
    }

    /// Open the feedback form for a request id; false once submitted
    pub fn open_feedback(&mut self, request_id: &str) -> bool {
        self.state.feedback_mut().open(request_id)
    }

    /// Submit feedback once per request id. A successful submission is also
    /// written to the audit log; a failed one stores the error for display.
    #[instrument(level = "info", skip(self, feedback_message))]
    pub async fn submit_feedback(&mut self, request_id: &str, positive: bool, feedback_message: &str) -> FeedbackOutcome {
        if self.state.feedback().is_submitted(request_id) {
            debug!("feedback already submitted");
            return FeedbackOutcome::AlreadySubmitted;
        }

        match self.api.submit_feedback(request_id, positive, feedback_message).await {
            Ok(()) => {
                let record = FeedbackRecord {
                    request_id: request_id.to_string(),
                    timestamp: Utc::now(),
                    positive,
                    feedback_message: feedback_message.to_string(),
                    user_id: self.state.user_id().to_string(),
                };
                if let Err(e) = self.audit.log_feedback(&record).await {
                    warn!("feedback log write failed: {}", e);
                    self.state
                        .events()
                        .push(Notification::LoggingFailed(e.to_string()));
                }
                self.state.feedback_mut().record(request_id, None);
                FeedbackOutcome::Submitted
            }
            Err(e) => {
                let message = e.to_string();
                self.state
                    .feedback_mut()
                    .record(request_id, Some(message.clone()));
                FeedbackOutcome::Failed(message)
            }
        }
    }

    /// Switch to another configured semantic model. Always resets the conversation.
    pub fn select_model(&mut self, path: &str) -> Result<()> {
        if !self.models.iter().any(|m| m == path) {
            bail!("unknown semantic model: {}", path);
        }
        info!(model = path, "semantic model selected");
        self.state.select_semantic_model(path);
        Ok(())
    }

    /// Forget the conversation; the model and user identity are kept
    pub fn clear(&mut self) {
        info!("conversation cleared");
        self.state.reset();
    }

    async fn render(&mut self, index: usize) -> Option<RenderedMessage> {
        render_message(&mut self.state, index, &self.pipeline, self.audit.as_ref()).await
    }

    /// Render every message in order. Query results come from the warehouse
    /// cache when it is enabled, and nothing is logged twice.
    pub async fn render_conversation(&mut self) -> Vec<RenderedMessage> {
        let mut rendered = Vec::with_capacity(self.state.len());
        for index in 0..self.state.len() {
            if let Some(message) = self.render(index).await {
                rendered.push(message);
            }
        }
        rendered
    }

    /// Take the notifications raised since the last call
    pub fn drain_events(&mut self) -> Vec<Notification> {
        self.state.events().drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::feedback::FeedbackView;
    use crate::mock::{MockAnalyst, MockWarehouse};
    use crate::render::RenderItem;
    use crate::summarize::EndpointSummarizer;
    use analyst::{Endpoint, Role};

    struct Fixture {
        api: Arc<MockAnalyst>,
        audit: Arc<MemoryAuditSink>,
        session: AnalystSession,
    }

    fn fixture() -> Fixture {
        let api = Arc::new(MockAnalyst::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let pipeline = SqlPipeline::new(
            Arc::new(MockWarehouse::new()),
            Arc::new(EndpointSummarizer::new(api.clone())),
        );
        let session = AnalystSession::new(
            api.clone(),
            pipeline,
            audit.clone(),
            vec!["DB.S.STAGE/sales.yaml".into(), "DB.S.STAGE/rx.yaml".into()],
        )
        .unwrap();
        Fixture { api, audit, session }
    }

    #[test]
    fn test_requires_a_model() {
        let api = Arc::new(MockAnalyst::new());
        let pipeline = SqlPipeline::new(
            Arc::new(MockWarehouse::new()),
            Arc::new(EndpointSummarizer::new(api.clone())),
        );
        assert!(AnalystSession::new(api, pipeline, Arc::new(MemoryAuditSink::new()), vec![]).is_err());
    }

    #[tokio::test]
    async fn test_start_asks_welcome_question_once() {
        let mut f = fixture();
        let rendered = f.session.start().await;
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].items, vec![RenderItem::Markdown(WELCOME_PROMPT.into())]);
        assert!(f.session.start().await.is_empty());

        let sent = f.api.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "DB.S.STAGE/sales.yaml");
    }

    #[tokio::test]
    async fn test_success_appends_reply_without_notification() {
        let mut f = fixture();
        f.api.push_reply(Ok(MockAnalyst::reply(vec![ContentBlock::text("hello")], "r1")));

        f.session.process_user_input("hi").await;
        let messages = f.session.state().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, vec![ContentBlock::text("hello")]);
        assert_eq!(messages[1].request_id.as_deref(), Some("r1"));
        assert!(f.session.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_becomes_reply_and_notifies_once() {
        let mut f = fixture();
        f.api.push_reply(Err(MockAnalyst::api_error(Endpoint::Message, 400, "r2", "E1", "bad model")));

        f.session.process_user_input("hi").await;
        let reply = &f.session.state().messages()[1];
        assert_eq!(reply.role, Role::Analyst);
        assert_eq!(reply.content.len(), 1);
        let text = reply.get_text();
        assert!(text.contains("r2") && text.contains("E1") && text.contains("bad model"));
        assert_eq!(reply.request_id.as_deref(), Some("r2"));

        assert_eq!(f.session.drain_events(), vec![Notification::ApiError]);
        assert!(f.session.drain_events().is_empty());

        // the session keeps working
        f.session.process_user_input("again").await;
        assert_eq!(f.session.state().len(), 4);
        assert!(f.session.state().is_alternating());
    }

    #[tokio::test]
    async fn test_history_is_sent_in_full() {
        let mut f = fixture();
        f.session.process_user_input("one").await;
        f.session.process_user_input("two").await;

        let sent = f.api.sent();
        assert_eq!(sent[1].0.len(), 3);
        assert_eq!(sent[1].0[2], Message::user("two"));
    }

    #[tokio::test]
    async fn test_warnings_replaced_each_turn() {
        let mut f = fixture();
        f.api.push_reply(Ok(MockAnalyst::reply_with_warnings(vec![], "r1", &["large table"])));
        f.session.process_user_input("one").await;
        assert_eq!(f.session.warnings()[0].message, "large table");

        f.session.process_user_input("two").await;
        assert!(f.session.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_choose_suggestion_asks_it_and_clears() {
        let mut f = fixture();
        f.api.push_reply(Ok(MockAnalyst::reply(
            vec![ContentBlock::Suggestions {
                suggestions: vec!["Sales by region?".into(), "Top product?".into()],
            }],
            "r1",
        )));
        f.session.process_user_input("What can I ask?").await;

        let rendered = f.session.choose_suggestion(1, 1).await.unwrap();
        assert_eq!(rendered[0].items, vec![RenderItem::Markdown("Top product?".into())]);
        assert_eq!(f.session.state().active_suggestion(), None);
        assert!(f.session.handle_input(None).await.is_empty());
        assert!(f.session.choose_suggestion(1, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_second_suggestion_block_resolves_by_offset() {
        let mut f = fixture();
        f.api.push_reply(Ok(MockAnalyst::reply(
            vec![
                ContentBlock::Suggestions {
                    suggestions: vec!["Sales by region?".into()],
                },
                ContentBlock::Suggestions {
                    suggestions: vec!["Top product?".into()],
                },
            ],
            "r1",
        )));
        let rendered = f.session.handle_input(Some("What can I ask?")).await;
        let Some(RenderItem::Suggestions {
            message_index,
            first_option,
            options,
        }) = rendered[1].items.get(1).cloned()
        else {
            panic!("expected a second suggestions block");
        };
        assert_eq!(options, vec!["Top product?".to_string()]);

        let rendered = f.session.choose_suggestion(message_index, first_option).await.unwrap();
        assert_eq!(rendered[0].items, vec![RenderItem::Markdown("Top product?".into())]);
    }

    #[tokio::test]
    async fn test_feedback_submitted_once() {
        let mut f = fixture();
        assert!(f.session.open_feedback("r1"));
        assert_eq!(f.session.submit_feedback("r1", true, "spot on").await, FeedbackOutcome::Submitted);
        assert_eq!(f.session.state().feedback().view("r1"), FeedbackView::Submitted);
        assert_eq!(
            f.session.submit_feedback("r1", false, "again").await,
            FeedbackOutcome::AlreadySubmitted
        );
        assert!(!f.session.open_feedback("r1"));

        assert_eq!(f.api.feedback_calls().len(), 1);
        let records = f.audit.feedback();
        assert_eq!(records.len(), 1);
        assert!(records[0].positive);
        assert_eq!(records[0].feedback_message, "spot on");
    }

    #[tokio::test]
    async fn test_feedback_failure_is_stored_and_not_logged() {
        let mut f = fixture();
        f.api.push_feedback(Err(MockAnalyst::api_error(Endpoint::Feedback, 404, "r9", "390", "not found")));

        match f.session.submit_feedback("r9", false, "").await {
            FeedbackOutcome::Failed(message) => assert!(message.contains("Feedback API Error")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(f.session.state().feedback().view("r9"), FeedbackView::Failed(_)));
        assert!(f.audit.feedback().is_empty());
        assert_eq!(
            f.session.submit_feedback("r9", true, "").await,
            FeedbackOutcome::AlreadySubmitted
        );
    }

    #[tokio::test]
    async fn test_feedback_log_failure_still_submits() {
        let mut f = fixture();
        f.audit.set_failing(true);
        assert_eq!(f.session.submit_feedback("r1", true, "").await, FeedbackOutcome::Submitted);
        assert!(matches!(f.session.drain_events()[0], Notification::LoggingFailed(_)));
    }

    #[tokio::test]
    async fn test_select_model_resets() {
        let mut f = fixture();
        f.session.process_user_input("one").await;
        f.session.select_model("DB.S.STAGE/rx.yaml").unwrap();
        assert!(f.session.state().is_empty());
        assert_eq!(f.session.semantic_model(), "DB.S.STAGE/rx.yaml");
        assert!(f.session.select_model("nope.yaml").is_err());
        assert_eq!(f.session.semantic_model(), "DB.S.STAGE/rx.yaml");
    }

    #[tokio::test]
    async fn test_clear_then_start_welcomes_again() {
        let mut f = fixture();
        f.session.start().await;
        f.session.clear();
        assert!(f.session.state().is_empty());
        assert_eq!(f.session.start().await.len(), 2);
        assert_eq!(f.api.sent().len(), 2);
    }
}
