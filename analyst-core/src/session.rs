//! Session-scoped conversation state
//!
//! Holds the append-only message log plus the ephemeral UI state of one
//! user session. A single owner passes it by reference into every
//! operation; nothing here is global.

use analyst::{ContentBlock, Message, Role, Warning};
use std::collections::HashSet;

use crate::events::EventQueue;
use crate::feedback::FeedbackLedger;

pub struct SessionState {
    messages: Vec<Message>,
    active_suggestion: Option<String>,
    warnings: Vec<Warning>,
    feedback: FeedbackLedger,
    logged_requests: HashSet<String>,
    semantic_model: String,
    user_id: Option<String>,
    events: EventQueue,
}

impl SessionState {
    /// Create an empty session bound to a semantic model stage path
    pub fn new(semantic_model: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            active_suggestion: None,
            warnings: Vec::new(),
            feedback: FeedbackLedger::new(),
            logged_requests: HashSet::new(),
            semantic_model: semantic_model.into(),
            user_id: None,
            events: EventQueue::new(),
        }
    }

    /// Clear the message log, active suggestion, warnings, feedback map and
    /// logged-request set. Model selection and user identity are kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.active_suggestion = None;
        self.warnings.clear();
        self.feedback.clear();
        self.logged_requests.clear();
    }

    /// Add a message at the end of the log
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// True when roles alternate user, analyst, user, ... from the start
    pub fn is_alternating(&self) -> bool {
        let mut expected = Role::User;
        for message in &self.messages {
            if message.role != expected {
                return false;
            }
            expected = expected.opposite();
        }
        true
    }

    /// Text of the closest user message before `index`, or empty
    pub fn question_before(&self, index: usize) -> String {
        self.messages[..index.min(self.messages.len())]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| {
                m.content.first().and_then(|block| match block {
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                })
            })
            .unwrap_or_default()
    }

    pub fn set_active_suggestion(&mut self, suggestion: Option<String>) {
        self.active_suggestion = suggestion;
    }

    pub fn active_suggestion(&self) -> Option<&str> {
        self.active_suggestion.as_deref()
    }

    /// Consume the pending suggestion, clearing it before the caller processes it
    pub fn take_active_suggestion(&mut self) -> Option<String> {
        self.active_suggestion.take()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn set_warnings(&mut self, warnings: Vec<Warning>) {
        self.warnings = warnings;
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    pub fn feedback(&self) -> &FeedbackLedger {
        &self.feedback
    }

    pub fn feedback_mut(&mut self) -> &mut FeedbackLedger {
        &mut self.feedback
    }

    pub fn is_logged(&self, request_id: &str) -> bool {
        self.logged_requests.contains(request_id)
    }

    /// Mark a request id as logged. Returns false if it already was.
    pub fn mark_logged(&mut self, request_id: &str) -> bool {
        self.logged_requests.insert(request_id.to_string())
    }

    pub fn logged_count(&self) -> usize {
        self.logged_requests.len()
    }

    pub fn semantic_model(&self) -> &str {
        &self.semantic_model
    }

    /// Switch semantic model; always resets the conversation
    pub fn select_semantic_model(&mut self, path: impl Into<String>) {
        self.semantic_model = path.into();
        self.reset();
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or("unknown")
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    pub fn events(&mut self) -> &mut EventQueue {
        &mut self.events
    }
}
