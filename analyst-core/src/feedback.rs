//! Per-request feedback state machine
//!
//! `NoForm` is the implicit state of any request id without an entry.
//! Transitions: `NoForm -> FormOpen -> Submitted { error }`. `Submitted`
//! is terminal for the session; there is no resubmission.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackState {
    FormOpen,
    Submitted { error: Option<String> },
}

/// What the front-end should show for a request id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackView {
    /// Form available (not yet opened, or open)
    Form,
    Submitted,
    Failed(String),
}

/// Result of a feedback submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Submitted,
    Failed(String),
    /// The request id already reached `Submitted`; nothing was sent
    AlreadySubmitted,
}

#[derive(Debug, Default)]
pub struct FeedbackLedger {
    states: HashMap<String, FeedbackState>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means `NoForm`
    pub fn state(&self, request_id: &str) -> Option<&FeedbackState> {
        self.states.get(request_id)
    }

    pub fn is_submitted(&self, request_id: &str) -> bool {
        matches!(self.states.get(request_id), Some(FeedbackState::Submitted { .. }))
    }

    /// Open the form. Returns false when the request id is already submitted.
    pub fn open(&mut self, request_id: &str) -> bool {
        if self.is_submitted(request_id) {
            return false;
        }
        self.states
            .insert(request_id.to_string(), FeedbackState::FormOpen);
        true
    }

    /// Record the outcome of a submission; ignored if already submitted
    pub fn record(&mut self, request_id: &str, error: Option<String>) -> bool {
        if self.is_submitted(request_id) {
            return false;
        }
        self.states
            .insert(request_id.to_string(), FeedbackState::Submitted { error });
        true
    }

    pub fn view(&self, request_id: &str) -> FeedbackView {
        match self.states.get(request_id) {
            None | Some(FeedbackState::FormOpen) => FeedbackView::Form,
            Some(FeedbackState::Submitted { error: None }) => FeedbackView::Submitted,
            Some(FeedbackState::Submitted { error: Some(msg) }) => FeedbackView::Failed(msg.clone()),
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut ledger = FeedbackLedger::new();
        assert_eq!(ledger.state("r1"), None);
        assert_eq!(ledger.view("r1"), FeedbackView::Form);

        assert!(ledger.open("r1"));
        assert_eq!(ledger.state("r1"), Some(&FeedbackState::FormOpen));

        assert!(ledger.record("r1", None));
        assert_eq!(ledger.view("r1"), FeedbackView::Submitted);
    }

    #[test]
    fn test_submitted_is_terminal() {
        let mut ledger = FeedbackLedger::new();
        ledger.record("r1", Some("boom".into()));

        assert!(!ledger.open("r1"));
        assert!(!ledger.record("r1", None));
        assert_eq!(ledger.view("r1"), FeedbackView::Failed("boom".into()));
    }

    #[test]
    fn test_clear() {
        let mut ledger = FeedbackLedger::new();
        ledger.open("r1");
        ledger.record("r2", None);
        ledger.clear();
        assert!(ledger.is_empty());
    }
}
