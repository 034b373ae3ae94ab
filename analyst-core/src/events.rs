//! One-shot notifications raised while processing a turn
//!
//! The orchestrator pushes notifications as they happen and the front-end
//! drains the queue once per processing cycle, so each fires exactly once.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The message endpoint answered with an error; shown as a toast
    ApiError,
    /// An audit write failed; the turn itself still completed
    LoggingFailed(String),
}

impl Notification {
    pub fn text(&self) -> String {
        match self {
            Notification::ApiError => "An API error has occurred!".to_string(),
            Notification::LoggingFailed(msg) => msg.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<Notification>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.pending.push_back(notification);
    }

    /// Take every pending notification, leaving the queue empty
    pub fn drain(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
