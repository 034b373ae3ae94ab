use analyst::Warning;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::conversation::AnalystSession;
use crate::events::Notification;
use crate::feedback::FeedbackOutcome;
use crate::render::RenderedMessage;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Ask the welcome question if the conversation is empty
    Start,
    Ask(String),
    ChooseSuggestion {
        message_index: usize,
        option: usize,
    },
    SubmitFeedback {
        request_id: String,
        positive: bool,
        message: String,
    },
    SelectModel(String),
    ClearHistory,
    /// Re-render the whole conversation
    Refresh,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Rendered(Vec<RenderedMessage>),
    Notification(Notification),
    Warning(Warning),
    Feedback {
        request_id: String,
        outcome: FeedbackOutcome,
    },
    Error(String),
    ModelChanged(String),
    HistoryCleared,
    /// The command finished; the front-end may accept input again
    Idle,
}

/// Runs an `AnalystSession` on a background task.
///
/// Commands are processed strictly in order and the session sits behind a
/// mutex, so turns never interleave.
pub struct AnalystEngine {
    session: Arc<Mutex<AnalystSession>>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    #[allow(dead_code)]
    processor_handle: JoinHandle<()>,
}

impl AnalystEngine {
    pub fn new(session: AnalystSession) -> Self {
        let session = Arc::new(Mutex::new(session));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session_clone = Arc::clone(&session);
        let processor_handle = tokio::spawn(async move {
            Self::processor_loop(session_clone, cmd_rx, event_tx).await;
        });

        Self {
            session,
            cmd_tx,
            event_rx,
            processor_handle,
        }
    }

    async fn processor_loop(
        session: Arc<Mutex<AnalystSession>>,
        mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
    ) {
        while let Some(cmd) = cmd_rx.recv().await {
            debug!(?cmd, "engine command");
            let mut sess = session.lock().await;
            let mut turn_ran = false;
            match cmd {
                EngineCommand::Start => {
                    let rendered = sess.start().await;
                    turn_ran = Self::send_rendered(&event_tx, rendered);
                }
                EngineCommand::Ask(prompt) => {
                    let rendered = sess.handle_input(Some(prompt.as_str())).await;
                    turn_ran = Self::send_rendered(&event_tx, rendered);
                }
                EngineCommand::ChooseSuggestion {
                    message_index,
                    option,
                } => match sess.choose_suggestion(message_index, option).await {
                    Ok(rendered) => turn_ran = Self::send_rendered(&event_tx, rendered),
                    Err(e) => {
                        let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                    }
                },
                EngineCommand::SubmitFeedback {
                    request_id,
                    positive,
                    message,
                } => {
                    sess.open_feedback(&request_id);
                    let outcome = sess.submit_feedback(&request_id, positive, &message).await;
                    let _ = event_tx.send(EngineEvent::Feedback { request_id, outcome });
                }
                EngineCommand::SelectModel(path) => match sess.select_model(&path) {
                    Ok(()) => {
                        let _ = event_tx.send(EngineEvent::ModelChanged(path));
                        let rendered = sess.start().await;
                        turn_ran = Self::send_rendered(&event_tx, rendered);
                    }
                    Err(e) => {
                        let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                    }
                },
                EngineCommand::ClearHistory => {
                    sess.clear();
                    let _ = event_tx.send(EngineEvent::HistoryCleared);
                    let rendered = sess.start().await;
                    turn_ran = Self::send_rendered(&event_tx, rendered);
                }
                EngineCommand::Refresh => {
                    let rendered = sess.render_conversation().await;
                    turn_ran = Self::send_rendered(&event_tx, rendered);
                }
            }

            // warnings belong to the latest turn and are shown alongside it
            if turn_ran {
                for warning in sess.warnings() {
                    let _ = event_tx.send(EngineEvent::Warning(warning.clone()));
                }
            }
            for notification in sess.drain_events() {
                let _ = event_tx.send(EngineEvent::Notification(notification));
            }
            let _ = event_tx.send(EngineEvent::Idle);
        }
    }

    fn send_rendered(event_tx: &mpsc::UnboundedSender<EngineEvent>, rendered: Vec<RenderedMessage>) -> bool {
        if rendered.is_empty() {
            return false;
        }
        let _ = event_tx.send(EngineEvent::Rendered(rendered));
        true
    }

    pub fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }

    pub fn ask(&self, prompt: impl Into<String>) {
        self.send(EngineCommand::Ask(prompt.into()));
    }

    pub fn clear_history(&self) {
        self.send(EngineCommand::ClearHistory);
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    pub fn get_session(&self) -> Arc<Mutex<AnalystSession>> {
        Arc::clone(&self.session)
    }
}
