//! Conversation core for the analyst chat
//!
//! This crate provides:
//! - **Session**: `SessionState`, the append-only message log plus per-session UI state
//! - **Orchestration**: `AnalystSession` runs turns, feedback and model selection
//! - **Rendering**: content blocks to `RenderItem`s, running returned SQL on the way
//! - **Summaries**: `SqlPipeline` with AI-backed `Summarizer`s and a local statistical fallback
//! - **Audit**: `AuditSink` with warehouse, SQLite and in-memory backends
//! - **Engine**: `AnalystEngine` drives a session from a command channel
//!
//! # Example
//!
//! ```ignore
//! use analyst_core::{AnalystEngine, AnalystSession, EngineEvent};
//!
//! let session = AnalystSession::new(api, pipeline, audit, models)?;
//! let mut engine = AnalystEngine::new(session);
//! engine.ask("Which region grew fastest last quarter?");
//! while let Some(event) = engine.next_event().await { /* ... */ }
//! ```
pub mod audit;
pub mod conversation;
pub mod engine;
pub mod events;
pub mod feedback;
pub mod format;
pub mod identity;
pub mod mock;
pub mod render;
pub mod session;
pub mod summarize;

pub use audit::{AuditSink, FeedbackRecord, MemoryAuditSink, NoopAuditSink, QueryLogRecord, WarehouseAuditSink};
#[cfg(feature = "sqlite")]
pub use audit::SqliteAuditSink;
pub use conversation::{AnalystSession, WELCOME_PROMPT};
pub use engine::{AnalystEngine, EngineCommand, EngineEvent};
pub use events::{EventQueue, Notification};
pub use feedback::{FeedbackLedger, FeedbackOutcome, FeedbackState, FeedbackView};
pub use identity::resolve_user_id;
pub use render::{RenderItem, RenderedMessage};
pub use session::SessionState;
pub use summarize::{
    fallback_summary, CompleteSummarizer, EndpointSummarizer, Insight, SqlOutcome, SqlPipeline, Summarizer,
    MAX_DISPLAY_ROWS,
};
