//! Maps message content blocks to display items
//!
//! Rendering is where SQL blocks run: each one is executed and summarized,
//! and the first summary produced for a request id goes to the audit log.

use analyst::{ContentBlock, Message, Role, Table, VerifiedQueryInfo};
use chrono::Utc;
use tracing::{debug, warn};

use crate::audit::{AuditSink, QueryLogRecord};
use crate::events::Notification;
use crate::feedback::FeedbackView;
use crate::session::SessionState;
use crate::summarize::{Insight, SqlOutcome, SqlPipeline};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderItem {
    Markdown(String),
    /// Choosable follow-up questions. `message_index` identifies the source
    /// message; `first_option` is the position of `options[0]` among all the
    /// suggestions of that message.
    Suggestions {
        message_index: usize,
        first_option: usize,
        options: Vec<String>,
    },
    Sql {
        statement: String,
        verified: Option<VerifiedQueryInfo>,
    },
    Table(Table),
    Insight(Insight),
    NoResults,
    SqlError(String),
    Feedback {
        request_id: String,
        view: FeedbackView,
    },
    /// A block type this front-end does not know how to show
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub index: usize,
    pub role: Role,
    pub request_id: Option<String>,
    pub items: Vec<RenderItem>,
}

/// Render the message at `index`, running any SQL it carries
pub async fn render_message(
    state: &mut SessionState,
    index: usize,
    pipeline: &SqlPipeline,
    audit: &dyn AuditSink,
) -> Option<RenderedMessage> {
    let message: Message = state.messages().get(index)?.clone();
    let question = state.question_before(index);
    let mut items = Vec::new();
    let mut option_offset = 0;

    for block in &message.content {
        match block {
            ContentBlock::Text { text } => items.push(RenderItem::Markdown(text.clone())),
            ContentBlock::Suggestions { suggestions } => {
                items.push(RenderItem::Suggestions {
                    message_index: index,
                    first_option: option_offset,
                    options: suggestions.clone(),
                });
                option_offset += suggestions.len();
            }
            ContentBlock::Sql {
                statement,
                confidence,
            } => {
                items.push(RenderItem::Sql {
                    statement: statement.clone(),
                    verified: confidence
                        .as_ref()
                        .and_then(|c| c.verified_query_used.clone()),
                });
                render_sql(
                    state,
                    &mut items,
                    pipeline,
                    audit,
                    statement,
                    &question,
                    message.request_id.as_deref(),
                )
                .await;
            }
            ContentBlock::Unknown { kind, .. } => {
                debug!("unsupported content block: {}", kind);
                items.push(RenderItem::Unsupported(kind.clone()));
            }
        }
    }

    Some(RenderedMessage {
        index,
        role: message.role,
        request_id: message.request_id.clone(),
        items,
    })
}

async fn render_sql(
    state: &mut SessionState,
    items: &mut Vec<RenderItem>,
    pipeline: &SqlPipeline,
    audit: &dyn AuditSink,
    sql: &str,
    question: &str,
    request_id: Option<&str>,
) {
    match pipeline.summarize(sql, question).await {
        SqlOutcome::Error(message) => items.push(RenderItem::SqlError(message)),
        SqlOutcome::NoResults => items.push(RenderItem::NoResults),
        SqlOutcome::Results { table, insight } => {
            items.push(RenderItem::Table(table));
            if let Some(request_id) = request_id {
                log_query_once(state, audit, request_id, question, sql, insight.text()).await;
            }
            items.push(RenderItem::Insight(insight));
        }
    }

    if let Some(request_id) = request_id {
        items.push(RenderItem::Feedback {
            request_id: request_id.to_string(),
            view: state.feedback().view(request_id),
        });
    }
}

/// Write one query log record per request id per session. The id counts as
/// logged after the first attempt, whether or not the write succeeded.
async fn log_query_once(
    state: &mut SessionState,
    audit: &dyn AuditSink,
    request_id: &str,
    question: &str,
    sql: &str,
    summary: &str,
) {
    if state.is_logged(request_id) {
        return;
    }

    let record = QueryLogRecord {
        request_id: request_id.to_string(),
        timestamp: Utc::now(),
        user_question: question.to_string(),
        sql_query: sql.to_string(),
        result_summary: summary.to_string(),
        user_id: state.user_id().to_string(),
    };
    state.mark_logged(request_id);
    if let Err(e) = audit.log_query(&record).await {
        warn!("query log write failed: {}", e);
        state
            .events()
            .push(Notification::LoggingFailed(e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::mock::{MockAnalyst, MockWarehouse};
    use crate::summarize::EndpointSummarizer;
    use analyst::{Cell, Column, ColumnKind, Confidence};
    use serde_json::json;
    use std::sync::Arc;

    fn pipeline(warehouse: MockWarehouse) -> SqlPipeline {
        let api = Arc::new(MockAnalyst::new());
        SqlPipeline::new(Arc::new(warehouse), Arc::new(EndpointSummarizer::new(api)))
    }

    fn totals() -> Table {
        Table::new(
            vec![Column::new("TOTAL", ColumnKind::Numeric)],
            vec![vec![Cell::Number(10.0)], vec![Cell::Number(30.0)]],
        )
    }

    fn state_with(content: Vec<ContentBlock>, request_id: Option<&str>) -> SessionState {
        let mut state = SessionState::new("m");
        state.append(Message::user("Total sales?"));
        state.append(Message::analyst(content, request_id.map(str::to_string)));
        state
    }

    #[tokio::test]
    async fn test_blocks_render_in_order() {
        let unknown: ContentBlock = serde_json::from_value(json!({"type": "chart", "encoding": {}})).unwrap();
        let mut state = state_with(
            vec![
                ContentBlock::text("Here you go"),
                ContentBlock::Suggestions {
                    suggestions: vec!["By region?".into()],
                },
                unknown,
                ContentBlock::Suggestions {
                    suggestions: vec!["By month?".into(), "By product?".into()],
                },
            ],
            Some("r1"),
        );
        let audit = MemoryAuditSink::new();
        let rendered = render_message(&mut state, 1, &pipeline(MockWarehouse::new()), &audit)
            .await
            .unwrap();

        assert_eq!(rendered.role, Role::Analyst);
        assert_eq!(
            rendered.items,
            vec![
                RenderItem::Markdown("Here you go".into()),
                RenderItem::Suggestions {
                    message_index: 1,
                    first_option: 0,
                    options: vec!["By region?".into()]
                },
                RenderItem::Unsupported("chart".into()),
                RenderItem::Suggestions {
                    message_index: 1,
                    first_option: 1,
                    options: vec!["By month?".into(), "By product?".into()]
                },
            ]
        );
        assert!(audit.queries().is_empty());
    }

    #[tokio::test]
    async fn test_sql_block_logs_once_and_offers_feedback() {
        let verified = VerifiedQueryInfo {
            name: "totals".into(),
            question: "Total sales?".into(),
            sql: "SELECT total FROM sales".into(),
            verified_at: 1714497970,
            verified_by: "Jane".into(),
        };
        let mut state = state_with(
            vec![ContentBlock::Sql {
                statement: "SELECT total FROM sales".into(),
                confidence: Some(Confidence {
                    verified_query_used: Some(verified.clone()),
                }),
            }],
            Some("r1"),
        );
        let pipeline = pipeline(MockWarehouse::new().with_table("SELECT total FROM sales", totals()));
        let audit = MemoryAuditSink::new();

        let rendered = render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        assert_eq!(
            rendered.items[0],
            RenderItem::Sql {
                statement: "SELECT total FROM sales".into(),
                verified: Some(verified)
            }
        );
        assert!(matches!(rendered.items[1], RenderItem::Table(ref t) if t.len() == 2));
        assert!(matches!(rendered.items[2], RenderItem::Insight(Insight::Fallback(_))));
        assert_eq!(
            rendered.items[3],
            RenderItem::Feedback {
                request_id: "r1".into(),
                view: FeedbackView::Form
            }
        );

        // re-rendering does not log again
        render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        let queries = audit.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].user_question, "Total sales?");
        assert_eq!(queries[0].sql_query, "SELECT total FROM sales");
        assert!(state.is_logged("r1"));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_logged() {
        let mut state = state_with(
            vec![ContentBlock::Sql {
                statement: "SELECT none".into(),
                confidence: None,
            }],
            Some("r1"),
        );
        let empty = Table::new(vec![Column::new("N", ColumnKind::Numeric)], vec![]);
        let pipeline = pipeline(MockWarehouse::new().with_table("SELECT none", empty));
        let audit = MemoryAuditSink::new();

        let rendered = render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        assert_eq!(rendered.items[1], RenderItem::NoResults);
        assert!(audit.queries().is_empty());
        assert!(!state.is_logged("r1"));
    }

    #[tokio::test]
    async fn test_sql_error_keeps_sibling_blocks() {
        let mut state = state_with(
            vec![
                ContentBlock::Sql {
                    statement: "SELECT broken".into(),
                    confidence: None,
                },
                ContentBlock::text("after"),
            ],
            None,
        );
        let pipeline = pipeline(MockWarehouse::new().with_error("SELECT broken", "invalid identifier"));
        let audit = MemoryAuditSink::new();

        let rendered = render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        assert_eq!(rendered.items[1], RenderItem::SqlError("invalid identifier".into()));
        assert_eq!(rendered.items[2], RenderItem::Markdown("after".into()));
        assert_eq!(rendered.items.len(), 3);
    }

    #[tokio::test]
    async fn test_logging_failure_is_a_notification() {
        let mut state = state_with(
            vec![ContentBlock::Sql {
                statement: "SELECT total FROM sales".into(),
                confidence: None,
            }],
            Some("r1"),
        );
        let pipeline = pipeline(MockWarehouse::new().with_table("SELECT total FROM sales", totals()));
        let audit = MemoryAuditSink::new();
        audit.set_failing(true);

        let rendered = render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        assert!(matches!(rendered.items[1], RenderItem::Table(_)));
        assert_eq!(
            state.events().drain(),
            vec![Notification::LoggingFailed("Failed to log query: sink unavailable".into())]
        );

        // not attempted again on re-render
        render_message(&mut state, 1, &pipeline, &audit).await.unwrap();
        assert!(state.events().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_index() {
        let mut state = SessionState::new("m");
        let audit = MemoryAuditSink::new();
        assert!(render_message(&mut state, 0, &pipeline(MockWarehouse::new()), &audit).await.is_none());
    }
}
