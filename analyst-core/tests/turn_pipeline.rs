use analyst::{Cell, Column, ColumnKind, ContentBlock, Endpoint, Role, Table};
use analyst_core::mock::{MockAnalyst, MockWarehouse};
use analyst_core::{
    AnalystSession, CompleteSummarizer, FeedbackOutcome, FeedbackView, Insight, MemoryAuditSink, Notification,
    RenderItem, SqlPipeline, WarehouseAuditSink,
};
use std::sync::Arc;

const SALES_SQL: &str = "SELECT region, total FROM sales ORDER BY total DESC";

fn sales() -> Table {
    Table::new(
        vec![
            Column::new("REGION", ColumnKind::Text),
            Column::new("TOTAL", ColumnKind::Numeric),
        ],
        vec![
            vec![Cell::Text("East".into()), Cell::Number(30.0)],
            vec![Cell::Text("West".into()), Cell::Number(20.0)],
            vec![Cell::Text("East".into()), Cell::Number(10.0)],
        ],
    )
}

fn sql_reply(request_id: &str) -> analyst::AnalystResponse {
    MockAnalyst::reply(
        vec![
            ContentBlock::text("This is our interpretation of your question"),
            ContentBlock::Sql {
                statement: SALES_SQL.into(),
                confidence: None,
            },
        ],
        request_id,
    )
}

fn session(api: Arc<MockAnalyst>, warehouse: Arc<MockWarehouse>, audit: Arc<MemoryAuditSink>) -> AnalystSession {
    let summarizer = Arc::new(CompleteSummarizer::new(warehouse.clone(), "SNOWFLAKE.MODELS.\"LLAMA3.1-70B\""));
    let pipeline = SqlPipeline::new(warehouse, summarizer);
    AnalystSession::new(api, pipeline, audit, vec!["DB.S.STAGE/sales.yaml".into()]).unwrap()
}

#[tokio::test]
async fn test_sql_turn_with_ai_insight() {
    let api = Arc::new(MockAnalyst::new());
    api.push_reply(Ok(sql_reply("r1")));
    let warehouse = Arc::new(
        MockWarehouse::new()
            .with_table(SALES_SQL, sales())
            .with_prefix(
                "SELECT AI_COMPLETE",
                Table::new(
                    vec![Column::new("AI_SUMMARY", ColumnKind::Text)],
                    vec![vec![Cell::Text("East dominates with two of three orders".into())]],
                ),
            ),
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let mut session = session(api, warehouse.clone(), audit.clone());
    session.set_user_id("JDOE");

    let rendered = session.process_user_input("Which region sells most?").await;
    let analyst = &rendered[1];
    assert_eq!(analyst.role, Role::Analyst);
    assert!(matches!(analyst.items[2], RenderItem::Table(ref t) if t.len() == 3));
    assert_eq!(
        analyst.items[3],
        RenderItem::Insight(Insight::Ai("East dominates with two of three orders".into()))
    );
    assert_eq!(
        analyst.items[4],
        RenderItem::Feedback {
            request_id: "r1".into(),
            view: FeedbackView::Form
        }
    );

    let executed = warehouse.executed();
    assert_eq!(executed[0], SALES_SQL);
    assert!(executed[1].contains("\"Which region sells most?\""));

    let queries = audit.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].request_id, "r1");
    assert_eq!(queries[0].result_summary, "East dominates with two of three orders");
    assert_eq!(queries[0].user_id, "JDOE");
}

#[tokio::test]
async fn test_sql_turn_falls_back_to_local_summary() {
    let api = Arc::new(MockAnalyst::new());
    api.push_reply(Ok(sql_reply("r1")));
    let warehouse = Arc::new(
        MockWarehouse::new()
            .with_table(SALES_SQL, sales())
            .with_prefix_error("SELECT AI_COMPLETE", "model not available"),
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let mut session = session(api, warehouse, audit.clone());

    let rendered = session.process_user_input("Which region sells most?").await;
    match &rendered[1].items[3] {
        RenderItem::Insight(Insight::Fallback(text)) => {
            assert!(text.contains("Avg: 20.00, Min: 10.00, Max: 30.00"));
            assert!(text.contains("Most common: 'East' (2 times)"));
        }
        other => panic!("unexpected item {:?}", other),
    }
    // fallback is silent
    assert!(session.drain_events().is_empty());
    assert_eq!(audit.queries()[0].user_id, "unknown");
}

#[tokio::test]
async fn test_rerender_never_logs_twice() {
    let api = Arc::new(MockAnalyst::new());
    api.push_reply(Ok(sql_reply("r1")));
    let warehouse = Arc::new(MockWarehouse::new().with_table(SALES_SQL, sales()));
    let audit = Arc::new(MemoryAuditSink::new());
    let mut session = session(api, warehouse, audit.clone());

    session.process_user_input("Which region sells most?").await;
    session.render_conversation().await;
    session.render_conversation().await;
    assert_eq!(audit.queries().len(), 1);
}

#[tokio::test]
async fn test_conversation_alternates_across_errors() {
    let api = Arc::new(MockAnalyst::new());
    api.push_reply(Ok(sql_reply("r1")));
    api.push_reply(Err(MockAnalyst::api_error(Endpoint::Message, 400, "r2", "E1", "bad model")));
    let warehouse = Arc::new(MockWarehouse::new().with_table(SALES_SQL, sales()));
    let audit = Arc::new(MemoryAuditSink::new());
    let mut session = session(api, warehouse, audit);

    session.start().await;
    session.process_user_input("Which region sells most?").await;
    session.process_user_input("And last year?").await;
    session.process_user_input("Thanks").await;

    assert_eq!(session.state().len(), 8);
    assert!(session.state().is_alternating());
    assert_eq!(session.drain_events(), vec![Notification::ApiError]);
}

#[tokio::test]
async fn test_feedback_written_to_warehouse_tables() {
    let api = Arc::new(MockAnalyst::new());
    let warehouse = Arc::new(MockWarehouse::new());
    let audit = Arc::new(WarehouseAuditSink::new(
        warehouse.clone(),
        "PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.QUERY_LOG",
        "PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.QUERY_FEEDBACK",
    ));
    let pipeline = SqlPipeline::new(
        warehouse.clone(),
        Arc::new(CompleteSummarizer::new(warehouse.clone(), "m")),
    );
    let mut session =
        AnalystSession::new(api.clone(), pipeline, audit, vec!["DB.S.STAGE/sales.yaml".into()]).unwrap();

    assert_eq!(
        session.submit_feedback("r1", false, "wrong table").await,
        FeedbackOutcome::Submitted
    );
    assert_eq!(
        session.submit_feedback("r1", true, "").await,
        FeedbackOutcome::AlreadySubmitted
    );

    let inserts: Vec<String> = warehouse
        .executed()
        .into_iter()
        .filter(|s| s.starts_with("INSERT INTO PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.QUERY_FEEDBACK"))
        .collect();
    assert_eq!(inserts.len(), 1);
    assert!(inserts[0].contains("'wrong table'"));
    assert_eq!(api.feedback_calls().len(), 1);
}
