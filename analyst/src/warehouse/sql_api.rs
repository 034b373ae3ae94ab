use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use super::{Cell, Column, ColumnKind, Table, Warehouse};
use crate::client::{Client, RawResponse};
use crate::error::{AnalystError, Result};

const STATEMENTS_ENDPOINT: &str = "/api/v2/statements";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Session context sent with every statement
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatementContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(flatten)]
    context: &'a StatementContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Outcome of one statements API exchange
enum StatementStatus {
    Done(Table),
    Running(String),
}

fn table_from_response(response: StatementResponse) -> Table {
    let columns: Vec<Column> = response
        .result_set_meta_data
        .map(|meta| meta.row_type)
        .unwrap_or_default()
        .into_iter()
        .map(|row_type| Column::new(row_type.name, ColumnKind::from_sql_type(&row_type.kind)))
        .collect();

    let rows = response
        .data
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| Cell::parse(row.get(idx).and_then(|v| v.as_deref()), column.kind))
                .collect()
        })
        .collect();

    Table::new(columns, rows)
}

fn interpret_statement_response(raw: &RawResponse) -> Result<StatementStatus> {
    match raw.status {
        200 => Ok(StatementStatus::Done(table_from_response(raw.json()?))),
        202 => {
            let response: StatementResponse = raw.json()?;
            response
                .statement_handle
                .map(StatementStatus::Running)
                .ok_or_else(|| AnalystError::sql("statement accepted without a handle"))
        }
        _ => {
            let message = raw
                .json::<StatementResponse>()
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("HTTP {}: {}", raw.status, raw.body));
            Err(AnalystError::sql(message))
        }
    }
}

/// Executes statements through the warehouse SQL REST API.
/// Only the first result partition is read.
#[derive(Clone)]
pub struct SqlApiWarehouse {
    client: Client,
    context: StatementContext,
    statement_timeout: Duration,
}

impl SqlApiWarehouse {
    pub fn new(client: Client, context: StatementContext, statement_timeout: Duration) -> Self {
        Self {
            client,
            context,
            statement_timeout,
        }
    }

    async fn poll(&self, handle: String, deadline: Instant) -> Result<Table> {
        let path = format!("{}/{}", STATEMENTS_ENDPOINT, handle);
        let client = &self.client;
        let path = path.as_str();
        poll_statement(&handle, deadline, self.statement_timeout, POLL_INTERVAL, move || {
            client.get(path)
        })
        .await
    }
}

/// Fetch the statement status every `interval` until it finishes, fails,
/// or `deadline` passes
async fn poll_statement<F, Fut>(
    handle: &str,
    deadline: Instant,
    statement_timeout: Duration,
    interval: Duration,
    mut fetch: F,
) -> Result<Table>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawResponse>>,
{
    loop {
        if Instant::now() >= deadline {
            return Err(AnalystError::sql(format!(
                "statement {} did not finish within {}s",
                handle,
                statement_timeout.as_secs()
            )));
        }
        tokio::time::sleep(interval).await;
        let raw = fetch().await.map_err(to_sql_error)?;
        match interpret_statement_response(&raw)? {
            StatementStatus::Done(table) => return Ok(table),
            StatementStatus::Running(_) => debug!(handle = %handle, "statement still running"),
        }
    }
}

/// Transport and decode failures during execution surface as execution errors
fn to_sql_error(err: AnalystError) -> AnalystError {
    match err {
        AnalystError::SqlExecution { .. } => err,
        other => AnalystError::sql(other.to_string()),
    }
}

#[async_trait]
impl Warehouse for SqlApiWarehouse {
    #[instrument(level = "debug", skip(self))]
    async fn execute(&self, sql: &str) -> Result<Table> {
        let deadline = Instant::now() + self.statement_timeout;
        let request = StatementRequest {
            statement: sql,
            timeout: self.statement_timeout.as_secs(),
            context: &self.context,
        };
        let raw = self
            .client
            .post(STATEMENTS_ENDPOINT, &request, Some(self.statement_timeout + Duration::from_secs(10)))
            .await
            .map_err(to_sql_error)?;

        match interpret_statement_response(&raw).map_err(to_sql_error)? {
            StatementStatus::Done(table) => {
                debug!(rows = table.len(), "statement finished");
                Ok(table)
            }
            StatementStatus::Running(handle) => self.poll(handle, deadline).await.map_err(to_sql_error),
        }
    }
}
