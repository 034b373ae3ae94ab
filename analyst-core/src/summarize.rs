//! SQL execution and result summarization
//!
//! A returned statement is executed, truncated for display, and summarized
//! by a remote summarizer. When the remote summary is unavailable a local
//! statistical summary is used instead; that fallback is silent.

use analyst::{
    AnalystApi, AnalystError, ColumnKind, PromptMessage, SummaryRequest, Table, Warehouse,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::format::{to_csv, to_markdown};

/// Rows kept for display
pub const MAX_DISPLAY_ROWS: usize = 200;
/// Rows sent to the summary endpoint
pub const ENDPOINT_SAMPLE_ROWS: usize = 5;
/// Rows embedded in the AI_COMPLETE prompt
pub const COMPLETE_SAMPLE_ROWS: usize = 20;

pub const INSIGHT_NOT_GENERATED: &str = "Insight not generated";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// One concise insight about `table`, which answers `question` via `sql`
    async fn summarize(&self, sql: &str, question: &str, table: &Table) -> analyst::Result<String>;
}

/// Summarizes through the warehouse's AI_COMPLETE function
pub struct CompleteSummarizer {
    warehouse: Arc<dyn Warehouse>,
    model: String,
}

impl CompleteSummarizer {
    pub fn new(warehouse: Arc<dyn Warehouse>, model: impl Into<String>) -> Self {
        Self {
            warehouse,
            model: model.into(),
        }
    }

    fn prompt(question: &str, csv: &str) -> String {
        format!(
            "You are a data analyst.\n\
             The query below answers this question:\n\
             \"{question}\"\n\
             Your task:\n\
             - Write one sharp, concise insight, max 12 words.\n\
             - Focus on trend, outlier, growth, drop, or summary number.\n\
             - No markdown, no lists, no restating the question.\n\
             DATA:\n\
             {csv}"
        )
    }

    /// The prompt travels inside a `$$` dollar-quoted literal, so every `$$`
    /// in the prompt itself is broken up, including runs of three or more
    pub fn statement(&self, question: &str, csv: &str) -> String {
        let mut prompt = Self::prompt(question, csv);
        while prompt.contains("$$") {
            prompt = prompt.replace("$$", "$ $");
        }
        format!(
            "SELECT AI_COMPLETE('{}', $$ {} $$) AS ai_summary",
            self.model.replace('\'', "''"),
            prompt
        )
    }
}

#[async_trait]
impl Summarizer for CompleteSummarizer {
    #[instrument(level = "debug", skip_all)]
    async fn summarize(&self, _sql: &str, question: &str, table: &Table) -> analyst::Result<String> {
        let csv = to_csv(&table.head(COMPLETE_SAMPLE_ROWS))
            .map_err(|_| AnalystError::SummarizationUnavailable)?;
        let result = self.warehouse.execute(&self.statement(question, &csv)).await?;

        let column = result
            .column_index("AI_SUMMARY")
            .ok_or(AnalystError::SummarizationUnavailable)?;
        result
            .rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(|cell| cell.as_str())
            .map(|s| s.trim().trim_matches('"').trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(AnalystError::SummarizationUnavailable)
    }
}

/// Summarizes through the analyst service's summary endpoint
pub struct EndpointSummarizer {
    api: Arc<dyn AnalystApi>,
}

impl EndpointSummarizer {
    pub fn new(api: Arc<dyn AnalystApi>) -> Self {
        Self { api }
    }

    pub fn request(sql: &str, table: &Table) -> SummaryRequest {
        let sample = to_markdown(&table.head(ENDPOINT_SAMPLE_ROWS));
        SummaryRequest {
            messages: vec![
                PromptMessage {
                    role: "system".to_string(),
                    content: format!(
                        "You are a data analyst. Based on the SQL query and data sample, summarize key insights. Query:\n```{}```",
                        sql
                    ),
                },
                PromptMessage {
                    role: "user".to_string(),
                    content: format!("Data Sample:\n```\n{}\n```", sample),
                },
            ],
        }
    }
}

#[async_trait]
impl Summarizer for EndpointSummarizer {
    async fn summarize(&self, sql: &str, _question: &str, table: &Table) -> analyst::Result<String> {
        self.api.summarize(&Self::request(sql, table)).await
    }
}

/// Descriptive statistics for one column of the fallback summary
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnStat {
    Numeric {
        name: String,
        mean: f64,
        min: f64,
        max: f64,
    },
    Categorical {
        name: String,
        most_common: String,
        count: usize,
    },
}

impl ColumnStat {
    pub fn describe(&self) -> String {
        match self {
            ColumnStat::Numeric {
                name,
                mean,
                min,
                max,
            } => format!("📊 **{}**: Avg: {:.2}, Min: {:.2}, Max: {:.2}", name, mean, min, max),
            ColumnStat::Categorical {
                name,
                most_common,
                count,
            } => format!("🔠 **{}**: Most common: '{}' ({} times)", name, most_common, count),
        }
    }
}

/// Numeric columns first, then categorical ones, each in column order.
/// Columns with no usable (non-null) values are omitted.
pub fn column_stats(table: &Table) -> Vec<ColumnStat> {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for (idx, column) in table.columns.iter().enumerate() {
        match column.kind {
            ColumnKind::Numeric => {
                let values: Vec<f64> = table.column_values(idx).filter_map(|c| c.as_f64()).collect();
                if values.is_empty() {
                    continue;
                }
                let sum: f64 = values.iter().sum();
                numeric.push(ColumnStat::Numeric {
                    name: column.name.clone(),
                    mean: sum / values.len() as f64,
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                });
            }
            ColumnKind::Text | ColumnKind::Date => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for value in table.column_values(idx).filter_map(|c| c.as_str()) {
                    *counts.entry(value).or_default() += 1;
                }
                // ties resolve to the lexicographically smallest value
                let best = counts
                    .into_iter()
                    .max_by(|(a_val, a_n), (b_val, b_n)| a_n.cmp(b_n).then_with(|| b_val.cmp(a_val)));
                if let Some((value, count)) = best {
                    categorical.push(ColumnStat::Categorical {
                        name: column.name.clone(),
                        most_common: value.to_string(),
                        count,
                    });
                }
            }
            ColumnKind::Boolean | ColumnKind::Other => {}
        }
    }

    numeric.extend(categorical);
    numeric
}

/// Local summary: mean/min/max per numeric column and the most frequent
/// value per categorical column. Pure; never calls out.
pub fn fallback_summary(table: &Table) -> String {
    column_stats(table)
        .iter()
        .map(ColumnStat::describe)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insight {
    Ai(String),
    Fallback(String),
}

impl Insight {
    pub fn text(&self) -> &str {
        match self {
            Insight::Ai(text) | Insight::Fallback(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutcome {
    /// Execution failed; nothing else is produced for the block
    Error(String),
    NoResults,
    /// `table` is already truncated to `MAX_DISPLAY_ROWS`
    Results { table: Table, insight: Insight },
}

/// Executes returned statements and summarizes their results
#[derive(Clone)]
pub struct SqlPipeline {
    warehouse: Arc<dyn Warehouse>,
    summarizer: Arc<dyn Summarizer>,
}

impl SqlPipeline {
    pub fn new(warehouse: Arc<dyn Warehouse>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            warehouse,
            summarizer,
        }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    #[instrument(level = "debug", skip(self, question))]
    pub async fn summarize(&self, sql: &str, question: &str) -> SqlOutcome {
        let table = match self.warehouse.execute(sql).await {
            Ok(table) => table,
            Err(e) => return SqlOutcome::Error(e.to_string()),
        };
        if table.is_empty() {
            return SqlOutcome::NoResults;
        }

        let table = table.head(MAX_DISPLAY_ROWS);
        let insight = match self.summarizer.summarize(sql, question, &table).await {
            Ok(text) => Insight::Ai(text),
            Err(e) => {
                debug!("falling back to local summary: {}", e);
                let text = fallback_summary(&table);
                if text.is_empty() {
                    Insight::Fallback(INSIGHT_NOT_GENERATED.to_string())
                } else {
                    Insight::Fallback(text)
                }
            }
        };

        SqlOutcome::Results { table, insight }
    }
}
