//! Remote side of the analyst chat: wire types, the HTTP client for the
//! hosted analyst service, and warehouse SQL execution.

use async_trait::async_trait;
use std::sync::Arc;

pub mod api;
mod client;
pub mod cortex;
pub mod error;
pub mod traffic_log;
pub mod warehouse;

pub use api::*;
pub use client::{Client, RawResponse};
pub use cortex::CortexClient;
pub use error::{AnalystError, Endpoint, RemoteApiError, Result};
pub use warehouse::{
    CachedWarehouse, Cell, Column, ColumnKind, SqlApiWarehouse, StatementContext, Table, Warehouse,
};

/// The hosted analyst service: conversation, feedback and summary endpoints
#[async_trait]
pub trait AnalystApi: Send + Sync {
    /// Send the full conversation history for the selected semantic model
    async fn send_message(&self, history: &[Message], model_path: &str) -> Result<AnalystResponse>;

    async fn submit_feedback(&self, request_id: &str, positive: bool, feedback_message: &str) -> Result<()>;

    /// Ask the service for a one-paragraph summary of a result sample
    async fn summarize(&self, request: &SummaryRequest) -> Result<String>;
}

#[async_trait]
impl<A: AnalystApi + ?Sized> AnalystApi for Arc<A> {
    async fn send_message(&self, history: &[Message], model_path: &str) -> Result<AnalystResponse> {
        (**self).send_message(history, model_path).await
    }

    async fn submit_feedback(&self, request_id: &str, positive: bool, feedback_message: &str) -> Result<()> {
        (**self).submit_feedback(request_id, positive, feedback_message).await
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String> {
        (**self).summarize(request).await
    }
}
