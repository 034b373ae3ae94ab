use thiserror::Error;

/// Errors raised by the remote analyst service, the warehouse and the audit sinks
#[derive(Debug, Error)]
pub enum AnalystError {
    /// The message or feedback endpoint answered with a status >= 400
    #[error("{}", .0.describe())]
    RemoteApi(RemoteApiError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{message}")]
    SqlExecution { message: String },

    /// AI summarization produced nothing usable; callers fall back silently
    #[error("summarization unavailable")]
    SummarizationUnavailable,

    #[error("{message}")]
    Logging { message: String },
}

impl AnalystError {
    pub fn sql(message: impl Into<String>) -> Self {
        AnalystError::SqlExecution {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        AnalystError::Logging {
            message: message.into(),
        }
    }

    /// The error status details, when the service answered with one
    pub fn remote(&self) -> Option<&RemoteApiError> {
        match self {
            AnalystError::RemoteApi(e) => Some(e),
            _ => None,
        }
    }
}

/// Which endpoint an API error came from; selects the heading of the description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Message,
    Feedback,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApiError {
    pub endpoint: Endpoint,
    pub status: u16,
    pub request_id: Option<String>,
    pub error_code: Option<String>,
    pub message: Option<String>,
}

impl RemoteApiError {
    /// Displayable description used as the analyst reply or the feedback error
    pub fn describe(&self) -> String {
        let heading = match self.endpoint {
            Endpoint::Message => "An Analyst API error has occurred",
            Endpoint::Feedback => "Feedback API Error",
            Endpoint::Summary => "Summary API Error",
        };
        format!(
            "🚨 {heading} 🚨\n\n\
             * response code: `{}`\n\
             * request-id: `{}`\n\
             * error code: `{}`\n\n\
             Message:\n```\n{}\n```",
            self.status,
            self.request_id.as_deref().unwrap_or("unknown"),
            self.error_code.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or(""),
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalystError>;
