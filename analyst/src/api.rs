//! Wire types for the analyst message, feedback and summary endpoints

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Analyst,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::User => Role::Analyst,
            Role::Analyst => Role::User,
        }
    }
}

/// Evidence that a returned statement matches a human-verified query
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct VerifiedQueryInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub sql: String,
    /// Unix seconds
    #[serde(default)]
    pub verified_at: i64,
    #[serde(default)]
    pub verified_by: String,
}

impl VerifiedQueryInfo {
    pub fn verified_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.verified_at, 0)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Confidence {
    #[serde(default)]
    pub verified_query_used: Option<VerifiedQueryInfo>,
}

/// One typed unit of displayable material within a message.
///
/// Unrecognized `type` tags are kept as `Unknown` with the raw JSON so the
/// block is echoed back to the service unchanged in later requests.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
        confidence: Option<Confidence>,
    },
    Unknown {
        kind: String,
        raw: serde_json::Value,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Text {
        text: String,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
        #[serde(default)]
        confidence: Option<Confidence>,
    },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlockRef<'a> {
    Text {
        text: &'a str,
    },
    Suggestions {
        suggestions: &'a [String],
    },
    Sql {
        statement: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<&'a Confidence>,
    },
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let kind = raw
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| D::Error::missing_field("type"))?
            .to_string();

        if !matches!(kind.as_str(), "text" | "suggestions" | "sql") {
            return Ok(ContentBlock::Unknown { kind, raw });
        }

        let block = serde_json::from_value::<KnownBlock>(raw).map_err(D::Error::custom)?;
        Ok(match block {
            KnownBlock::Text { text } => ContentBlock::Text { text },
            KnownBlock::Suggestions { suggestions } => ContentBlock::Suggestions { suggestions },
            KnownBlock::Sql {
                statement,
                confidence,
            } => ContentBlock::Sql {
                statement,
                confidence,
            },
        })
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentBlock::Text { text } => KnownBlockRef::Text { text }.serialize(serializer),
            ContentBlock::Suggestions { suggestions } => {
                KnownBlockRef::Suggestions { suggestions }.serialize(serializer)
            }
            ContentBlock::Sql {
                statement,
                confidence,
            } => KnownBlockRef::Sql {
                statement,
                confidence: confidence.as_ref(),
            }
            .serialize(serializer),
            ContentBlock::Unknown { raw, .. } => raw.serialize(serializer),
        }
    }
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// The wire tag of this block
    pub fn kind(&self) -> &str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Suggestions { .. } => "suggestions",
            ContentBlock::Sql { .. } => "sql",
            ContentBlock::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Message {
    /// A user turn always carries a single text block
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(prompt)],
            request_id: None,
        }
    }

    pub fn analyst(content: Vec<ContentBlock>, request_id: Option<String>) -> Self {
        Self {
            role: Role::Analyst,
            content,
            request_id,
        }
    }

    /// Concatenated text of all text blocks
    pub fn get_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

fn default_warning_message() -> String {
    "Warning from Analyst".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Warning {
    #[serde(default = "default_warning_message")]
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageRequest<'a> {
    pub messages: &'a [Message],
    pub semantic_model_file: String,
}

impl<'a> MessageRequest<'a> {
    /// `model_path` is a stage path; the request references it with a leading '@'
    pub fn new(messages: &'a [Message], model_path: &str) -> Self {
        Self {
            messages,
            semantic_model_file: format!("@{}", model_path.trim_start_matches('@')),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AnalystResponse {
    pub message: ResponseMessage,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Error body returned by the analyst endpoints with HTTP status >= 400
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub positive: bool,
    pub feedback_message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SummaryRequest {
    pub messages: Vec<PromptMessage>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
}
