//! Application settings management

use crate::PathManager;
use serde::{Deserialize, Serialize};
use std::fs;

/// Semantic models offered when settings.toml does not list any
pub const DEFAULT_SEMANTIC_MODELS: &[&str] = &[
    "PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.RAW_DATA/pharmacy_data.yaml",
    "CORTEX_ANALYST_HEALTHCARE/sales_data.yaml",
];

pub const DEFAULT_COMPLETION_MODEL: &str = "SNOWFLAKE.MODELS.\"LLAMA3.1-70B\"";

/// How result insights are generated before falling back to local statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummarizerKind {
    /// AI_COMPLETE executed as a SQL statement in the warehouse
    #[default]
    Complete,
    /// The analyst service's summary endpoint
    Endpoint,
}

/// Where query and feedback audit records are written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// INSERT statements against the warehouse tables
    #[default]
    Warehouse,
    /// Local SQLite database under the data dir
    Sqlite,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditTables {
    pub query_log: String,
    pub feedback: String,
}

impl Default for AuditTables {
    fn default() -> Self {
        Self {
            query_log: "PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.QUERY_LOG".to_string(),
            feedback: "PHARMA_ANALYST.PRESCRIPTION_TIMESERIES.QUERY_FEEDBACK".to_string(),
        }
    }
}

/// Application settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Account base URL, e.g. "https://myorg-myaccount.snowflakecomputing.com"
    pub account_url: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    /// Stage paths of the selectable semantic models (without the leading '@')
    pub semantic_models: Vec<String>,
    pub summarizer: SummarizerKind,
    /// Model passed to AI_COMPLETE
    pub completion_model: String,
    pub audit: AuditBackend,
    pub audit_tables: AuditTables,
    /// Fixed user id for audit records; resolved from the warehouse when unset
    pub user_id: Option<String>,
    pub statement_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_url: None,
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            semantic_models: DEFAULT_SEMANTIC_MODELS.iter().map(|s| s.to_string()).collect(),
            summarizer: SummarizerKind::default(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            audit: AuditBackend::default(),
            audit_tables: AuditTables::default(),
            user_id: None,
            statement_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from the settings file, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = PathManager::settings_path() else {
            return Self::default();
        };

        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };

        Self::parse(&content)
    }

    /// Parse settings text; malformed content yields defaults
    pub fn parse(content: &str) -> Self {
        let mut settings: Settings = toml::from_str(content).unwrap_or_default();
        if settings.semantic_models.is_empty() {
            settings.semantic_models = Self::default().semantic_models;
        }
        settings
    }

    /// Short label for a semantic model path: the file name after the last '/'
    pub fn model_label(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_settings() {
        let settings = Settings::parse(
            r#"
            account_url = "https://acme.snowflakecomputing.com"
            warehouse = "ANALYTICS_WH"
            summarizer = "endpoint"
            audit = "sqlite"
            "#,
        );

        assert_eq!(settings.account_url.as_deref(), Some("https://acme.snowflakecomputing.com"));
        assert_eq!(settings.warehouse.as_deref(), Some("ANALYTICS_WH"));
        assert_eq!(settings.summarizer, SummarizerKind::Endpoint);
        assert_eq!(settings.audit, AuditBackend::Sqlite);
        assert_eq!(settings.semantic_models.len(), DEFAULT_SEMANTIC_MODELS.len());
        assert_eq!(settings.statement_timeout_secs, 60);
    }

    #[test]
    fn test_empty_model_list_falls_back_to_defaults() {
        let settings = Settings::parse("semantic_models = []");
        assert!(!settings.semantic_models.is_empty());
    }

    #[test]
    fn test_malformed_settings_yield_defaults() {
        let settings = Settings::parse("this is = = not toml");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_model_label() {
        assert_eq!(Settings::model_label("DB.SCHEMA.STAGE/sales_data.yaml"), "sales_data.yaml");
        assert_eq!(Settings::model_label("plain.yaml"), "plain.yaml");
    }
}
