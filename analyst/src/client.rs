use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{Level, event, instrument};

use crate::error::Result;
use crate::traffic_log;

const TOKEN_TYPE_HEADER: &str = "x-snowflake-authorization-token-type";

/// Status and body of a completed HTTP exchange; classification is left to the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str::<T>(&self.body)?)
    }
}

/// Thin JSON-over-HTTP client bound to one account base URL
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn with_headers(base_url: impl Into<String>, headers: HeaderMap) -> Result<Self> {
        Ok(Client {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client that sends `Authorization: Bearer <token>` on every request.
    /// `token_type` is forwarded as the token type header when given
    /// (e.g. "KEYPAIR_JWT" or "PROGRAMMATIC_ACCESS_TOKEN").
    pub fn with_token(
        base_url: impl Into<String>,
        token: &str,
        token_type: Option<&str>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(Ok(value)) = token_type.map(HeaderValue::from_str) {
            headers.insert(HeaderName::from_static(TOKEN_TYPE_HEADER), value);
        }
        Self::with_headers(base_url, headers)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn get(&self, path: &str) -> Result<RawResponse> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        event!(Level::TRACE, status, response = body);
        traffic_log::log_response(path, status, &body);

        Ok(RawResponse { status, body })
    }

    /// POST a JSON body. Status codes >= 400 are returned, not raised, so
    /// callers can parse the service's error body.
    #[instrument(level = "trace", skip(self, request), fields(json_request = serde_json::to_string(request).unwrap_or_default()))]
    pub async fn post<S>(&self, path: &str, request: &S, timeout: Option<Duration>) -> Result<RawResponse>
    where
        S: Serialize + Sized,
    {
        traffic_log::log_request(path, request);
        let mut builder = self.client.post(self.url(path)).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                traffic_log::log_error(path, &e.to_string());
                return Err(e.into());
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await?;
        event!(Level::TRACE, status, response = body);
        traffic_log::log_response(path, status, &body);

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        id: u32,
    }

    #[test]
    fn test_url_joins_without_duplicate_slashes() {
        let client = Client::with_token("https://acme.snowflakecomputing.com/", "t", None).unwrap();
        assert_eq!(
            client.url("/api/v2/statements"),
            "https://acme.snowflakecomputing.com/api/v2/statements"
        );
        assert_eq!(
            client.url("api/v2/statements"),
            "https://acme.snowflakecomputing.com/api/v2/statements"
        );
    }

    #[test]
    fn test_raw_response_classification() {
        let ok = RawResponse { status: 200, body: "{\"id\":7}".into() };
        assert!(ok.is_success());
        assert_eq!(ok.json::<Payload>().unwrap(), Payload { id: 7 });

        let err = RawResponse { status: 400, body: "not json".into() };
        assert!(!err.is_success());
        assert!(err.json::<Payload>().is_err());
    }

    #[test]
    fn test_client_with_token_type() {
        let client = Client::with_token("https://acme", "secret", Some("KEYPAIR_JWT"));
        assert!(client.is_ok());
    }
}
