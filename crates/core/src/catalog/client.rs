use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::{config::AppConfig, models::CatalogResponse};

use super::FetchError;

/// Anything able to produce a fresh catalog snapshot.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the full catalog in one request.
    async fn fetch(&self) -> Result<CatalogResponse, FetchError>;
}

/// Build the items query for the given language.
pub fn items_query(language: &str) -> String {
    format!(
        "query {{ items(lang: {language}) {{ id name width height \
         sellFor {{ price currency vendor {{ name }} }} \
         buyFor {{ price currency vendor {{ name }} }} }} }}"
    )
}

/// `reqwest` client posting the items query to a GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: Client,
    endpoint: String,
    language: String,
}

impl GraphqlClient {
    /// Create a client for `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tarkov-list/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            language: language.into(),
        })
    }

    /// Create a client from application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Self::new(
            config.api_url.clone(),
            config.language.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl CatalogSource for GraphqlClient {
    async fn fetch(&self) -> Result<CatalogResponse, FetchError> {
        info!(endpoint = %self.endpoint, "fetching catalog");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": items_query(&self.language) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "catalog response received");
        decode_response(&body)
    }
}

pub(crate) fn decode_response(body: &[u8]) -> Result<CatalogResponse, FetchError> {
    let decoded: CatalogResponse = serde_json::from_slice(body)?;
    if decoded.data.is_none() {
        let message = if decoded.errors.is_empty() {
            "response carried no data".to_string()
        } else {
            decoded
                .errors
                .iter()
                .map(|err| err.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(FetchError::Api(message));
    }
    Ok(decoded)
}
