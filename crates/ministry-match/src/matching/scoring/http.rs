//! JSON-over-HTTP scoring oracle client.

use async_trait::async_trait;
use reqwest::{header, Client};

use super::oracle::{OracleError, ScoringOracle, ScoringRequest, ScoringResponse};

/// POSTs the [`ScoringRequest`] to a configured endpoint and decodes a
/// [`ScoringResponse`]. The adapter owns the timeout.
pub struct HttpScoringOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpScoringOracle {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, OracleError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| OracleError::Unavailable(format!("http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ScoringOracle for HttpScoringOracle {
    fn id(&self) -> &str {
        &self.endpoint
    }

    async fn score(&self, request: ScoringRequest) -> Result<ScoringResponse, OracleError> {
        let mut call = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|err| OracleError::RequestFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        response
            .json::<ScoringResponse>()
            .await
            .map_err(|err| OracleError::ParseError(err.to_string()))
    }
}
