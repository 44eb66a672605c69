use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};

/// Outcome of a query the warehouse accepted for processing.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<serde_json::Value>),
    /// The warehouse refused the query (bad syntax, unknown column, ...).
    Rejected(String),
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

/// Client for the read-only query service.
pub struct WarehouseClient {
    http: Client,
    base_url: String,
}

impl WarehouseClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TrellisError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Run a query. Transport failures are errors; a refusal carrying a
    /// `detail` is a [`QueryOutcome::Rejected`].
    pub async fn execute(&self, query: &str) -> Result<QueryOutcome> {
        let url = format!("{}/query", self.base_url);
        debug!(len = query.len(), "Executing warehouse query");

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| TrellisError::Http(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TrellisError::Http(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            let parsed: QueryResponse = serde_json::from_str(&body)
                .map_err(|e| TrellisError::Http(format!("Invalid query response: {}", e)))?;
            return Ok(QueryOutcome::Rows(parsed.data));
        }

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) if status.is_client_error() => Ok(QueryOutcome::Rejected(err.detail)),
            Ok(err) => Err(TrellisError::Http(format!("HTTP {}: {}", status, err.detail))),
            Err(_) => Err(TrellisError::Http(format!("HTTP {}: {}", status, body))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_json(json!({"query": "SELECT COUNT(*) AS n FROM account"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"n": 4500}]})))
            .mount(&server)
            .await;

        let client = WarehouseClient::new(&server.uri(), 5).unwrap();
        let outcome = client
            .execute("SELECT COUNT(*) AS n FROM account")
            .await
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Rows(vec![json!({"n": 4500})]));
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"detail": "SQL Error: no such column: statu"})),
            )
            .mount(&server)
            .await;

        let client = WarehouseClient::new(&server.uri(), 5).unwrap();
        let outcome = client.execute("SELECT statu FROM orders").await.unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Rejected("SQL Error: no such column: statu".into())
        );
    }

    #[tokio::test]
    async fn server_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"detail": "Server Error: disk"})),
            )
            .mount(&server)
            .await;

        let client = WarehouseClient::new(&server.uri(), 5).unwrap();
        assert!(matches!(
            client.execute("SELECT 1").await,
            Err(TrellisError::Http(_))
        ));
    }
}
