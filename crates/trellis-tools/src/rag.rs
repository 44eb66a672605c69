use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use trellis_core::error::{Result, TrellisError};

/// One document returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "page_content")]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Collection {
    uuid: String,
    name: String,
}

/// Client for the document retrieval service.
///
/// Collection names are resolved to ids once per name; the lock is held
/// across the lookup so concurrent callers never resolve the same name twice.
pub struct RagClient {
    http: Client,
    base_url: String,
    collections: Mutex<HashMap<String, String>>,
}

impl RagClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TrellisError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve a collection name to its id.
    pub async fn collection_id(&self, name: &str) -> Result<String> {
        let mut cache = self.collections.lock().await;
        if let Some(id) = cache.get(name) {
            return Ok(id.clone());
        }

        let url = format!("{}/collections", self.base_url);
        let collections: Vec<Collection> = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TrellisError::Http(format!("GET {}: {}", url, e)))?
            .json()
            .await
            .map_err(|e| TrellisError::Http(format!("Invalid collections response: {}", e)))?;

        let mut matches = collections.into_iter().filter(|c| c.name == name);
        let id = match (matches.next(), matches.next()) {
            (None, _) => {
                return Err(TrellisError::Http(format!(
                    "Not found collection named '{}'",
                    name
                )))
            }
            (Some(_), Some(_)) => {
                return Err(TrellisError::Http(format!(
                    "Duplicated collection named '{}'",
                    name
                )))
            }
            (Some(c), None) => c.uuid,
        };

        info!(collection = %name, id = %id, "Resolved retrieval collection");
        cache.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Similarity search within a named collection, best match first.
    pub async fn search(&self, collection: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let id = self.collection_id(collection).await?;
        let url = format!("{}/collections/{}/documents/search", self.base_url, id);
        debug!(collection = %collection, limit, "Searching documents");

        self.http
            .post(&url)
            .json(&serde_json::json!({ "query": query, "limit": limit }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TrellisError::Http(format!("POST {}: {}", url, e)))?
            .json()
            .await
            .map_err(|e| TrellisError::Http(format!("Invalid search response: {}", e)))
    }
}
