use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::Tool;
use trellis_core::types::{ToolContext, ToolResult};

use crate::rag::RagClient;

async fn search_as_result(
    rag: &RagClient,
    collection: &str,
    query: &str,
    limit: usize,
) -> Result<ToolResult> {
    let hits = rag.search(collection, query, limit).await?;
    let payload = serde_json::to_value(&hits)?;
    Ok(ToolResult::success(serde_json::to_string(&payload)?).with_payload(payload))
}

// ── InternalDocumentsTool ───────────────────────────────────────

/// Searches the internal document collection.
pub struct InternalDocumentsTool {
    rag: Arc<RagClient>,
    collection: String,
}

impl InternalDocumentsTool {
    pub fn new(rag: Arc<RagClient>, collection: &str) -> Self {
        Self {
            rag,
            collection: collection.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DocumentsInput {
    query: String,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    4
}

impl Tool for InternalDocumentsTool {
    fn name(&self) -> &str {
        "get_internal_documents"
    }

    fn description(&self) -> &str {
        "유저의 질의에 가장 연관성이 높은 문서를 검색할 때 사용합니다. \
         일반적인 질문이 아닌 사내 문서 데이터베이스에서 조회가 필요할 때 연관 문서를 가져올 수 있습니다."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "VectorStore에서 검색하기 위한 쿼리." },
                "count": { "type": "integer", "description": "연관 문서 상위 몇개를 가져올 지. 기본값: 4" }
            },
            "required": ["query"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: DocumentsInput = serde_json::from_value(input)
                .map_err(|e| TrellisError::ToolValidation(e.to_string()))?;
            search_as_result(&self.rag, &self.collection, &params.query, params.count).await
        })
    }
}

// ── TableSchemasTool ────────────────────────────────────────────

/// Searches the table schema collection. Always returns up to ten schemas.
pub struct TableSchemasTool {
    rag: Arc<RagClient>,
    collection: String,
}

impl TableSchemasTool {
    pub fn new(rag: Arc<RagClient>, collection: &str) -> Self {
        Self {
            rag,
            collection: collection.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SchemasInput {
    query: String,
}

impl Tool for TableSchemasTool {
    fn name(&self) -> &str {
        "get_table_schemas"
    }

    fn description(&self) -> &str {
        "유저가 원하는 데이터를 조회하기 위해 필요한 연관성이 높은 테이블 스키마를 검색할 때 사용합니다. \
         Join과 같은 복잡한 SQL이 요구되는 경우, 관련 테이블이 여러개 있을 수 있습니다."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "VectorStore에서 검색하기 위한 쿼리. 핵심 사용자 질문에 해당하는 자연어를 그대로 사용하세요."
                }
            },
            "required": ["query"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: SchemasInput = serde_json::from_value(input)
                .map_err(|e| TrellisError::ToolValidation(e.to_string()))?;
            search_as_result(&self.rag, &self.collection, &params.query, 10).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::types::ConversationId;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn schemas_tool_searches_ten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"uuid": "s-1", "name": "db_table_schemas"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/s-1/documents/search"))
            .and(body_json(json!({"query": "account region", "limit": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"page_content": "CREATE TABLE account (...)", "score": 0.8, "metadata": {"filename": "account.json"}}
            ])))
            .mount(&server)
            .await;

        let rag = Arc::new(RagClient::new(&server.uri(), 5).unwrap());
        let tool = TableSchemasTool::new(rag, "db_table_schemas");
        let result = tool
            .execute(
                json!({"query": "account region"}),
                ToolContext {
                    conversation_id: ConversationId::new(),
                    step: "text_to_sql.tools".into(),
                },
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("CREATE TABLE account"));
        assert_eq!(result.payload.unwrap()[0]["metadata"]["filename"], "account.json");
    }

    #[test]
    fn documents_count_defaults_to_four() {
        let input: DocumentsInput = serde_json::from_value(json!({"query": "vpn"})).unwrap();
        assert_eq!(input.count, 4);
    }
}
