use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::Tool;
use trellis_core::types::{ToolContext, ToolResult};

use crate::warehouse::{QueryOutcome, WarehouseClient};

/// Runs SQL against the warehouse. Rows are returned as text and as a
/// structured payload.
pub struct ExecuteQueryTool {
    warehouse: Arc<WarehouseClient>,
}

impl ExecuteQueryTool {
    pub fn new(warehouse: Arc<WarehouseClient>) -> Self {
        Self { warehouse }
    }
}

#[derive(Deserialize)]
struct ExecuteQueryInput {
    sql: String,
}

impl Tool for ExecuteQueryTool {
    fn name(&self) -> &str {
        "execute_query"
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn description(&self) -> &str {
        "SQLite 데이터베이스에 SQL을 실행하고 쿼리 결과를 응답합니다."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string", "description": "SQLite에서 실행 가능한 SQL 문자열" }
            },
            "required": ["sql"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ExecuteQueryInput = serde_json::from_value(input)
                .map_err(|e| TrellisError::ToolValidation(e.to_string()))?;

            match self.warehouse.execute(&params.sql).await? {
                QueryOutcome::Rows(rows) => {
                    let payload = serde_json::Value::Array(rows);
                    let text = serde_json::to_string(&serde_json::json!({ "data": &payload }))?;
                    Ok(ToolResult::success(text).with_payload(payload))
                }
                QueryOutcome::Rejected(detail) => Ok(ToolResult::error(detail)),
            }
        })
    }
}
