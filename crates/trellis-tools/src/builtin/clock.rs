use futures::future::BoxFuture;
use serde::Deserialize;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::Tool;
use trellis_core::types::{ToolContext, ToolResult};

// ── CurrentTimeTool ─────────────────────────────────────────────

pub struct CurrentTimeTool;

impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn description(&self) -> &str {
        "현재 시각을 가져올 때 사용합니다. 예: '지금 몇시야?', '오늘 몇일이야?'"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let now = chrono::Local::now().naive_local();
            Ok(ToolResult::success(
                now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            ))
        })
    }
}

// ── WeatherTool ─────────────────────────────────────────────────

pub struct WeatherTool;

#[derive(Deserialize)]
struct WeatherInput {
    city: String,
}

/// Canned weather report for a city.
pub fn weather_for(city: &str) -> &'static str {
    match city.to_lowercase().as_str() {
        "seoul" => "맑음, 28°C",
        "newyork" => "안개, 15°C",
        _ => "알 수 없는 도시입니다.",
    }
}

impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn description(&self) -> &str {
        "특정 도시의 현재 날씨 정보를 가져옵니다."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "enum": ["seoul", "newyork"],
                    "description": "'seoul' 또는 'newyork'."
                },
                "current_time": {
                    "type": "string",
                    "description": "현재 시각을 나타내는 '%Y-%m-%d %H:%M:%S' 포맷의 문자열."
                }
            },
            "required": ["city", "current_time"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: WeatherInput = serde_json::from_value(input)
                .map_err(|e| TrellisError::ToolValidation(e.to_string()))?;
            Ok(ToolResult::success(weather_for(&params.city)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::ConversationId;

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: ConversationId::new(),
            step: "casual_chat.tools".into(),
        }
    }

    #[tokio::test]
    async fn weather_known_and_unknown_cities() {
        let tool = WeatherTool;
        let seoul = tool
            .execute(
                serde_json::json!({"city": "seoul", "current_time": "2025-07-01T09:00:00"}),
                ctx(),
            )
            .await
            .unwrap();
        assert_eq!(seoul.content, "맑음, 28°C");
        assert_eq!(weather_for("NewYork"), "안개, 15°C");
        assert_eq!(weather_for("busan"), "알 수 없는 도시입니다.");
    }

    #[tokio::test]
    async fn weather_requires_city() {
        let err = WeatherTool
            .execute(serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn current_time_is_iso8601() {
        let result = CurrentTimeTool
            .execute(serde_json::json!({}), ctx())
            .await
            .unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(&result.content, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }
}
