use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trellis_core::config::ModelConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::ReasoningBackend;
use trellis_core::types::*;

use crate::{split_think_tags, with_timeout};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Client for Ollama's native `/api/chat` endpoint.
pub struct OllamaClient {
    http: Client,
    config: ModelConfig,
}

impl OllamaClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| TrellisError::Backend(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .trim_end_matches('/');
        format!("{}/api/chat", base)
    }
}

// Request types
#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    think: bool,
    options: ChatOptions,
}

#[derive(Serialize, Debug)]
struct ChatOptions {
    num_ctx: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Serialize, Deserialize, Debug)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize, Debug)]
struct OllamaTool {
    r#type: String,
    function: OllamaToolDef,
}

#[derive(Serialize, Debug)]
struct OllamaToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Human => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn convert_messages(instruction: &str, messages: &[ChatMessage]) -> Vec<OllamaMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !instruction.is_empty() {
        out.push(OllamaMessage {
            role: "system".to_string(),
            content: instruction.to_string(),
            ..Default::default()
        });
    }
    for msg in messages {
        out.push(OllamaMessage {
            role: role_name(msg.role).to_string(),
            content: msg.content.clone(),
            thinking: None,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|c| OllamaToolCall {
                    function: OllamaFunction {
                        name: c.name.clone(),
                        arguments: c.args.clone(),
                    },
                })
                .collect(),
            tool_name: match msg.role {
                Role::Tool => msg.name.clone(),
                _ => None,
            },
        });
    }
    out
}

/// Ollama has no tool-choice parameter; a required tool is enforced by
/// offering only that tool.
fn select_tools(tools: &[ToolDefinition], choice: &ToolChoice) -> Vec<OllamaTool> {
    tools
        .iter()
        .filter(|t| match choice {
            ToolChoice::Auto => true,
            ToolChoice::Required(name) => &t.name == name,
            ToolChoice::None => false,
        })
        .map(|t| OllamaTool {
            r#type: "function".to_string(),
            function: OllamaToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

fn parse_response(resp: ChatResponse) -> BackendResponse {
    let (content, inline_reasoning) = split_think_tags(&resp.message.content);
    let reasoning = resp
        .message
        .thinking
        .filter(|t| !t.trim().is_empty())
        .or(inline_reasoning);

    let tool_calls = resp
        .message
        .tool_calls
        .into_iter()
        .map(|c| ToolCall::new(c.function.name, c.function.arguments))
        .collect();

    BackendResponse {
        content,
        tool_calls,
        reasoning,
        usage: Usage {
            input_tokens: resp.prompt_eval_count,
            output_tokens: resp.eval_count,
        },
    }
}

impl ReasoningBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: request
                    .model
                    .clone()
                    .unwrap_or_else(|| self.config.model_id.clone()),
                messages: convert_messages(&request.instruction, &request.messages),
                tools: select_tools(&request.tools, &request.tool_choice),
                stream: false,
                think: request.reasoning.unwrap_or(self.config.reasoning),
                options: ChatOptions {
                    num_ctx: self.config.num_ctx,
                    temperature: self.config.temperature,
                },
            };

            debug!(model = %body.model, messages = body.messages.len(), tools = body.tools.len(), "Ollama chat request");

            with_timeout(self.config.timeout_secs, async {
                let response = self
                    .http
                    .post(self.endpoint())
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| TrellisError::Backend(e.to_string()))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown".to_string());
                    return Err(TrellisError::Backend(format!("HTTP {}: {}", status, body)));
                }

                let parsed: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| TrellisError::BackendParse(e.to_string()))?;
                Ok(parse_response(parsed))
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_transcript_with_instruction() {
        let messages = vec![
            ChatMessage::human("서울 날씨 알려줘"),
            ChatMessage::assistant_with_calls(
                "",
                vec![ToolCall::new("get_weather", json!({"city": "seoul"})).with_id("c1")],
            ),
            ChatMessage::tool_result("c1", "get_weather", "맑음, 28°C"),
        ];
        let converted = convert_messages("You are helpful.", &messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].tool_calls[0].function.name, "get_weather");
        assert_eq!(converted[3].role, "tool");
        assert_eq!(converted[3].tool_name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn required_choice_offers_single_tool() {
        let tools = vec![
            ToolDefinition {
                name: "route".into(),
                description: "pick".into(),
                input_schema: json!({"type": "object"}),
            },
            ToolDefinition {
                name: "other".into(),
                description: "other".into(),
                input_schema: json!({"type": "object"}),
            },
        ];
        let selected = select_tools(&tools, &ToolChoice::Required("route".into()));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].function.name, "route");
        assert!(select_tools(&tools, &ToolChoice::None).is_empty());
    }

    #[test]
    fn parses_tool_calls_and_thinking() {
        let raw = json!({
            "model": "qwen3:8b",
            "message": {
                "role": "assistant",
                "content": "",
                "thinking": "need the weather tool",
                "tool_calls": [
                    {"function": {"name": "get_weather", "arguments": {"city": "seoul"}}}
                ]
            },
            "done": true,
            "prompt_eval_count": 120,
            "eval_count": 14
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(resp);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].args["city"], "seoul");
        assert!(parsed.tool_calls[0].id.starts_with("call_"));
        assert_eq!(parsed.reasoning.as_deref(), Some("need the weather tool"));
        assert_eq!(parsed.usage.input_tokens, 120);
    }
}
