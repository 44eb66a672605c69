use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trellis_core::config::ModelConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::ReasoningBackend;
use trellis_core::types::*;

use crate::{split_think_tags, with_timeout};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions client. Works with OpenAI, vLLM, and
/// Ollama's `/v1` endpoint.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
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
            .unwrap_or(OPENAI_API_URL)
            .trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Serialize, Debug)]
struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OaiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "function_type")]
    r#type: String,
    function: OaiFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

#[derive(Deserialize, Debug)]
struct OaiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(instruction: &str, messages: &[ChatMessage]) -> Vec<OaiMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !instruction.is_empty() {
        out.push(OaiMessage {
            role: "system".to_string(),
            content: Some(instruction.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in messages {
        let oai = match msg.role {
            Role::System => OaiMessage {
                role: "system".to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Human => OaiMessage {
                role: "user".to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Tool => OaiMessage {
                role: "tool".to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: msg.tool_call_id.clone(),
            },
            Role::Assistant if msg.has_tool_calls() => OaiMessage {
                role: "assistant".to_string(),
                content: if msg.content.is_empty() {
                    None
                } else {
                    Some(msg.content.clone())
                },
                tool_calls: Some(
                    msg.tool_calls
                        .iter()
                        .map(|c| OaiToolCall {
                            id: Some(c.id.clone()),
                            r#type: function_type(),
                            function: OaiFunction {
                                name: c.name.clone(),
                                arguments: c.args.to_string(),
                            },
                        })
                        .collect(),
                ),
                tool_call_id: None,
            },
            Role::Assistant => OaiMessage {
                role: "assistant".to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
        };
        out.push(oai);
    }
    out
}

fn convert_tool_choice(choice: &ToolChoice) -> Option<serde_json::Value> {
    match choice {
        ToolChoice::Auto => None,
        ToolChoice::None => Some(serde_json::json!("none")),
        ToolChoice::Required(name) => Some(serde_json::json!({
            "type": "function",
            "function": {"name": name}
        })),
    }
}

fn parse_response(resp: ChatResponse) -> Result<BackendResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TrellisError::BackendParse("response has no choices".to_string()))?;

    let (content, inline_reasoning) =
        split_think_tags(choice.message.content.as_deref().unwrap_or_default());
    let reasoning = choice
        .message
        .reasoning_content
        .filter(|r| !r.trim().is_empty())
        .or(inline_reasoning);

    let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
    for call in choice.message.tool_calls {
        let args = if call.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|e| {
                TrellisError::BackendParse(format!(
                    "invalid arguments for tool call {}: {}",
                    call.function.name, e
                ))
            })?
        };
        let mut tc = ToolCall::new(call.function.name, args);
        if let Some(id) = call.id {
            tc = tc.with_id(id);
        }
        tool_calls.push(tc);
    }

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(BackendResponse {
        content,
        tool_calls,
        reasoning,
        usage,
    })
}

impl ReasoningBackend for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse>> {
        Box::pin(async move {
            let tools: Vec<OaiTool> = match request.tool_choice {
                ToolChoice::None => Vec::new(),
                _ => request
                    .tools
                    .iter()
                    .map(|t| OaiTool {
                        r#type: function_type(),
                        function: OaiToolDef {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            };

            let body = ChatRequest {
                model: request
                    .model
                    .clone()
                    .unwrap_or_else(|| self.config.model_id.clone()),
                messages: convert_messages(&request.instruction, &request.messages),
                temperature: if self.config.temperature > 0.0 {
                    Some(self.config.temperature)
                } else {
                    None
                },
                stream: false,
                tool_choice: if tools.is_empty() {
                    None
                } else {
                    convert_tool_choice(&request.tool_choice)
                },
                tools,
            };

            debug!(model = %body.model, messages = body.messages.len(), "Chat completions request");

            with_timeout(self.config.timeout_secs, async {
                let mut req = self.http.post(self.endpoint()).json(&body);
                if let Some(api_key) = &self.config.api_key {
                    req = req.header("Authorization", format!("Bearer {}", api_key));
                }

                let response = req
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
                parse_response(parsed)
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
    fn assistant_calls_serialize_as_function_calls() {
        let messages = vec![ChatMessage::assistant_with_calls(
            "",
            vec![ToolCall::new("execute_query", json!({"query": "SELECT 1"})).with_id("c9")],
        )];
        let converted = convert_messages("", &messages);
        assert_eq!(converted.len(), 1);
        assert!(converted[0].content.is_none());
        let calls = converted[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("c9"));
        assert_eq!(calls[0].function.arguments, r#"{"query":"SELECT 1"}"#);
    }

    #[test]
    fn required_tool_choice_names_function() {
        let value = convert_tool_choice(&ToolChoice::Required("route".into())).unwrap();
        assert_eq!(value["function"]["name"], "route");
        assert!(convert_tool_choice(&ToolChoice::Auto).is_none());
    }

    #[test]
    fn parses_reasoning_content_separately() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "SELECT count(*) FROM orders",
                    "reasoning_content": "count rows"
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(resp).unwrap();
        assert_eq!(parsed.content, "SELECT count(*) FROM orders");
        assert_eq!(parsed.reasoning.as_deref(), Some("count rows"));
        assert_eq!(parsed.usage.output_tokens, 5);
    }

    #[test]
    fn malformed_arguments_are_parse_errors() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{not json"}
                    }]
                }
            }]
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            parse_response(resp),
            Err(TrellisError::BackendParse(_))
        ));
    }

    #[test]
    fn endpoint_appends_path() {
        let mut config = ModelConfig::ollama("qwen3:8b");
        config.provider = "openai".into();
        config.base_url = Some("http://localhost:11434/v1/".into());
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
