pub mod providers;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use trellis_core::config::ModelConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::ReasoningBackend;

pub use providers::ollama::OllamaClient;
pub use providers::openai::OpenAiClient;

/// Create a reasoning backend based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ReasoningBackend>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(config.clone())?)),
        "openai" | "vllm" | "openai-compatible" => Ok(Arc::new(OpenAiClient::new(config.clone())?)),
        other => Err(TrellisError::UnsupportedProvider(other.to_string())),
    }
}

/// Bound a backend call by the configured timeout. A timeout is a failure, never retried.
pub(crate) async fn with_timeout<T>(
    timeout_secs: u64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(TrellisError::BackendTimeout { timeout_secs }),
    }
}

/// Split inline `<think>...</think>` blocks out of model content.
///
/// Returns the visible content and the concatenated reasoning, if any.
pub(crate) fn split_think_tags(content: &str) -> (String, Option<String>) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut visible = String::new();
    let mut reasoning = String::new();
    let mut rest = content;

    while let Some(start) = rest.find(OPEN) {
        visible.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        match after.find(CLOSE) {
            Some(end) => {
                reasoning.push_str(after[..end].trim());
                rest = &after[end + CLOSE.len()..];
            }
            None => {
                reasoning.push_str(after.trim());
                rest = "";
            }
        }
    }
    visible.push_str(rest);

    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning)
    };
    (visible.trim().to_string(), reasoning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_think_tags_extracts_reasoning() {
        let (visible, reasoning) =
            split_think_tags("<think>\nuser wants weather\n</think>\n\n서울은 맑습니다.");
        assert_eq!(visible, "서울은 맑습니다.");
        assert_eq!(reasoning.as_deref(), Some("user wants weather"));
    }

    #[test]
    fn split_think_tags_passthrough() {
        let (visible, reasoning) = split_think_tags("SELECT 1");
        assert_eq!(visible, "SELECT 1");
        assert!(reasoning.is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = ModelConfig::ollama("qwen3:8b");
        config.provider = "carrier-pigeon".into();
        assert!(matches!(
            create_client(&config),
            Err(TrellisError::UnsupportedProvider(_))
        ));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let result: Result<()> = with_timeout(0, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(TrellisError::BackendTimeout { timeout_secs: 0 })
        ));
    }
}
