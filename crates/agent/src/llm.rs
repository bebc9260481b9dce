use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Always reports the provider as unavailable, which routes every adapter to
/// its deterministic fallback. Used when no provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow::anyhow!("llm provider is not configured"))
    }
}

/// Replays a fixed sequence of completions. Test double shared across the
/// workspace so engine scenarios can script provider behavior.
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlmClient {
    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        Self { responses: Mutex::new(responses.into()) }
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(response.into()));
        }
    }

    pub fn push_err(&self, error: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(error.into()));
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let next = match self.responses.lock() {
            Ok(mut responses) => responses.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(anyhow::anyhow!(error)),
            None => Err(anyhow::anyhow!("scripted llm client has no responses left")),
        }
    }
}

/// Strict JSON decode of a completion into a typed draft. Providers wrap
/// JSON in prose or code fences often enough that the first balanced object
/// in the text is what gets parsed.
pub(crate) fn decode_structured<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if let Ok(decoded) = serde_json::from_str::<T>(trimmed) {
        return Ok(decoded);
    }

    let start = trimmed
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("completion contains no JSON object"))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| anyhow::anyhow!("completion contains no closing brace"))?;
    if end < start {
        return Err(anyhow::anyhow!("completion contains no JSON object"));
    }

    serde_json::from_str::<T>(&trimmed[start..=end])
        .map_err(|error| anyhow::anyhow!("schema-invalid completion: {error}"))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{decode_structured, LlmClient, ScriptedLlmClient};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        reply: String,
    }

    #[tokio::test]
    async fn scripted_client_replays_responses_in_order() {
        let client = ScriptedLlmClient::with_responses(vec![
            Ok("first".to_owned()),
            Err("provider down".to_owned()),
        ]);

        assert_eq!(client.complete("p").await.expect("first"), "first");
        assert!(client.complete("p").await.is_err());
        assert!(client.complete("p").await.is_err());
    }

    #[test]
    fn decodes_bare_json() {
        let probe: Probe = decode_structured(r#"{"reply": "hi"}"#).expect("decode");
        assert_eq!(probe.reply, "hi");
    }

    #[test]
    fn decodes_json_wrapped_in_prose_or_fences() {
        let raw = "Sure! Here is the draft:\n```json\n{\"reply\": \"hi there\"}\n```";
        let probe: Probe = decode_structured(raw).expect("decode");
        assert_eq!(probe.reply, "hi there");
    }

    #[test]
    fn rejects_completions_without_json() {
        assert!(decode_structured::<Probe>("no structure here").is_err());
        assert!(decode_structured::<Probe>(r#"{"wrong_field": 1}"#).is_err());
    }
}
