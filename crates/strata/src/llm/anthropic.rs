//! Anthropic LLM provider with native API format.

use async_trait::async_trait;
use reqwest::Client;

use super::error::{LLMError, error_from_response};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};

/// Anthropic provider with native API format.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl AnthropicProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";
    const DEFAULT_MAX_TOKENS: u32 = 4096;

    pub fn new(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let url = format!("{}/v1/messages", self.base_url);
        let anthropic_request = to_request(&request);

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let anthropic_response: Response = response.json().await?;
        Ok(from_response(anthropic_response))
    }

    async fn probe(&self) -> Result<(), LLMError> {
        let url = format!("{}/v1/models", self.base_url);

        let response = self.authorize(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(())
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(serde::Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(serde::Deserialize)]
struct Response {
    id: String,
    content: Vec<ResponseContent>,
    stop_reason: Option<String>,
    usage: Option<ResponseUsage>,
}

#[derive(serde::Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(serde::Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Conversions
// ============================================================================

fn to_request(request: &ChatRequest) -> Request {
    let mut system = None;
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            // Anthropic wants system as a separate field
            Role::System => system = Some(msg.content.clone()),
            Role::User => messages.push(RequestMessage {
                role: "user",
                content: msg.content.clone(),
            }),
            Role::Assistant => messages.push(RequestMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    Request {
        model: request.model.clone(),
        max_tokens: request
            .max_tokens
            .unwrap_or(AnthropicProvider::DEFAULT_MAX_TOKENS),
        system,
        messages,
        temperature: request.temperature,
    }
}

fn from_response(response: Response) -> ChatResponse {
    let content = response
        .content
        .into_iter()
        .filter(|c| c.content_type == "text")
        .map(|c| c.text)
        .collect::<Vec<_>>()
        .join("");

    ChatResponse {
        id: response.id,
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: Role::Assistant,
                content,
            },
            finish_reason: response.stop_reason,
        }],
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_moves_to_top_level_field() {
        let request = ChatRequest {
            model: "claude-3-haiku-20240307".to_string(),
            messages: vec![
                Message {
                    role: Role::System,
                    content: "Be brief.".to_string(),
                },
                Message {
                    role: Role::User,
                    content: "Name a colour.".to_string(),
                },
            ],
            temperature: Some(0.0),
            max_tokens: None,
        };

        let json = serde_json::to_value(to_request(&request)).unwrap();
        assert_eq!(json["system"], "Be brief.");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_text_blocks_are_joined_and_usage_summed() {
        let response: Response = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "content": [
                    {"type": "text", "text": "Auto"},
                    {"type": "text", "text": "Works"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 3}
            }"#,
        )
        .unwrap();

        let chat = from_response(response);
        let choice = chat.first_choice().unwrap();
        assert_eq!(choice.message.content, "AutoWorks");
        assert_eq!(choice.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(chat.usage.unwrap().total_tokens, 15);
    }
}
