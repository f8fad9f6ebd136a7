//! OpenAI-compatible chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use ww_core::constants::HTTP_TIMEOUT_SECS;
use ww_core::error::UpstreamError;
use ww_core::traits::ChatClient;
use ww_core::{ChatMessage, ChatRole};

pub const DEFAULT_CHAT_MODEL: &str = "grok-3-latest";

pub struct HttpChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl HttpChatClient {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| UpstreamError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            temperature: 0.7,
        })
    }

    fn body(&self, system_prompt: &str, history: &[ChatMessage], message: &str) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({ "role": "system", "content": system_prompt }));
        for m in history {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": m.content }));
        }
        messages.push(json!({ "role": "user", "content": message }));

        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
        })
    }
}

fn extract_reply(body: &Value) -> Result<String, UpstreamError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| UpstreamError::InvalidResponse("no choices in chat response".into()))
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, UpstreamError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(system_prompt, history, message))
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "chat api error");
            return Err(UpstreamError::Unavailable(format!("chat api returned {status}")));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        extract_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_orders_system_history_message() {
        let client = HttpChatClient::new("https://chat.example/v1/chat/completions", "k", DEFAULT_CHAT_MODEL).unwrap();
        let history = [ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let body = client.body("be brief", &history, "what is gas?");

        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], "what is gas?");
        assert_eq!(body["model"], DEFAULT_CHAT_MODEL);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn reply_extraction() {
        let ok = json!({ "choices": [{ "message": { "role": "assistant", "content": "Gas is a fee." } }] });
        assert_eq!(extract_reply(&ok).unwrap(), "Gas is a fee.");
        assert!(extract_reply(&json!({ "choices": [] })).is_err());
    }
}
