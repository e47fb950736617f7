use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::stream::LineDecoder;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for the chat endpoint: the full conversation every turn.
#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

/// Progress reports from an in-flight request, delivered to the TUI through
/// the shared event channel.
#[derive(Debug)]
pub enum ChatUpdate {
    Delta(String),
    Done,
    // Network error or non-success status; the UI shows one fixed reply
    // regardless of the cause, so no detail travels with it.
    Failed,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the conversation and stream the reply. Each decoded `response`
    /// fragment is handed to `on_delta` as it arrives; the accumulated reply
    /// is returned once the transport closes.
    ///
    /// Any non-success status or transport error is one uniform failure; the
    /// caller decides what to do with a partial reply.
    pub async fn stream_chat<F>(&self, messages: &[ChatMessage], mut on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { messages })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let mut byte_stream = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut reply = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for record in decoder.push(&chunk) {
                if let Some(fragment) = record.response {
                    reply.push_str(&fragment);
                    on_delta(&fragment);
                }
            }
        }
        for record in decoder.finish() {
            if let Some(fragment) = record.response {
                reply.push_str(&fragment);
                on_delta(&fragment);
            }
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn request_body_wraps_full_history() {
        let messages = vec![ChatMessage::assistant("Hello!"), ChatMessage::user("hey")];
        let body = serde_json::to_value(ChatRequest {
            messages: &messages,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "messages": [
                    {"role": "assistant", "content": "Hello!"},
                    {"role": "user", "content": "hey"},
                ]
            })
        );
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = ChatClient::new("http://localhost:8787/");
        assert_eq!(client.base_url(), "http://localhost:8787");
    }
}
