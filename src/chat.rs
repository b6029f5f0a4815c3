//! Single-turn chat completions.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{ChatMessage, Role};
use crate::openai::OpenAIClient;
use crate::tokenize::Tokenizer;

/// Optional system message first, then the user prompt.
pub fn build_messages(user: &str, system: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage {
            role: Role::System,
            content: system.to_string(),
        });
    }
    messages.push(ChatMessage {
        role: Role::User,
        content: user.to_string(),
    });
    messages
}

pub struct ChatClient {
    client: OpenAIClient,
}

impl ChatClient {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }

    /// Send `messages` to `POST {base_url}/chat/completions` and return the
    /// trimmed content of the first choice.
    pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        let json = self.client.post("chat/completions", &body).await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .context("Invalid chat response: missing choices[0].message.content")?;
        Ok(content.trim().to_string())
    }
}

/// `courier chat`: print `{"text": <reply>}`.
pub async fn run_chat(
    config: &Config,
    input: &str,
    system: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let model = model.unwrap_or(&config.openai.chat_model);
    let messages = build_messages(input, system);
    tracing::info!("Messages: {}", serde_json::to_string(&messages)?);
    let tokenizer = Tokenizer::for_model(model)?;
    let prompt_tokens: usize = messages.iter().map(|m| tokenizer.count(&m.content)).sum();
    tracing::debug!("Prompt is ~{} tokens ({})", prompt_tokens, tokenizer.name());

    let client = ChatClient::new(OpenAIClient::from_config(&config.openai)?);
    let reply = client
        .complete(model, &messages)
        .await
        .context("Error generating response")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "text": reply }))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_comes_first() {
        let m = build_messages("hi", Some("be brief"));
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].role, Role::System);
        assert_eq!(m[0].content, "be brief");
        assert_eq!(m[1].role, Role::User);
        assert_eq!(m[1].content, "hi");
    }

    #[test]
    fn user_only() {
        let m = build_messages("hi", None);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].role, Role::User);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&build_messages("q", Some("s"))).unwrap();
        assert_eq!(
            json,
            r#"[{"role":"system","content":"s"},{"role":"user","content":"q"}]"#
        );
    }
}
