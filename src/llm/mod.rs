#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, Settings};
use crate::database::DbPool;
use crate::database::queries::BotStyleQueries;

/// Reply sent when generation itself fails. Retrieval failures never reach
/// the user; this is only for a dead generation call.
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not generate a reply right now. Please try again later.";

const DEFAULT_STYLE_PROMPT: &str =
    "You are a warm and attentive assistant. Listen carefully and reply with empathy and practical help.";

#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessagePayload>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessagePayload {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &Config, settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key()
            .context("OpenAI API key not configured")?;

        let endpoint = config
            .openai
            .api_base_url()
            .context("Failed to parse API base URL")?
            .join("/v1/chat/completions")
            .context("Failed to build chat completions URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.openai.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            api_key,
            model: config.openai.chat_model.clone(),
            temperature: settings.temperature(),
            max_tokens: settings.max_tokens(),
            agent,
        })
    }

    /// Run one generation turn. The style prompt becomes the system
    /// message; retrieved context, when present, is injected as a second
    /// system-level segment ahead of the user's message.
    #[inline]
    pub fn generate(
        &self,
        user_message: &str,
        style_prompt: &str,
        rag_context: Option<&str>,
    ) -> Result<String> {
        let today = chrono::Local::now().format("%Y-%m-%d");
        let mut messages = vec![ChatMessagePayload {
            role: "system",
            content: format!("{} Today's date is {}.", style_prompt, today),
        }];

        if let Some(context) = rag_context {
            messages.push(ChatMessagePayload {
                role: "system",
                content: format!(
                    "Here is some additional context that might be helpful: {}",
                    context
                ),
            });
        }

        messages.push(ChatMessagePayload {
            role: "user",
            content: user_message.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!("Requesting chat completion from {}", self.endpoint);

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat response contained no content")
    }
}

/// Resolve the style prompt for a turn: the per-user override first, then
/// the configured active style, then the stored default row.
#[inline]
pub async fn resolve_style_prompt(
    pool: &DbPool,
    settings: &Settings,
    user_style: Option<&str>,
) -> Result<String> {
    let style_name = user_style
        .map(str::to_string)
        .unwrap_or_else(|| settings.active_style());

    if let Some(style) = BotStyleQueries::get_by_name(pool, &style_name).await? {
        return Ok(style.prompt);
    }

    warn!("Bot style '{}' not found, using default", style_name);

    if let Some(style) = BotStyleQueries::get_default(pool).await? {
        return Ok(style.prompt);
    }

    Ok(DEFAULT_STYLE_PROMPT.to_string())
}
