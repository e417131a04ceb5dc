#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::{Event, EventHandler, Reply};
use crate::config::{Config, Settings};
use crate::database::Database;
use crate::database::models::NewChatMessage;
use crate::database::queries::{ChatMessageQueries, LineUserQueries};
use crate::llm::{ChatClient, FALLBACK_REPLY, resolve_style_prompt};
use crate::retrieval::Retriever;
use crate::websearch;

const STYLE_USAGE: &str = "Please provide a style name, e.g. /style default";
const SEARCH_USAGE: &str = "Please provide a search keyword, e.g. /search Taipei weather";
const SEARCH_UNAVAILABLE: &str =
    "Sorry, web search is currently unavailable or found no results.";

/// Handles inbound text messages: persists the conversation, resolves the
/// reply (style command, web search command, or RAG-augmented generation)
/// and returns it for delivery.
pub struct ChatHandler {
    database: Database,
    config: Config,
    settings: Arc<Settings>,
    retriever: Retriever,
}

impl ChatHandler {
    #[inline]
    pub fn new(database: Database, config: Config, settings: Arc<Settings>) -> Self {
        let retriever = Retriever::new(config.clone(), Arc::clone(&settings));
        Self {
            database,
            config,
            settings,
            retriever,
        }
    }

    async fn handle_text(&self, user_id: &str, reply_token: &str, text: &str) -> Result<Reply> {
        let pool = self.database.pool();

        let user = LineUserQueries::get_or_create(pool, user_id).await?;
        LineUserQueries::touch(pool, user_id).await?;

        ChatMessageQueries::create(
            pool,
            NewChatMessage {
                line_user_id: user_id.to_string(),
                is_user_message: true,
                message_text: text.to_string(),
                bot_style: None,
            },
        )
        .await?;

        let (reply_text, style_used) = if let Some(style_name) = text.strip_prefix("/style ") {
            self.set_style(user_id, style_name.trim()).await?
        } else if let Some(query) = text
            .strip_prefix("/search ")
            .or_else(|| text.strip_prefix("/搜尋 "))
        {
            (self.answer_from_web(query.trim()), None)
        } else {
            let style = user.active_style.clone();
            (
                self.answer_with_generation(text, style.as_deref()).await?,
                style,
            )
        };

        ChatMessageQueries::create(
            pool,
            NewChatMessage {
                line_user_id: user_id.to_string(),
                is_user_message: false,
                message_text: reply_text.clone(),
                bot_style: style_used,
            },
        )
        .await?;

        Ok(Reply {
            reply_token: reply_token.to_string(),
            text: reply_text,
        })
    }

    async fn set_style(
        &self,
        user_id: &str,
        style_name: &str,
    ) -> Result<(String, Option<String>)> {
        if style_name.is_empty() {
            return Ok((STYLE_USAGE.to_string(), None));
        }

        LineUserQueries::set_style(self.database.pool(), user_id, style_name).await?;
        info!("User {} switched to style '{}'", user_id, style_name);

        Ok((
            format!("Style set to: {}", style_name),
            Some(style_name.to_string()),
        ))
    }

    fn answer_from_web(&self, query: &str) -> String {
        if query.is_empty() {
            return SEARCH_USAGE.to_string();
        }

        websearch::answer_with_web_search(&self.config, &self.settings, query)
            .unwrap_or_else(|| SEARCH_UNAVAILABLE.to_string())
    }

    async fn answer_with_generation(
        &self,
        text: &str,
        user_style: Option<&str>,
    ) -> Result<String> {
        // Retrieval failures degrade silently to context-free generation.
        let rag_context = self.retriever.build_context(text);

        let style_prompt =
            resolve_style_prompt(self.database.pool(), &self.settings, user_style).await?;

        let reply = match ChatClient::new(&self.config, &self.settings) {
            Ok(chat) => match chat.generate(text, &style_prompt, rag_context.as_deref()) {
                Ok(reply) => reply,
                Err(generation_error) => {
                    error!("Failed to generate reply: {}", generation_error);
                    FALLBACK_REPLY.to_string()
                }
            },
            Err(config_error) => {
                error!("Chat client unavailable: {}", config_error);
                FALLBACK_REPLY.to_string()
            }
        };

        Ok(reply)
    }
}

#[async_trait]
impl EventHandler for ChatHandler {
    async fn handle(&self, event: &Event) -> Result<Option<Reply>> {
        match event {
            Event::TextMessage {
                user_id,
                reply_token,
                text,
            } => {
                let reply = self.handle_text(user_id, reply_token, text).await?;
                Ok(Some(reply))
            }
            Event::Follow { .. } | Event::Unfollow { .. } => Ok(None),
        }
    }
}
