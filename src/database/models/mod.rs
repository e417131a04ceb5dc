#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A knowledge-base entry. Inactive documents stay in the store but are
/// excluded from index rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub filename: Option<String>,
    pub is_active: bool,
    pub uploaded_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LineUser {
    pub id: i64,
    pub line_user_id: String,
    pub display_name: Option<String>,
    pub active_style: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_interaction: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub line_user_id: String,
    pub is_user_message: bool,
    pub message_text: String,
    pub bot_style: Option<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChatMessage {
    pub line_user_id: String,
    pub is_user_message: bool,
    pub message_text: String,
    pub bot_style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BotStyle {
    pub id: i64,
    pub name: String,
    pub prompt: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBotStyle {
    pub name: String,
    pub prompt: String,
    pub description: Option<String>,
    pub is_default: bool,
}

/// One row of the runtime key/value configuration backing
/// [`crate::config::Settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
}
