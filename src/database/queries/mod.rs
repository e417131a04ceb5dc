#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{
    BotStyle, ChatMessage, Document, LineUser, NewBotStyle, NewChatMessage, NewDocument, Setting,
};

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO documents (title, content, filename, is_active, uploaded_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(&new_document.title)
        .bind(&new_document.content)
        .bind(&new_document.filename)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            "SELECT id, title, content, filename, is_active, uploaded_at, updated_at \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        Ok(result)
    }

    /// Active documents in creation order. This is the stable ordering the
    /// index builder iterates, so slot assignment is reproducible for an
    /// unchanged document set.
    #[inline]
    pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, content, filename, is_active, uploaded_at, updated_at \
             FROM documents WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list active documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, content, filename, is_active, uploaded_at, updated_at \
             FROM documents ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn set_active(pool: &SqlitePool, id: i64, is_active: bool) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query("UPDATE documents SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update document active flag")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count_active(pool: &SqlitePool) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE is_active = 1")
            .fetch_one(pool)
            .await
            .context("Failed to count active documents")?;

        Ok(count.0)
    }
}

pub struct LineUserQueries;

impl LineUserQueries {
    #[inline]
    pub async fn get_by_line_id(pool: &SqlitePool, line_user_id: &str) -> Result<Option<LineUser>> {
        let result = sqlx::query_as::<_, LineUser>(
            "SELECT id, line_user_id, display_name, active_style, created_at, last_interaction \
             FROM line_users WHERE line_user_id = ?",
        )
        .bind(line_user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get LINE user")?;

        Ok(result)
    }

    #[inline]
    pub async fn get_or_create(pool: &SqlitePool, line_user_id: &str) -> Result<LineUser> {
        if let Some(user) = Self::get_by_line_id(pool, line_user_id).await? {
            return Ok(user);
        }

        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO line_users (line_user_id, created_at, last_interaction) VALUES (?, ?, ?)",
        )
        .bind(line_user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create LINE user")?;

        Self::get_by_line_id(pool, line_user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created LINE user"))
    }

    #[inline]
    pub async fn set_style(pool: &SqlitePool, line_user_id: &str, style: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE line_users SET active_style = ? WHERE line_user_id = ?")
            .bind(style)
            .bind(line_user_id)
            .execute(pool)
            .await
            .context("Failed to set user style")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn touch(pool: &SqlitePool, line_user_id: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE line_users SET last_interaction = ? WHERE line_user_id = ?")
            .bind(now)
            .bind(line_user_id)
            .execute(pool)
            .await
            .context("Failed to update user last interaction")?;

        Ok(())
    }
}

pub struct ChatMessageQueries;

impl ChatMessageQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_message: NewChatMessage) -> Result<ChatMessage> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO chat_messages (line_user_id, is_user_message, message_text, bot_style, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new_message.line_user_id)
        .bind(new_message.is_user_message)
        .bind(&new_message.message_text)
        .bind(&new_message.bot_style)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create chat message")?
        .last_insert_rowid();

        let message = sqlx::query_as::<_, ChatMessage>(
            "SELECT id, line_user_id, is_user_message, message_text, bot_style, timestamp \
             FROM chat_messages WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to retrieve created chat message")?;

        Ok(message)
    }

    #[inline]
    pub async fn recent_for_user(
        pool: &SqlitePool,
        line_user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT id, line_user_id, is_user_message, message_text, bot_style, timestamp \
             FROM chat_messages WHERE line_user_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(line_user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list chat messages")?;

        Ok(messages)
    }
}

pub struct BotStyleQueries;

impl BotStyleQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_style: NewBotStyle) -> Result<BotStyle> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO bot_styles (name, prompt, description, is_default, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new_style.name)
        .bind(&new_style.prompt)
        .bind(&new_style.description)
        .bind(new_style.is_default)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create bot style")?
        .last_insert_rowid();

        let style = sqlx::query_as::<_, BotStyle>(
            "SELECT id, name, prompt, description, is_default, created_at \
             FROM bot_styles WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to retrieve created bot style")?;

        Ok(style)
    }

    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<BotStyle>> {
        let result = sqlx::query_as::<_, BotStyle>(
            "SELECT id, name, prompt, description, is_default, created_at \
             FROM bot_styles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get bot style by name")?;

        Ok(result)
    }

    #[inline]
    pub async fn get_default(pool: &SqlitePool) -> Result<Option<BotStyle>> {
        let result = sqlx::query_as::<_, BotStyle>(
            "SELECT id, name, prompt, description, is_default, created_at \
             FROM bot_styles WHERE is_default = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(pool)
        .await
        .context("Failed to get default bot style")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<BotStyle>> {
        let styles = sqlx::query_as::<_, BotStyle>(
            "SELECT id, name, prompt, description, is_default, created_at \
             FROM bot_styles ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list bot styles")?;

        Ok(styles)
    }
}

pub struct SettingQueries;

impl SettingQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<Setting>> {
        let result =
            sqlx::query_as::<_, Setting>("SELECT key, value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(pool)
                .await
                .context("Failed to get setting")?;

        Ok(result)
    }

    #[inline]
    pub async fn upsert(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .context("Failed to upsert setting")?;

        Ok(())
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Setting>> {
        let settings =
            sqlx::query_as::<_, Setting>("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(pool)
                .await
                .context("Failed to list settings")?;

        Ok(settings)
    }
}
