
use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::database::DbPool;
use crate::database::queries::SettingQueries;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const RAG_ENABLED: &str = "RAG_ENABLED";
pub const RAG_TOP_K: &str = "RAG_TOP_K";
pub const WEB_SEARCH_ENABLED: &str = "WEB_SEARCH_ENABLED";
pub const SERPAPI_KEY: &str = "SERPAPI_KEY";
pub const ACTIVE_BOT_STYLE: &str = "ACTIVE_BOT_STYLE";
pub const OPENAI_TEMPERATURE: &str = "OPENAI_TEMPERATURE";
pub const OPENAI_MAX_TOKENS: &str = "OPENAI_MAX_TOKENS";

pub const DEFAULT_BOT_STYLE: &str = "default";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Runtime settings provider.
///
/// Values live in the `settings` table and are mirrored in an in-memory
/// cache loaded at construction. Environment variables override stored
/// values. The cache is only repopulated through [`Settings::refresh`] or
/// [`Settings::set`]; external writers (e.g. a second process) are not
/// observed until the next refresh.
pub struct Settings {
    pool: DbPool,
    cache: RwLock<HashMap<String, String>>,
}

impl Settings {
    #[inline]
    pub async fn load(pool: DbPool) -> Result<Self> {
        let settings = Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        };
        settings.refresh().await?;
        Ok(settings)
    }

    /// Reload the entire cache from the database.
    #[inline]
    pub async fn refresh(&self) -> Result<()> {
        let rows = SettingQueries::list_all(&self.pool).await?;

        let mut fresh = HashMap::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.value {
                fresh.insert(row.key, value);
            }
        }
        debug!("Loaded {} settings from database", fresh.len());

        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = fresh;

        Ok(())
    }

    /// Look up a setting. Environment variables take precedence over stored
    /// values.
    #[inline]
    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }

        let cache = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.get(key).cloned()
    }

    /// Write a setting to the database and the cache.
    #[inline]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        SettingQueries::upsert(&self.pool, key, value).await?;

        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.insert(key.to_string(), value.to_string());

        Ok(())
    }

    #[inline]
    pub fn openai_api_key(&self) -> Option<String> {
        self.get(OPENAI_API_KEY).filter(|key| !key.trim().is_empty())
    }

    #[inline]
    pub fn rag_enabled(&self) -> bool {
        self.get(RAG_ENABLED)
            .map_or(true, |value| value.eq_ignore_ascii_case("true"))
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.get(RAG_TOP_K)
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TOP_K)
    }

    #[inline]
    pub fn web_search_enabled(&self) -> bool {
        self.get(WEB_SEARCH_ENABLED)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    #[inline]
    pub fn serpapi_key(&self) -> Option<String> {
        self.get(SERPAPI_KEY).filter(|key| !key.trim().is_empty())
    }

    #[inline]
    pub fn active_style(&self) -> String {
        self.get(ACTIVE_BOT_STYLE)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BOT_STYLE.to_string())
    }

    #[inline]
    pub fn temperature(&self) -> f32 {
        self.get(OPENAI_TEMPERATURE)
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TEMPERATURE)
    }

    #[inline]
    pub fn max_tokens(&self) -> u32 {
        self.get(OPENAI_MAX_TOKENS)
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }
}
