
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, Settings};
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::index::storage::IndexStorage;

pub const CONTEXT_HEADER: &str = "Knowledge base information:\n\n";

/// One retrieval hit, nearest first. `distance` is squared L2 against the
/// query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document_id: i64,
    pub title: String,
    pub content_preview: String,
    pub distance: f32,
}

/// Serves k-NN lookups over the persisted index generation.
///
/// Every failure mode short-circuits to `None`: retrieval degrades to
/// context-free generation instead of failing the chat turn.
pub struct Retriever {
    config: Config,
    settings: Arc<Settings>,
    storage: IndexStorage,
}

impl Retriever {
    #[inline]
    pub fn new(config: Config, settings: Arc<Settings>) -> Self {
        let storage = IndexStorage::from_config(&config);
        Self {
            config,
            settings,
            storage,
        }
    }

    /// Top-`top_k` documents nearest to `query`, or `None` when retrieval
    /// is disabled or cannot produce results.
    #[inline]
    pub fn search(&self, query: &str, top_k: usize) -> Option<Vec<RetrievedDocument>> {
        if !self.settings.rag_enabled() {
            debug!("RAG is disabled, skipping search");
            return None;
        }

        let client = match EmbeddingClient::new(&self.config, &self.settings) {
            Ok(client) => client,
            Err(error) => {
                warn!("Cannot search: {}", error);
                return None;
            }
        };

        self.search_with(&client, query, top_k)
    }

    fn search_with(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Option<Vec<RetrievedDocument>> {
        let query_embedding = match embedder.embed(query) {
            Ok(embedding) => embedding,
            Err(error) => {
                warn!("Failed to embed query: {}", error);
                return None;
            }
        };

        let (index, table) = self.storage.load();
        if index.is_empty() {
            debug!("Index has no entries, nothing to retrieve");
            return None;
        }

        let results: Vec<RetrievedDocument> = index
            .search(&query_embedding, top_k)
            .into_iter()
            .filter_map(|(slot, distance)| {
                // A slot without metadata means the side table is damaged;
                // drop the hit rather than fail the lookup.
                let entry = table.get(slot)?;
                Some(RetrievedDocument {
                    document_id: entry.document_id,
                    title: entry.title.clone(),
                    content_preview: entry.content_preview.clone(),
                    distance,
                })
            })
            .collect();

        if results.is_empty() {
            return None;
        }

        info!("Retrieved {} documents for query", results.len());
        Some(results)
    }

    /// Format retrieved documents into the context block injected ahead of
    /// the user's message. `None` when there is nothing to inject.
    #[inline]
    pub fn build_context(&self, query: &str) -> Option<String> {
        let results = self.search(query, self.settings.top_k())?;
        Some(context_from(&results))
    }
}

fn context_from(results: &[RetrievedDocument]) -> String {
    let mut context = String::from(CONTEXT_HEADER);
    for (position, result) in results.iter().enumerate() {
        let _ = write!(
            context,
            "{}. {}:\n{}\n\n",
            position + 1,
            result.title,
            result.content_preview
        );
    }
    context
}
