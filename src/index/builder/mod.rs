
use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::storage::IndexStorage;
use super::{SlotEntry, SlotTable, VectorIndex};
use crate::config::Config;
use crate::database::Database;
use crate::embeddings::Embedder;
use crate::{RelayError, Result};

/// Outcome of one rebuild. A rebuild with per-document failures is still a
/// success as long as it ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
}

/// Rebuilds the persisted index generation from the active documents.
///
/// One embedding call is made per document, so a full rebuild can take
/// minutes; callers should run it as its own unit of work. The builder
/// checkpoints the in-progress generation after every batch so an
/// interrupted rebuild leaves the completed batches on disk.
pub struct IndexBuilder<E> {
    database: Database,
    embedder: E,
    storage: IndexStorage,
    batch_size: usize,
    preview_chars: usize,
    rebuild_lock: Mutex<()>,
}

impl<E: Embedder> IndexBuilder<E> {
    #[inline]
    pub fn new(database: Database, embedder: E, storage: IndexStorage, config: &Config) -> Self {
        Self {
            database,
            embedder,
            storage,
            batch_size: config.retrieval.batch_size,
            preview_chars: config.retrieval.preview_chars,
            rebuild_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn storage(&self) -> &IndexStorage {
        &self.storage
    }

    /// Replace the persisted generation with one built from the current
    /// active document set. At most one rebuild runs at a time; a second
    /// concurrent call fails immediately without touching the index.
    #[inline]
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _guard = self
            .rebuild_lock
            .try_lock()
            .map_err(|_| RelayError::RebuildInProgress)?;

        let documents = self.database.list_active_documents().await?;
        let total = documents.len();
        info!("Rebuilding index from {} active documents", total);

        let mut index = VectorIndex::new(self.storage.dimension());
        let mut table = SlotTable::new();
        let mut processed = 0;
        let mut skipped = 0;

        for (batch_number, batch) in documents.chunks(self.batch_size).enumerate() {
            for document in batch {
                match self.embedder.embed(&document.content) {
                    Ok(vector) => match index.add(&vector) {
                        Ok(slot) => {
                            table.insert(
                                slot,
                                SlotEntry::new(
                                    document.id,
                                    &document.title,
                                    &document.content,
                                    self.preview_chars,
                                ),
                            );
                            processed += 1;
                        }
                        Err(error) => {
                            warn!("Skipping document {}: {}", document.id, error);
                            skipped += 1;
                        }
                    },
                    Err(error) => {
                        warn!("Failed to embed document {}: {}", document.id, error);
                        skipped += 1;
                    }
                }
            }

            // Interim checkpoint. A write failure here is not fatal; the
            // in-memory generation is intact and the next checkpoint
            // retries the write.
            match self.storage.persist(&index, &table) {
                Ok(()) => debug!(
                    "Checkpoint after batch {}: {}/{} documents indexed",
                    batch_number + 1,
                    processed,
                    total
                ),
                Err(error) => warn!("Checkpoint write failed: {}", error),
            }
        }

        // The completed generation must land on disk even when empty; an
        // empty index is valid and replaces the stale one.
        self.storage
            .persist(&index, &table)
            .context("Failed to persist completed index generation")?;

        info!("Rebuilt index with {}/{} documents", processed, total);
        Ok(RebuildReport {
            total,
            processed,
            skipped,
        })
    }
}
