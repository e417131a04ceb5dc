
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{SlotTable, VectorIndex};
use crate::config::{Config, METADATA_FILE_NAME, VECTORS_FILE_NAME};

/// Persistence for one index generation: a binary vector artifact and a
/// JSON side-table artifact written together under a fixed directory.
///
/// Writes go to a temporary path in the same directory followed by a
/// rename, so a reader loading concurrently sees the previous generation
/// or the new one, never a torn file.
#[derive(Debug, Clone)]
pub struct IndexStorage {
    dir: PathBuf,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct VectorsArtifactRef<'a> {
    dimension: usize,
    count: usize,
    data: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct VectorsArtifact {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

impl IndexStorage {
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P, dimension: usize) -> Self {
        Self {
            dir: dir.into(),
            dimension,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.index_dir(),
            config.openai.embedding_dimension as usize,
        )
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE_NAME)
    }

    #[inline]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE_NAME)
    }

    /// Write both artifacts for the given generation.
    #[inline]
    pub fn persist(&self, index: &VectorIndex, table: &SlotTable) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create index directory: {}", self.dir.display()))?;

        let artifact = VectorsArtifactRef {
            dimension: index.dimension(),
            count: index.len(),
            data: index.data(),
        };
        let encoded = bincode::serialize(&artifact).context("Failed to encode vector artifact")?;
        write_atomic(&self.vectors_path(), &encoded)?;

        let metadata =
            serde_json::to_vec(table).context("Failed to serialize index metadata")?;
        write_atomic(&self.metadata_path(), &metadata)?;

        debug!(
            "Persisted index generation with {} entries to {}",
            index.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Load the persisted generation, falling back to an empty one when the
    /// artifacts are missing, unreadable, or inconsistent with each other.
    /// Misaligned vector/metadata pairs are never served.
    #[inline]
    pub fn load(&self) -> (VectorIndex, SlotTable) {
        match self.try_load() {
            Ok(generation) => generation,
            Err(error) => {
                warn!("No usable index on disk ({}), starting empty", error);
                (VectorIndex::new(self.dimension), SlotTable::new())
            }
        }
    }

    fn try_load(&self) -> Result<(VectorIndex, SlotTable)> {
        let vectors_path = self.vectors_path();
        let metadata_path = self.metadata_path();

        let encoded = fs::read(&vectors_path)
            .with_context(|| format!("Failed to read {}", vectors_path.display()))?;
        let artifact: VectorsArtifact =
            bincode::deserialize(&encoded).context("Failed to decode vector artifact")?;

        let metadata = fs::read(&metadata_path)
            .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
        let table: SlotTable =
            serde_json::from_slice(&metadata).context("Failed to parse index metadata")?;

        if artifact.dimension != self.dimension {
            return Err(anyhow::anyhow!(
                "Stored dimension {} does not match configured dimension {}",
                artifact.dimension,
                self.dimension
            ));
        }

        if artifact.data.len() != artifact.dimension * artifact.count {
            return Err(anyhow::anyhow!(
                "Vector artifact is truncated: {} values for {} entries of dimension {}",
                artifact.data.len(),
                artifact.count,
                artifact.dimension
            ));
        }

        if artifact.count != table.len() {
            return Err(anyhow::anyhow!(
                "Vector/metadata cardinality mismatch: {} vectors, {} entries",
                artifact.count,
                table.len()
            ));
        }

        let index = VectorIndex::from_data(artifact.dimension, artifact.data);
        info!(
            "Loaded index generation with {} entries from {}",
            index.len(),
            self.dir.display()
        );
        Ok((index, table))
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}
