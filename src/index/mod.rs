// Vector index core
// A flat dense index searched by exhaustive scan, plus the slot side table
// that maps vector positions back to documents.

pub mod builder;
pub mod storage;


use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Dense f32 vectors in row-major storage, compared by squared L2 distance.
///
/// Slots are assigned sequentially from zero as vectors are added and stay
/// contiguous for the lifetime of a generation; a rebuild starts over from
/// an empty index, so slots are not stable across generations.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its slot.
    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(anyhow::anyhow!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            ));
        }

        let slot = self.len();
        self.data.extend_from_slice(vector);
        Ok(slot)
    }

    /// Nearest neighbors of `query`, ascending by distance. `k` is clamped
    /// to the entry count; an empty index yields no results.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }

        if query.len() != self.dimension {
            warn!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            );
            return Vec::new();
        }

        let mut distances: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, vector)| (slot, squared_l2_distance(query, vector)))
            .collect();

        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        distances.truncate(k.min(self.len()));
        distances
    }

    /// Discard all vectors, returning the index to zero entries.
    #[inline]
    pub fn reset(&mut self) {
        self.data.clear();
    }

    #[inline]
    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub(crate) fn from_data(dimension: usize, data: Vec<f32>) -> Self {
        Self { dimension, data }
    }
}

fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Document metadata recorded alongside each vector slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub document_id: i64,
    pub title: String,
    pub content_preview: String,
}

impl SlotEntry {
    /// Build an entry with the content preview capped at `preview_chars`
    /// characters (not bytes, so multi-byte text stays intact).
    #[inline]
    pub fn new(document_id: i64, title: &str, content: &str, preview_chars: usize) -> Self {
        let content_preview = if content.chars().count() > preview_chars {
            content.chars().take(preview_chars).collect()
        } else {
            content.to_string()
        };

        Self {
            document_id,
            title: title.to_string(),
            content_preview,
        }
    }
}

/// Side table mapping slot positions to document metadata.
///
/// A servable generation has exactly one entry per vector; lookups of
/// missing slots return `None` so a partially corrupt table degrades to
/// fewer results rather than a panic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTable {
    entries: BTreeMap<usize, SlotEntry>,
}

impl SlotTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn insert(&mut self, slot: usize, entry: SlotEntry) {
        self.entries.insert(slot, entry);
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&SlotEntry> {
        self.entries.get(&slot)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&usize, &SlotEntry)> {
        self.entries.iter()
    }
}
