//! Persisted nearest-neighbor index over embedded chunks.
//!
//! The index is built once from the full chunk set, persisted to a single
//! self-describing JSON file, and reloaded at process start. It is never
//! mutated while serving queries: the corpus changes out-of-band and the
//! rebuild cost is paid once at startup.
//!
//! Search is exact brute-force over all stored vectors, by cosine
//! similarity or L2 distance. Results are ordered best-first; ties keep
//! insertion order so rankings stay deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embedding::Embedder;
use crate::error::RagError;
use crate::models::Chunk;

/// Bumped whenever the on-disk layout changes incompatibly.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// On-disk representation. Carries everything needed to reload without
/// re-reading the knowledge directory: embedding model and dimension,
/// distance metric, and the chunk-to-vector mapping.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    model: String,
    dims: usize,
    metric: DistanceMetric,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

/// Exclusively-owned collection of `(vector, chunk)` pairs supporting
/// exact nearest-neighbor search. Read-only once built.
#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every chunk (batched) and construct a searchable index.
    ///
    /// Fails with [`RagError::EmptyCorpus`] when `chunks` is empty; the
    /// caller logs and proceeds without an index rather than crashing.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let dims = embedder.dims();
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder
                .embed(&texts)
                .await
                .map_err(RagError::Capability)?;
            if vectors.len() != batch.len() {
                return Err(RagError::Capability(anyhow::anyhow!(
                    "embedder returned {} vectors for a batch of {}",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().cloned().zip(vectors) {
                entries.push(IndexEntry { vector, chunk });
            }
        }

        tracing::info!(chunks = entries.len(), dims, "built vector index");

        Ok(Self {
            model: embedder.model_name().to_string(),
            dims,
            metric,
            entries,
        })
    }

    /// Write the index to `path` in its self-describing format.
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let file = IndexFile {
            format_version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            metric: self.metric,
            built_at: Utc::now(),
            entries: self.entries.clone(),
        };

        let json = serde_json::to_string(&file)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write index to {}", path.display()))?;

        tracing::info!(path = %path.display(), chunks = self.entries.len(), "persisted index");
        Ok(())
    }

    /// Reconstruct an index from storage.
    ///
    /// Fails with [`RagError::CorruptIndex`] when the file is unreadable,
    /// the format is unknown, or the stored embedding dimension or model
    /// does not match the active embedder. Caller policy on that failure
    /// is to discard the store and rebuild from source documents.
    pub fn load(path: &Path, embedder: &dyn Embedder) -> Result<Self, RagError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RagError::CorruptIndex(format!("unreadable: {}", e)))?;

        let file: IndexFile = serde_json::from_str(&raw)
            .map_err(|e| RagError::CorruptIndex(format!("unparseable: {}", e)))?;

        if file.format_version != FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }
        if file.dims != embedder.dims() {
            return Err(RagError::CorruptIndex(format!(
                "stored dimension {} does not match embedding model dimension {}",
                file.dims,
                embedder.dims()
            )));
        }
        if file.model != embedder.model_name() {
            return Err(RagError::CorruptIndex(format!(
                "stored model {:?} does not match active model {:?}",
                file.model,
                embedder.model_name()
            )));
        }
        if let Some(bad) = file.entries.iter().find(|e| e.vector.len() != file.dims) {
            return Err(RagError::CorruptIndex(format!(
                "entry for {:?} has {}-dimensional vector, header says {}",
                bad.chunk.origin,
                bad.vector.len(),
                file.dims
            )));
        }

        Ok(Self {
            model: file.model,
            dims: file.dims,
            metric: file.metric,
            entries: file.entries,
        })
    }

    /// Return up to `k` nearest neighbors of `query`, best-first.
    ///
    /// `k == 0` and dimension mismatches fail with
    /// [`RagError::InvalidArgument`]. When the index holds fewer than `k`
    /// chunks, all of them are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>, RagError> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be >= 1".to_string()));
        }
        if query.len() != self.dims {
            return Err(RagError::InvalidArgument(format!(
                "query vector has dimension {}, index has {}",
                query.len(),
                self.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, self.score(query, &entry.vector)))
            .collect();

        // Stable sort: equal scores keep insertion order. `total_cmp` keeps
        // the comparator a total order even if an embedder produces NaN.
        match self.metric {
            DistanceMetric::Cosine => scored.sort_by(|a, b| b.1.total_cmp(&a.1)),
            DistanceMetric::L2 => scored.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| (self.entries[i].chunk.clone(), score))
            .collect())
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::L2 => l2_distance(a, b),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Content hashes of all indexed chunks, in insertion order.
    pub fn chunk_hashes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.chunk.hash.as_str()).collect()
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for degenerate inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean distance; `f32::INFINITY` for mismatched lengths.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
