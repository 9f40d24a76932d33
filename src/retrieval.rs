//! Retrieval service lifecycle and query-time retrieval.
//!
//! A [`RetrievalService`] owns exactly one [`VectorIndex`] for the process
//! lifetime. At startup it reloads the persisted index when one exists and
//! is compatible; a corrupt store is discarded and rebuilt from the
//! knowledge directory; an empty corpus leaves the service running with no
//! index, in which case every retrieval returns an empty result instead of
//! failing.

use anyhow::Result;
use std::sync::Arc;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::loader::LoaderRegistry;
use crate::models::Chunk;

pub struct RetrievalService {
    index: Option<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl RetrievalService {
    /// Load-or-build startup sequence. Completes (or falls back) before
    /// the process starts serving queries; the index is read-only after.
    pub async fn open(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        registry: &LoaderRegistry,
    ) -> Result<Self> {
        let index = if config.index.path.exists() {
            match VectorIndex::load(&config.index.path, embedder.as_ref()) {
                Ok(index) => {
                    tracing::info!(chunks = index.len(), "loaded persisted index");
                    Some(index)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding persisted index, rebuilding");
                    rebuild(config, embedder.as_ref(), registry).await?
                }
            }
        } else {
            rebuild(config, embedder.as_ref(), registry).await?
        };

        Ok(Self {
            index,
            embedder,
            top_k: config.retrieval.top_k,
        })
    }

    /// Retrieve the configured number of most relevant chunks for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        self.retrieve_k(query, self.top_k).await
    }

    /// Retrieve up to `k` most relevant chunks, scores dropped at this
    /// layer. "No index" is a valid state that yields an empty result.
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };

        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(RagError::Capability)?;
        let hits = index.search(&query_vec, k)?;
        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.as_ref().map_or(0, VectorIndex::len)
    }
}

/// Full rebuild from the knowledge directory, persisted on success.
///
/// Returns `None` (not an error) when the directory yields no chunks.
pub async fn rebuild(
    config: &Config,
    embedder: &dyn Embedder,
    registry: &LoaderRegistry,
) -> Result<Option<VectorIndex>> {
    let docs = registry.load_dir(&config.knowledge.dir)?;
    let chunks = chunk_documents(
        &docs,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );

    match VectorIndex::build(
        chunks,
        embedder,
        config.embedding.batch_size,
        config.index.metric,
    )
    .await
    {
        Ok(index) => {
            index.persist(&config.index.path)?;
            Ok(Some(index))
        }
        Err(RagError::EmptyCorpus) => {
            tracing::warn!(
                dir = %config.knowledge.dir.display(),
                "knowledge directory produced no chunks; retrieval disabled"
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
