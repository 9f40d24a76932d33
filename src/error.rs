//! Error taxonomy for the indexing and answering core.
//!
//! None of these variants should terminate the process. `EmptyCorpus` and
//! `CorruptIndex` are recovered from during startup (retrieval degrades to
//! empty results, or the index is rebuilt from source); `InvalidArgument`
//! and `Capability` are request-scoped and surfaced to the transport layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The knowledge directory produced no indexable chunks.
    #[error("knowledge base is empty: no indexable chunks")]
    EmptyCorpus,

    /// The persisted index could not be read back, or does not match the
    /// active embedding model. Callers discard the store and rebuild.
    #[error("corrupt index store: {0}")]
    CorruptIndex(String),

    /// A malformed argument, fatal to the call but not to the process.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An outbound model call (classify, generate, or embed) failed.
    #[error("capability call failed: {0}")]
    Capability(anyhow::Error),
}
