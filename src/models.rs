//! Core data models used throughout Ragnar.
//!
//! These types represent the documents and chunks that flow through the
//! indexing pipeline, and the request/response shapes of the query engine.

use serde::{Deserialize, Serialize};

/// Raw text unit produced by a document loader, before chunking.
///
/// Text formats yield one `SourceDocument` per file; PDFs yield one per
/// page, all tagging the same `origin` so provenance stays at file
/// granularity.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Origin identifier: the file name inside the knowledge directory.
    pub origin: String,
    /// Intra-document page index for paged formats (PDF).
    pub page: Option<usize>,
    /// Extracted plain text.
    pub body: String,
}

/// A bounded, overlapping slice of a source document's text.
///
/// Chunks are immutable once created. `origin` is a provenance
/// back-reference, not an ownership relation; `position` is an order hint
/// within the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub origin: String,
    pub position: i64,
    pub text: String,
    /// SHA-256 of `text`, used for idempotence checks across rebuilds.
    pub hash: String,
}

/// Which path the router chose for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "rag_agent")]
    Rag,
    #[serde(rename = "direct_agent")]
    Direct,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Rag => "rag_agent",
            AgentKind::Direct => "direct_agent",
        }
    }
}

/// Request body for `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// Response body for `POST /query` and the CLI `query` command.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Distinct origin identifiers backing the answer, sorted.
    pub sources: Vec<String>,
    pub agent_used: AgentKind,
}
