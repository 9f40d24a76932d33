//! Router → Retrieve → Answer orchestration.
//!
//! Each question runs through a three-node state machine:
//!
//! ```text
//! Router ──"rag"──▶ Retrieve ──▶ Answer
//!    └────"direct"───────────────▶ ▲
//! ```
//!
//! Router classifies intent with one LLM call; Retrieve consults the
//! [`RetrievalService`] and accumulates context plus provenance; Answer
//! makes exactly one generation call, with or without retrieved context.
//! A request therefore makes one or two capability calls beyond the single
//! retrieval, and never a second generation.
//!
//! Every transition takes the prior state immutably and returns only the
//! fields it owns; `run_query` folds the outputs into the per-request
//! [`AgentState`], which is never shared across requests.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::RagError;
use crate::llm::ChatModel;
use crate::models::{AgentKind, Chunk, QueryResponse};
use crate::retrieval::RetrievalService;

/// Which edge the router takes out of the initial node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Rag,
    Direct,
}

/// Decision rule over the classifier's raw output.
///
/// Deliberately permissive: any output containing "rag" (case-insensitive)
/// routes to retrieval, tolerating formatting noise like quotes or
/// trailing punctuation in the model's reply. Tightening this would be a
/// behavior change, not a cleanup.
pub fn parse_route(decision: &str) -> Route {
    if decision.to_lowercase().contains("rag") {
        Route::Rag
    } else {
        Route::Direct
    }
}

/// Per-request working record. Created fresh for every question and
/// destroyed once the response is returned.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub question: String,
    pub agent_used: AgentKind,
    pub context: String,
    pub sources: Vec<String>,
    pub answer: String,
}

/// Output of the Retrieve transition.
struct Retrieved {
    context: String,
    sources: Vec<String>,
}

/// The orchestration entry point the transport layer calls into.
///
/// Holds the two long-lived collaborators every request shares read-only:
/// the chat capability and the retrieval service.
pub struct QueryEngine {
    chat: Arc<dyn ChatModel>,
    retrieval: Arc<RetrievalService>,
}

impl QueryEngine {
    pub fn new(chat: Arc<dyn ChatModel>, retrieval: Arc<RetrievalService>) -> Self {
        Self { chat, retrieval }
    }

    /// Run one question through the state machine.
    pub async fn run_query(&self, question: &str) -> Result<QueryResponse> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("question must not be empty".to_string()).into());
        }

        let route = self.route(question).await?;
        tracing::debug!(?route, "router decision");

        let retrieved = match route {
            Route::Rag => self.retrieve(question).await?,
            Route::Direct => Retrieved {
                context: String::new(),
                sources: Vec::new(),
            },
        };

        let answer = self.answer(question, &retrieved.context).await?;

        let state = AgentState {
            question: question.to_string(),
            agent_used: match route {
                Route::Rag => AgentKind::Rag,
                Route::Direct => AgentKind::Direct,
            },
            context: retrieved.context,
            sources: retrieved.sources,
            answer,
        };

        Ok(QueryResponse {
            answer: state.answer,
            sources: state.sources,
            agent_used: state.agent_used,
        })
    }

    /// Router node: one classification call, then the permissive decision
    /// rule.
    async fn route(&self, question: &str) -> Result<Route> {
        let prompt = router_prompt(question);
        let decision = self
            .chat
            .classify(&prompt)
            .await
            .map_err(RagError::Capability)?;
        Ok(parse_route(&decision))
    }

    /// Retrieve node: consult the knowledge base, join chunk texts with a
    /// blank line, and collect the deduplicated set of origins.
    async fn retrieve(&self, question: &str) -> Result<Retrieved> {
        let chunks = self.retrieval.retrieve(question).await?;
        Ok(Retrieved {
            context: join_context(&chunks),
            sources: collect_sources(&chunks),
        })
    }

    /// Answer node: exactly one generation call.
    async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let prompt = answer_prompt(question, context);
        self.chat
            .generate(&prompt)
            .await
            .map_err(|e| RagError::Capability(e).into())
    }
}

fn join_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_sources(chunks: &[Chunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|c| c.origin.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

const SYSTEM_INSTRUCTION: &str = "You are an assistant that answers only the questions asked of \
you. When knowledge-base context is provided, ground your answer in it and do not invent facts \
beyond it. Give clear, relevant guidance for whatever is asked.";

fn router_prompt(question: &str) -> String {
    format!(
        "Your task is to decide whether a question requires consulting a local knowledge base \
(RAG) or can be answered directly.\nThe knowledge base contains the organization's internal \
documents, policies, and procedures.\n\nQuestion: {question}\n\nRespond ONLY with \"rag\" if the \
question is about the organization, its documents, policies, or procedures.\nRespond \"direct\" \
if it is a greeting, a farewell, or a general question unrelated to the knowledge base.\n"
    )
}

fn answer_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        format!("{SYSTEM_INSTRUCTION}\n\nUser question: {question}\n\nAnswer directly.\n")
    } else {
        format!(
            "{SYSTEM_INSTRUCTION}\n\nContext retrieved from the knowledge base:\n{context}\n\n\
User question: {question}\n\nAnswer using the provided context.\n"
        )
    }
}
